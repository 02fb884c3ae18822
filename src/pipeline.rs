//! Batch orchestration.
//!
//! One pass over a raw batch: unify, derive recommendations, build a fresh
//! index snapshot, and publish it. The previous snapshot keeps serving
//! queries until the swap.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::info;

use crate::config::Config;
use crate::error::Result;
use crate::model::{Course, RawRecord, RejectedRecord};
use crate::recommend::Recommender;
use crate::search::{IndexHandle, SearchIndex};
use crate::unify::{BatchSummary, Unifier};

/// What a batch run hands back to the caller: the published snapshot plus
/// the monitoring summary and the per-record rejects.
#[derive(Debug)]
pub struct BatchReport {
    pub index: Arc<SearchIndex>,
    pub summary: BatchSummary,
    pub rejects: Vec<RejectedRecord>,
}

/// Run one batch against the current wall clock.
pub fn run_batch(
    raw: Vec<RawRecord>,
    catalog: &[Course],
    config: &Config,
    handle: &IndexHandle,
) -> Result<BatchReport> {
    run_batch_at(raw, catalog, config, handle, Utc::now())
}

/// Run one batch with an explicit `as_of` instant.
///
/// `catalog` supplements whatever COURSE records the batch itself carries.
/// Fails fast on invalid configuration; per-record problems come back as
/// rejects in the report, never as errors.
pub fn run_batch_at(
    raw: Vec<RawRecord>,
    catalog: &[Course],
    config: &Config,
    handle: &IndexHandle,
    as_of: DateTime<Utc>,
) -> Result<BatchReport> {
    config.validate()?;

    let unifier = Unifier::new(config);
    let batch = unifier.run_at(raw, as_of);

    let mut full_catalog: Vec<Course> = batch.courses.values().cloned().collect();
    for course in catalog {
        if !full_catalog.iter().any(|c| c.code == course.code) {
            full_catalog.push(course.clone());
        }
    }

    // Jobs-only snapshot for derivation; students go in after enrichment.
    let job_view = SearchIndex::build(Default::default(), batch.jobs.clone());
    let recommender = Recommender::new(config);
    let students = recommender.derive_all(&batch.students, &full_catalog, &job_view, as_of);

    let index = handle.publish(SearchIndex::build(students, batch.jobs));
    info!(
        students = index.students().len(),
        jobs = index.jobs().len(),
        rejected = batch.summary.rejected,
        mean_quality = batch.summary.mean_quality,
        "batch published"
    );

    Ok(BatchReport {
        index,
        summary: batch.summary,
        rejects: batch.rejects,
    })
}
