//! Record unification engine.
//!
//! Merges per-source raw records sharing an identity key into canonical
//! [`Student`], [`JobPosting`], and [`Course`] entities, resolves field
//! conflicts, and scores the quality of every merged entity.
//!
//! ## Strategy
//!
//! 1. **Grouping**: records with the same `(kind, identity_key)` describe the
//!    same real-world entity, regardless of source. Analytic records join the
//!    student with the same key.
//! 2. **Priority fill**: within a group, fields merge in source-priority
//!    order; a lower-priority source only fills fields the higher-priority
//!    sources left empty.
//! 3. **Recency override**: numeric fields whose reporting sources disagree
//!    by more than the configured tolerance resolve by most recent
//!    observation instead.
//!
//! The merge is deterministic and order-independent: permuting the records
//! inside a group yields an identical entity.

pub mod quality;

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use itertools::Itertools;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::config::{Config, MergeConfig};
use crate::model::{
    clean_text, parse_timestamp, Course, EngagementLevel, FieldValue, JobPosting, JobStatus,
    RawRecord, RecordKind, RejectReason, RejectedRecord, SalaryRange, Source, Student,
};
pub use quality::{QualityInputs, QualityScorer};

/// Fields that make a student record complete.
const REQUIRED_STUDENT_FIELDS: [&str; 8] = [
    "first_name",
    "last_name",
    "email",
    "academic_program",
    "gpa",
    "performance_score",
    "engagement_level",
    "career_interest",
];

/// Student fields owned by the career systems; they resolve under the
/// career source priority instead of the academic one.
const STUDENT_CAREER_FIELDS: [&str; 2] = ["career_interest", "skill_gaps"];

/// Fields that make a job posting complete.
const REQUIRED_JOB_FIELDS: [&str; 6] = [
    "job_title",
    "company",
    "location",
    "required_skills",
    "salary_range",
    "posting_date",
];

/// Everything one unification pass produces. Empty input yields an empty
/// batch, never an error.
#[derive(Debug, Clone, Default)]
pub struct UnifiedBatch {
    pub students: BTreeMap<String, Student>,
    pub jobs: BTreeMap<String, JobPosting>,
    pub courses: BTreeMap<String, Course>,
    pub rejects: Vec<RejectedRecord>,
    pub summary: BatchSummary,
}

/// Per-batch counts and quality distribution, emitted for external
/// monitoring as plain structured data.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BatchSummary {
    pub records_in: usize,
    pub students_merged: usize,
    pub jobs_merged: usize,
    pub courses_merged: usize,
    pub rejected: usize,
    pub rejected_by_reason: BTreeMap<String, usize>,
    pub mean_quality: f64,
    /// Quality scores bucketed into fifths of [0, 1].
    pub quality_histogram: BTreeMap<String, usize>,
}

/// One source's report of one field.
#[derive(Debug, Clone)]
struct Observation {
    source: Source,
    observed_at: DateTime<Utc>,
    value: FieldValue,
}

type FieldObservations = BTreeMap<String, Vec<Observation>>;

/// The record unification engine.
pub struct Unifier<'a> {
    config: &'a Config,
    scorer: QualityScorer,
}

impl<'a> Unifier<'a> {
    #[must_use]
    pub fn new(config: &'a Config) -> Self {
        Self {
            config,
            scorer: QualityScorer::new(config),
        }
    }

    /// Unify a batch against the current wall clock.
    #[must_use]
    pub fn run(&self, batch: Vec<RawRecord>) -> UnifiedBatch {
        self.run_at(batch, Utc::now())
    }

    /// Unify a batch with an explicit `as_of` instant for recency scoring.
    #[must_use]
    pub fn run_at(&self, batch: Vec<RawRecord>, as_of: DateTime<Utc>) -> UnifiedBatch {
        let records_in = batch.len();
        let mut rejects = Vec::new();
        let mut groups: BTreeMap<(RecordKind, String), Vec<RawRecord>> = BTreeMap::new();

        for record in batch {
            if record.identity_key.trim().is_empty() {
                warn!(source = %record.source, "rejecting record: missing identity key");
                rejects.push(RejectedRecord {
                    record,
                    reason: RejectReason::MissingIdentityKey,
                });
                continue;
            }
            if record.kind == RecordKind::Unknown {
                warn!(
                    source = %record.source,
                    identity_key = %record.identity_key,
                    "rejecting record: unrecognized kind"
                );
                rejects.push(RejectedRecord {
                    record,
                    reason: RejectReason::UnrecognizedKind,
                });
                continue;
            }
            let key = (merge_kind(record.kind), record.identity_key.trim().to_string());
            groups.entry(key).or_default().push(record);
        }

        let mut students = BTreeMap::new();
        let mut jobs = BTreeMap::new();
        let mut courses = BTreeMap::new();

        for ((kind, key), group) in groups {
            match kind {
                RecordKind::Student => {
                    students.insert(key.clone(), self.merge_student(&key, &group, as_of));
                }
                RecordKind::Job => {
                    jobs.insert(key.clone(), self.merge_job(&key, &group, as_of));
                }
                RecordKind::Course => {
                    courses.insert(key.clone(), self.merge_course(&key, &group));
                }
                RecordKind::Analytic | RecordKind::Unknown => {}
            }
        }

        let summary = build_summary(records_in, &students, &jobs, &courses, &rejects);
        info!(
            records_in,
            students = summary.students_merged,
            jobs = summary.jobs_merged,
            courses = summary.courses_merged,
            rejected = summary.rejected,
            "unification complete"
        );

        UnifiedBatch {
            students,
            jobs,
            courses,
            rejects,
            summary,
        }
    }

    fn merge_student(&self, id: &str, group: &[RawRecord], as_of: DateTime<Utc>) -> Student {
        let observations = collect_observations(group, student_value_ok);
        let tolerance = self.config.merge.numeric_tolerance;
        let resolved: BTreeMap<String, FieldValue> = observations
            .iter()
            .filter_map(|(name, obs)| {
                let order = if STUDENT_CAREER_FIELDS.contains(&name.as_str()) {
                    &self.config.merge.career_priority
                } else {
                    &self.config.merge.academic_priority
                };
                resolve_field(name, obs, order, tolerance).map(|value| (name.clone(), value))
            })
            .collect();

        let text = |name: &str| {
            resolved
                .get(name)
                .and_then(FieldValue::as_text)
                .map(clean_text)
                .filter(|s| !s.is_empty())
        };
        let number = |name: &str| resolved.get(name).and_then(FieldValue::as_number);
        let list = |name: &str| resolved.get(name).map(FieldValue::as_list).unwrap_or_default();

        let first_name = text("first_name");
        let last_name = text("last_name");
        let full_name = text("full_name").or_else(|| match (&first_name, &last_name) {
            (Some(first), Some(last)) => Some(format!("{first} {last}")),
            _ => None,
        });

        let engagement_level = text("engagement_level").and_then(|raw| {
            raw.parse::<EngagementLevel>().map_or_else(
                |err| {
                    warn!(student_id = %id, %err, "dropping unparseable engagement level");
                    None
                },
                Some,
            )
        });

        let newest = group.iter().map(|r| r.observed_at).max();
        let (agreeing_fields, contested_fields) = agreement_counts(&observations, tolerance);
        let inputs = QualityInputs {
            required_present: REQUIRED_STUDENT_FIELDS
                .iter()
                .filter(|f| resolved.contains_key(**f))
                .count(),
            required_total: REQUIRED_STUDENT_FIELDS.len(),
            agreeing_fields,
            contested_fields,
            newest,
        };

        Student {
            student_id: id.to_string(),
            first_name,
            last_name,
            full_name,
            email: text("email"),
            program: text("academic_program"),
            gpa: number("gpa"),
            credits: number("credits").or_else(|| number("total_credits")),
            performance_score: number("performance_score"),
            engagement_level,
            learning_style: text("learning_style"),
            career_interest: text("career_interest"),
            completed_courses: list("completed_courses")
                .into_iter()
                .map(|c| c.to_uppercase())
                .collect(),
            skill_gaps: list("skill_gaps").into_iter().collect(),
            recommended_courses: list("recommended_courses"),
            job_matches: Vec::new(),
            quality_score: self.scorer.score(&inputs, as_of),
            sources: group.iter().map(|r| r.source).collect(),
            last_updated: newest.unwrap_or(as_of),
        }
    }

    fn merge_job(&self, id: &str, group: &[RawRecord], as_of: DateTime<Utc>) -> JobPosting {
        let observations = collect_observations(group, |_, _| true);
        let order = &self.config.merge.career_priority;
        let tolerance = self.config.merge.numeric_tolerance;
        let resolved = resolve_all(&observations, order, tolerance);

        let text = |name: &str| {
            resolved
                .get(name)
                .and_then(FieldValue::as_text)
                .map(clean_text)
                .filter(|s| !s.is_empty())
        };
        let list = |name: &str| resolved.get(name).map(FieldValue::as_list).unwrap_or_default();

        let status = text("status")
            .and_then(|raw| {
                raw.parse::<JobStatus>()
                    .map_err(|err| warn!(job_posting_id = %id, %err, "dropping unparseable status"))
                    .ok()
            })
            .unwrap_or(JobStatus::Active);

        let newest = group.iter().map(|r| r.observed_at).max();
        let (agreeing_fields, contested_fields) = agreement_counts(&observations, tolerance);
        let inputs = QualityInputs {
            required_present: REQUIRED_JOB_FIELDS
                .iter()
                .filter(|f| resolved.contains_key(**f))
                .count(),
            required_total: REQUIRED_JOB_FIELDS.len(),
            agreeing_fields,
            contested_fields,
            newest,
        };

        JobPosting {
            job_posting_id: id.to_string(),
            title: text("job_title"),
            company: text("company"),
            location: text("location"),
            required_skills: list("required_skills").into_iter().collect(),
            salary_range: text("salary_range").and_then(|raw| SalaryRange::parse(&raw)),
            status,
            posting_date: text("posting_date").and_then(|raw| parse_timestamp(&raw)),
            application_deadline: text("application_deadline").and_then(|raw| parse_timestamp(&raw)),
            quality_score: self.scorer.score(&inputs, as_of),
            sources: group.iter().map(|r| r.source).collect(),
            last_updated: newest.unwrap_or(as_of),
        }
    }

    fn merge_course(&self, id: &str, group: &[RawRecord]) -> Course {
        let observations = collect_observations(group, course_value_ok);
        let order = &self.config.merge.academic_priority;
        let resolved = resolve_all(&observations, order, self.config.merge.numeric_tolerance);

        let text = |name: &str| {
            resolved
                .get(name)
                .and_then(FieldValue::as_text)
                .map(clean_text)
                .filter(|s| !s.is_empty())
        };

        let tags_field = resolved.get("tags").or_else(|| resolved.get("skills"));
        Course {
            code: id.to_uppercase(),
            name: text("course_name").or_else(|| text("name")),
            description: text("description"),
            credits: resolved
                .get("credits")
                .and_then(FieldValue::as_number)
                .map_or(0, |n| n.max(0.0).round() as u32),
            tags: tags_field
                .map(FieldValue::as_list)
                .unwrap_or_default()
                .into_iter()
                .map(|t| t.to_lowercase())
                .collect(),
        }
    }
}

/// Analytic records merge into the student entity with the same key.
fn merge_kind(kind: RecordKind) -> RecordKind {
    match kind {
        RecordKind::Analytic => RecordKind::Student,
        other => other,
    }
}

/// Validation applied before merging; out-of-range or malformed values are
/// dropped the same way a null would be, never rejecting the whole record.
fn student_value_ok(field: &str, value: &FieldValue) -> bool {
    if field == "email" {
        return value
            .as_text()
            .is_some_and(|t| email_pattern().is_match(t.trim()));
    }
    let Some(n) = value.as_number() else {
        return true;
    };
    match field {
        "gpa" => (0.0..=4.0).contains(&n),
        "performance_score" => (0.0..=100.0).contains(&n),
        "credits" | "total_credits" => n >= 0.0,
        _ => true,
    }
}

fn email_pattern() -> &'static regex::Regex {
    use std::sync::OnceLock;
    static RE: OnceLock<regex::Regex> = OnceLock::new();
    RE.get_or_init(|| {
        regex::Regex::new(r"^[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}$")
            .expect("valid email pattern")
    })
}

fn course_value_ok(field: &str, value: &FieldValue) -> bool {
    match (field, value.as_number()) {
        ("credits", Some(n)) => n >= 0.0,
        _ => true,
    }
}

/// Gather every non-empty, in-range field observation in a group.
fn collect_observations(
    group: &[RawRecord],
    keep: impl Fn(&str, &FieldValue) -> bool,
) -> FieldObservations {
    let mut observations: FieldObservations = BTreeMap::new();
    for record in group {
        for (name, value) in &record.fields {
            if value.is_empty() {
                continue;
            }
            if !keep(name, value) {
                warn!(
                    field = %name,
                    source = %record.source,
                    identity_key = %record.identity_key,
                    "dropping invalid value"
                );
                continue;
            }
            observations.entry(name.clone()).or_default().push(Observation {
                source: record.source,
                observed_at: record.observed_at,
                value: value.clone(),
            });
        }
    }
    observations
}

fn resolve_all(
    observations: &FieldObservations,
    order: &[Source],
    tolerance: f64,
) -> BTreeMap<String, FieldValue> {
    observations
        .iter()
        .filter_map(|(name, obs)| {
            resolve_field(name, obs, order, tolerance).map(|value| (name.clone(), value))
        })
        .collect()
}

/// Pick the winning value for one field.
///
/// Sorting is total over (rank, timestamp, value), so the winner does not
/// depend on the order records arrived in.
fn resolve_field(
    name: &str,
    observations: &[Observation],
    order: &[Source],
    tolerance: f64,
) -> Option<FieldValue> {
    let mut obs: Vec<&Observation> = observations.iter().collect();
    if obs.is_empty() {
        return None;
    }

    let numbers: Vec<f64> = obs.iter().filter_map(|o| o.value.as_number()).collect();
    if numbers.len() == obs.len() && obs.len() > 1 {
        let min = numbers.iter().copied().fold(f64::INFINITY, f64::min);
        let max = numbers.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        if max - min > tolerance {
            debug!(
                field = %name,
                spread = max - min,
                tolerance,
                "numeric conflict beyond tolerance, resolving by recency"
            );
            obs.sort_by(|a, b| {
                b.observed_at
                    .cmp(&a.observed_at)
                    .then_with(|| {
                        MergeConfig::rank(order, a.source).cmp(&MergeConfig::rank(order, b.source))
                    })
                    .then_with(|| value_repr(&a.value).cmp(&value_repr(&b.value)))
            });
            return obs.first().map(|o| o.value.clone());
        }
    }

    obs.sort_by(|a, b| {
        MergeConfig::rank(order, a.source)
            .cmp(&MergeConfig::rank(order, b.source))
            .then_with(|| b.observed_at.cmp(&a.observed_at))
            .then_with(|| value_repr(&a.value).cmp(&value_repr(&b.value)))
    });
    obs.first().map(|o| o.value.clone())
}

fn value_repr(value: &FieldValue) -> String {
    format!("{value:?}")
}

/// Count fields with at least two reporting sources, and how many of those
/// have at least one agreeing pair.
fn agreement_counts(observations: &FieldObservations, tolerance: f64) -> (usize, usize) {
    let mut contested = 0;
    let mut agreeing = 0;
    for obs in observations.values() {
        let mut per_source: BTreeMap<Source, &Observation> = BTreeMap::new();
        for o in obs {
            per_source
                .entry(o.source)
                .and_modify(|current| {
                    if o.observed_at > current.observed_at {
                        *current = o;
                    }
                })
                .or_insert(o);
        }
        if per_source.len() < 2 {
            continue;
        }
        contested += 1;
        let any_agree = per_source
            .values()
            .tuple_combinations()
            .any(|(a, b)| values_agree(&a.value, &b.value, tolerance));
        if any_agree {
            agreeing += 1;
        }
    }
    (agreeing, contested)
}

/// Two sources agree on a field when the numbers are within tolerance, the
/// cleaned text matches case-insensitively, or the lists hold the same items.
fn values_agree(a: &FieldValue, b: &FieldValue, tolerance: f64) -> bool {
    if let (Some(x), Some(y)) = (a.as_number(), b.as_number()) {
        return (x - y).abs() <= tolerance;
    }
    match (a, b) {
        (FieldValue::Text(x), FieldValue::Text(y)) => {
            clean_text(x).to_lowercase() == clean_text(y).to_lowercase()
        }
        (FieldValue::List(_) | FieldValue::Text(_), FieldValue::List(_) | FieldValue::Text(_)) => {
            let xs: BTreeSet<String> = a.as_list().iter().map(|s| s.to_lowercase()).collect();
            let ys: BTreeSet<String> = b.as_list().iter().map(|s| s.to_lowercase()).collect();
            !xs.is_empty() && xs == ys
        }
        _ => false,
    }
}

fn build_summary(
    records_in: usize,
    students: &BTreeMap<String, Student>,
    jobs: &BTreeMap<String, JobPosting>,
    courses: &BTreeMap<String, Course>,
    rejects: &[RejectedRecord],
) -> BatchSummary {
    let mut rejected_by_reason: BTreeMap<String, usize> = BTreeMap::new();
    for reject in rejects {
        *rejected_by_reason.entry(reject.reason.to_string()).or_insert(0) += 1;
    }

    let scores: Vec<f64> = students
        .values()
        .map(|s| s.quality_score)
        .chain(jobs.values().map(|j| j.quality_score))
        .collect();
    let mean_quality = if scores.is_empty() {
        0.0
    } else {
        scores.iter().sum::<f64>() / scores.len() as f64
    };

    let mut quality_histogram: BTreeMap<String, usize> = BTreeMap::new();
    for score in &scores {
        *quality_histogram
            .entry(quality_bucket(*score).to_string())
            .or_insert(0) += 1;
    }

    BatchSummary {
        records_in,
        students_merged: students.len(),
        jobs_merged: jobs.len(),
        courses_merged: courses.len(),
        rejected: rejects.len(),
        rejected_by_reason,
        mean_quality,
        quality_histogram,
    }
}

fn quality_bucket(score: f64) -> &'static str {
    if score < 0.2 {
        "0.0-0.2"
    } else if score < 0.4 {
        "0.2-0.4"
    } else if score < 0.6 {
        "0.4-0.6"
    } else if score < 0.8 {
        "0.6-0.8"
    } else {
        "0.8-1.0"
    }
}
