//! Immutable index snapshots and atomic publication.
//!
//! An index is built fully off to the side from a unified entity set, then
//! published into an [`IndexHandle`] with a single pointer swap. In-flight
//! queries hold an `Arc` to the snapshot they started on and never observe a
//! half-built index.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use itertools::Itertools;
use parking_lot::RwLock;
use tracing::debug;

use crate::model::{JobPosting, Student};

/// An immutable, queryable build of the unified entities at one point in
/// time. Owns the entities plus token postings over their keyword fields.
#[derive(Debug, Clone)]
pub struct SearchIndex {
    students: BTreeMap<String, Student>,
    jobs: BTreeMap<String, JobPosting>,
    student_postings: BTreeMap<String, BTreeSet<String>>,
    job_postings: BTreeMap<String, BTreeSet<String>>,
    built_at: DateTime<Utc>,
}

impl Default for SearchIndex {
    fn default() -> Self {
        Self::build(BTreeMap::new(), BTreeMap::new())
    }
}

impl SearchIndex {
    /// Build a snapshot. Pure: no shared mutable state is touched.
    #[must_use]
    pub fn build(students: BTreeMap<String, Student>, jobs: BTreeMap<String, JobPosting>) -> Self {
        let mut student_postings: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
        for (id, student) in &students {
            for token in tokenize(&student_text(student)) {
                student_postings.entry(token).or_default().insert(id.clone());
            }
        }

        let mut job_postings: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
        for (id, job) in &jobs {
            for token in tokenize(&job_text(job)) {
                job_postings.entry(token).or_default().insert(id.clone());
            }
        }

        Self {
            students,
            jobs,
            student_postings,
            job_postings,
            built_at: Utc::now(),
        }
    }

    #[must_use]
    pub fn students(&self) -> &BTreeMap<String, Student> {
        &self.students
    }

    #[must_use]
    pub fn jobs(&self) -> &BTreeMap<String, JobPosting> {
        &self.jobs
    }

    #[must_use]
    pub fn student(&self, id: &str) -> Option<&Student> {
        self.students.get(id)
    }

    #[must_use]
    pub fn job(&self, id: &str) -> Option<&JobPosting> {
        self.jobs.get(id)
    }

    #[must_use]
    pub fn built_at(&self) -> DateTime<Utc> {
        self.built_at
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.students.is_empty() && self.jobs.is_empty()
    }

    /// Whether the student's indexed text contains the token.
    pub(crate) fn student_has_token(&self, id: &str, token: &str) -> bool {
        self.student_postings
            .get(token)
            .is_some_and(|ids| ids.contains(id))
    }

    pub(crate) fn job_has_token(&self, id: &str, token: &str) -> bool {
        self.job_postings
            .get(token)
            .is_some_and(|ids| ids.contains(id))
    }
}

/// Keyword fields indexed for students.
fn student_text(student: &Student) -> String {
    let mut text = String::new();
    for part in [
        student.program.as_deref(),
        student.career_interest.as_deref(),
        student.learning_style.as_deref(),
        student.full_name.as_deref(),
    ]
    .into_iter()
    .flatten()
    {
        text.push_str(part);
        text.push(' ');
    }
    for gap in &student.skill_gaps {
        text.push_str(gap);
        text.push(' ');
    }
    for course in &student.recommended_courses {
        text.push_str(course);
        text.push(' ');
    }
    text
}

/// Keyword fields indexed for job postings.
fn job_text(job: &JobPosting) -> String {
    let mut text = String::new();
    for part in [
        job.title.as_deref(),
        job.company.as_deref(),
        job.location.as_deref(),
    ]
    .into_iter()
    .flatten()
    {
        text.push_str(part);
        text.push(' ');
    }
    for skill in &job.required_skills {
        text.push_str(skill);
        text.push(' ');
    }
    text
}

/// Lowercase, split on non-alphanumerics, deduplicate preserving order.
#[must_use]
pub fn tokenize(text: &str) -> Vec<String> {
    text.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(String::from)
        .unique()
        .collect()
}

/// Shared pointer to the current index snapshot.
///
/// `publish` swaps the pointer under a short write lock; `current` clones the
/// `Arc` under a read lock. Queries run against whichever snapshot they
/// grabbed, unaffected by later publications.
#[derive(Debug, Default)]
pub struct IndexHandle {
    current: RwLock<Arc<SearchIndex>>,
}

impl IndexHandle {
    /// Handle starting with an empty snapshot.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Atomically replace the current snapshot, returning the shared copy.
    pub fn publish(&self, index: SearchIndex) -> Arc<SearchIndex> {
        let index = Arc::new(index);
        debug!(
            students = index.students.len(),
            jobs = index.jobs.len(),
            "publishing index snapshot"
        );
        *self.current.write() = Arc::clone(&index);
        index
    }

    /// The snapshot queries should run against right now.
    #[must_use]
    pub fn current(&self) -> Arc<SearchIndex> {
        Arc::clone(&self.current.read())
    }
}
