//! Query-time ranking.
//!
//! Relevance is a weighted sum of the keyword-match fraction and a secondary
//! signal: student data quality, or job recency. Ties break on entity id so
//! the same query against the same snapshot always returns the same order.

use std::cmp::Ordering;
use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::Config;
use crate::error::{EdError, Result};
use crate::model::{JobPosting, Student};
use crate::search::filters::{parse_job_filters, parse_student_filters, FilterValue};
use crate::search::index::{tokenize, SearchIndex};

/// Which entity family a request targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchKind {
    Student,
    Job,
}

/// A search request as handed over by the serving layer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchRequest {
    pub kind: SearchKind,
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub filters: BTreeMap<String, FilterValue>,
    /// Maximum results to return; must be positive.
    pub limit: usize,
    /// Include closed, expired, and past-deadline postings.
    #[serde(default)]
    pub include_historical: bool,
}

impl SearchRequest {
    #[must_use]
    pub fn new(kind: SearchKind, limit: usize) -> Self {
        Self {
            kind,
            text: String::new(),
            filters: BTreeMap::new(),
            limit,
            include_historical: false,
        }
    }

    #[must_use]
    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text = text.into();
        self
    }

    #[must_use]
    pub fn with_filter(mut self, field: impl Into<String>, value: FilterValue) -> Self {
        self.filters.insert(field.into(), value);
        self
    }

    #[must_use]
    pub fn include_historical(mut self) -> Self {
        self.include_historical = true;
        self
    }
}

/// One ranked result: the entity id, its relevance, and the entity rendered
/// as a plain field mapping for the serving layer to encode.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchHit {
    pub id: String,
    pub kind: SearchKind,
    pub score: f64,
    pub fields: serde_json::Value,
}

/// Answer a request against one snapshot, using the current wall clock for
/// deadline checks and recency decay.
pub fn query(index: &SearchIndex, request: &SearchRequest, config: &Config) -> Result<Vec<SearchHit>> {
    query_at(index, request, config, Utc::now())
}

/// Answer a request with an explicit `as_of` instant.
pub fn query_at(
    index: &SearchIndex,
    request: &SearchRequest,
    config: &Config,
    as_of: DateTime<Utc>,
) -> Result<Vec<SearchHit>> {
    if request.limit == 0 {
        return Err(EdError::validation("limit", "must be greater than zero"));
    }

    // Validation happens before any scoring.
    let hits = match request.kind {
        SearchKind::Student => {
            let filters = parse_student_filters(&request.filters)?;
            rank_students(index, request, &filters, config)?
        }
        SearchKind::Job => {
            let filters = parse_job_filters(&request.filters)?;
            rank_jobs(index, request, &filters, config, as_of)?
        }
    };

    debug!(
        kind = ?request.kind,
        text = %request.text,
        results = hits.len(),
        "query answered"
    );
    Ok(hits)
}

fn rank_students(
    index: &SearchIndex,
    request: &SearchRequest,
    filters: &[crate::search::filters::StudentFilter],
    config: &Config,
) -> Result<Vec<SearchHit>> {
    let tokens = tokenize(&request.text);
    let mut scored: Vec<(f64, &String, &Student)> = index
        .students()
        .iter()
        .filter(|(_, student)| filters.iter().all(|f| f.matches(student)))
        .map(|(id, student)| {
            let keyword = keyword_fraction(&tokens, |t| index.student_has_token(id, t));
            let score = config.search.keyword_weight * keyword
                + config.search.secondary_weight * student.quality_score;
            (score, id, student)
        })
        .collect();

    sort_and_truncate(&mut scored, request.limit);
    scored
        .into_iter()
        .map(|(score, id, student)| {
            Ok(SearchHit {
                id: id.clone(),
                kind: SearchKind::Student,
                score,
                fields: serde_json::to_value(student)?,
            })
        })
        .collect()
}

fn rank_jobs(
    index: &SearchIndex,
    request: &SearchRequest,
    filters: &[crate::search::filters::JobFilter],
    config: &Config,
    as_of: DateTime<Utc>,
) -> Result<Vec<SearchHit>> {
    let tokens = tokenize(&request.text);
    let staleness_days = config.merge.staleness_days;
    let mut scored: Vec<(f64, &String, &JobPosting)> = index
        .jobs()
        .iter()
        .filter(|(_, job)| request.include_historical || job.is_open(as_of))
        .filter(|(_, job)| filters.iter().all(|f| f.matches(job)))
        .map(|(id, job)| {
            let keyword = keyword_fraction(&tokens, |t| index.job_has_token(id, t));
            let recency = posting_recency(job.posting_date, as_of, staleness_days);
            let score = config.search.keyword_weight * keyword
                + config.search.secondary_weight * recency;
            (score, id, job)
        })
        .collect();

    sort_and_truncate(&mut scored, request.limit);
    scored
        .into_iter()
        .map(|(score, id, job)| {
            Ok(SearchHit {
                id: id.clone(),
                kind: SearchKind::Job,
                score,
                fields: serde_json::to_value(job)?,
            })
        })
        .collect()
}

/// Fraction of query tokens present in the entity's indexed text. An empty
/// query contributes nothing, leaving ranking to the secondary signal.
fn keyword_fraction(tokens: &[String], has_token: impl Fn(&str) -> bool) -> f64 {
    if tokens.is_empty() {
        return 0.0;
    }
    let matched = tokens.iter().filter(|t| has_token(t)).count();
    matched as f64 / tokens.len() as f64
}

/// Linear decay from 1.0 for a posting dated `as_of` to 0.0 at the staleness
/// window; undated postings score 0.
fn posting_recency(
    posting_date: Option<DateTime<Utc>>,
    as_of: DateTime<Utc>,
    staleness_days: u32,
) -> f64 {
    let Some(posted) = posting_date else {
        return 0.0;
    };
    let age_days = as_of.signed_duration_since(posted).num_days().max(0) as f64;
    (1.0 - age_days / f64::from(staleness_days)).clamp(0.0, 1.0)
}

fn sort_and_truncate<T>(scored: &mut Vec<(f64, &String, T)>, limit: usize) {
    scored.sort_by(|a, b| {
        b.0.partial_cmp(&a.0)
            .unwrap_or(Ordering::Equal)
            .then_with(|| a.1.cmp(b.1))
    });
    scored.truncate(limit);
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use chrono::Duration;

    use crate::model::{EngagementLevel, JobStatus};

    use super::*;

    fn student(id: &str, program: &str, gpa: f64, quality: f64) -> Student {
        Student {
            student_id: id.to_string(),
            first_name: None,
            last_name: None,
            full_name: None,
            email: None,
            program: Some(program.to_string()),
            gpa: Some(gpa),
            credits: None,
            performance_score: None,
            engagement_level: Some(EngagementLevel::Medium),
            learning_style: None,
            career_interest: None,
            completed_courses: BTreeSet::new(),
            skill_gaps: BTreeSet::new(),
            recommended_courses: Vec::new(),
            job_matches: Vec::new(),
            quality_score: quality,
            sources: BTreeSet::new(),
            last_updated: Utc::now(),
        }
    }

    fn job(id: &str, title: &str, days_old: i64, deadline_days: Option<i64>) -> JobPosting {
        let now = Utc::now();
        JobPosting {
            job_posting_id: id.to_string(),
            title: Some(title.to_string()),
            company: Some("Tech Corp".into()),
            location: Some("San Francisco, CA".into()),
            required_skills: ["Python".to_string()].into(),
            salary_range: None,
            status: JobStatus::Active,
            posting_date: Some(now - Duration::days(days_old)),
            application_deadline: deadline_days.map(|d| now + Duration::days(d)),
            quality_score: 0.7,
            sources: BTreeSet::new(),
            last_updated: now,
        }
    }

    fn student_index(students: Vec<Student>) -> SearchIndex {
        SearchIndex::build(
            students
                .into_iter()
                .map(|s| (s.student_id.clone(), s))
                .collect(),
            BTreeMap::new(),
        )
    }

    fn job_index(jobs: Vec<JobPosting>) -> SearchIndex {
        SearchIndex::build(
            BTreeMap::new(),
            jobs.into_iter()
                .map(|j| (j.job_posting_id.clone(), j))
                .collect(),
        )
    }

    #[test]
    fn test_min_gpa_filter_narrows_results() {
        let index = student_index(vec![
            student("STU001", "Computer Science", 3.8, 0.9),
            student("STU002", "Mathematics", 3.2, 0.9),
        ]);
        let request = SearchRequest::new(SearchKind::Student, 10)
            .with_text("Computer Science")
            .with_filter("min_gpa", FilterValue::Number(3.5));

        let hits = query(&index, &request, &Config::default()).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, "STU001");
    }

    #[test]
    fn test_keyword_fraction_drives_ranking() {
        let index = student_index(vec![
            student("STU001", "Computer Science", 3.8, 0.5),
            student("STU002", "Computer Engineering", 3.8, 0.5),
        ]);
        let request = SearchRequest::new(SearchKind::Student, 10).with_text("computer science");

        let hits = query(&index, &request, &Config::default()).unwrap();
        assert_eq!(hits[0].id, "STU001");
        assert!(hits[0].score > hits[1].score);
    }

    #[test]
    fn test_quality_breaks_equal_keyword_scores() {
        let index = student_index(vec![
            student("STU001", "Computer Science", 3.8, 0.2),
            student("STU002", "Computer Science", 3.8, 0.9),
        ]);
        let request = SearchRequest::new(SearchKind::Student, 10).with_text("computer");

        let hits = query(&index, &request, &Config::default()).unwrap();
        assert_eq!(hits[0].id, "STU002");
    }

    #[test]
    fn test_tie_breaks_by_id_for_determinism() {
        let index = student_index(vec![
            student("STU002", "Computer Science", 3.8, 0.5),
            student("STU001", "Computer Science", 3.8, 0.5),
        ]);
        let request = SearchRequest::new(SearchKind::Student, 10).with_text("computer");

        let first = query(&index, &request, &Config::default()).unwrap();
        let second = query(&index, &request, &Config::default()).unwrap();
        let ids: Vec<&str> = first.iter().map(|h| h.id.as_str()).collect();
        assert_eq!(ids, vec!["STU001", "STU002"]);
        assert_eq!(
            ids,
            second.iter().map(|h| h.id.as_str()).collect::<Vec<_>>()
        );
    }

    #[test]
    fn test_limit_truncates() {
        let index = student_index(
            (0..10)
                .map(|i| student(&format!("STU{i:03}"), "Computer Science", 3.5, 0.5))
                .collect(),
        );
        let request = SearchRequest::new(SearchKind::Student, 3).with_text("computer");
        let hits = query(&index, &request, &Config::default()).unwrap();
        assert_eq!(hits.len(), 3);
    }

    #[test]
    fn test_zero_limit_rejected() {
        let index = student_index(Vec::new());
        let request = SearchRequest::new(SearchKind::Student, 0);
        let err = query(&index, &request, &Config::default()).unwrap_err();
        assert!(err.to_string().contains("limit"));
    }

    #[test]
    fn test_empty_candidates_yield_empty_result() {
        let index = student_index(Vec::new());
        let request = SearchRequest::new(SearchKind::Student, 10).with_text("anything");
        let hits = query(&index, &request, &Config::default()).unwrap();
        assert!(hits.is_empty());
    }

    #[test]
    fn test_unknown_filter_rejected_before_scoring() {
        let index = student_index(vec![student("STU001", "CS", 3.8, 0.9)]);
        let request = SearchRequest::new(SearchKind::Student, 10)
            .with_filter("favourite_color", FilterValue::Text("green".into()));
        let err = query(&index, &request, &Config::default()).unwrap_err();
        assert!(err.to_string().contains("favourite_color"));
    }

    #[test]
    fn test_past_deadline_jobs_excluded_from_active_search() {
        let index = job_index(vec![
            job("JOB001", "Software Engineer", 5, Some(-1)),
            job("JOB002", "Software Engineer", 5, Some(30)),
        ]);
        let request = SearchRequest::new(SearchKind::Job, 10).with_text("engineer");

        let hits = query(&index, &request, &Config::default()).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, "JOB002");
    }

    #[test]
    fn test_historical_request_includes_past_deadline() {
        let index = job_index(vec![
            job("JOB001", "Software Engineer", 5, Some(-1)),
            job("JOB002", "Software Engineer", 5, Some(30)),
        ]);
        let request = SearchRequest::new(SearchKind::Job, 10)
            .with_text("engineer")
            .include_historical();

        let hits = query(&index, &request, &Config::default()).unwrap();
        assert_eq!(hits.len(), 2);
    }

    #[test]
    fn test_job_recency_breaks_equal_keyword_scores() {
        let index = job_index(vec![
            job("JOB001", "Software Engineer", 60, None),
            job("JOB002", "Software Engineer", 2, None),
        ]);
        let request = SearchRequest::new(SearchKind::Job, 10).with_text("engineer");

        let hits = query(&index, &request, &Config::default()).unwrap();
        assert_eq!(hits[0].id, "JOB002");
    }

    #[test]
    fn test_hit_fields_carry_entity_data() {
        let index = student_index(vec![student("STU001", "Computer Science", 3.8, 0.9)]);
        let request = SearchRequest::new(SearchKind::Student, 10).with_text("computer");
        let hits = query(&index, &request, &Config::default()).unwrap();
        assert_eq!(hits[0].fields["program"], "Computer Science");
        assert_eq!(hits[0].fields["gpa"], 3.8);
    }
}
