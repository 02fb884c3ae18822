//! End-to-end batch tests: raw multi-source records in, ranked search
//! results out.

use chrono::{DateTime, Duration, Utc};

use edunify::config::Config;
use edunify::model::{Course, FieldValue, RawRecord, RecordKind, RejectReason, Source};
use edunify::pipeline::{run_batch_at, BatchReport};
use edunify::search::{query_at, FilterValue as Constraint, IndexHandle, SearchKind, SearchRequest};

fn record(
    source: Source,
    kind: RecordKind,
    key: &str,
    fields: &[(&str, FieldValue)],
    observed_at: DateTime<Utc>,
) -> RawRecord {
    RawRecord {
        source,
        kind,
        identity_key: key.to_string(),
        fields: fields
            .iter()
            .map(|(k, v)| ((*k).to_string(), v.clone()))
            .collect(),
        observed_at,
    }
}

fn text(s: &str) -> FieldValue {
    FieldValue::Text(s.to_string())
}

fn list(items: &[&str]) -> FieldValue {
    FieldValue::List(items.iter().map(|s| (*s).to_string()).collect())
}

/// Three sources describing two students plus two job postings.
fn sample_batch(now: DateTime<Utc>) -> Vec<RawRecord> {
    vec![
        record(
            Source::Oracle,
            RecordKind::Student,
            "STU001",
            &[
                ("first_name", text("John")),
                ("last_name", text("Doe")),
                ("email", text("john@example.com")),
                ("academic_program", text("Computer Science")),
                ("gpa", FieldValue::Number(3.8)),
                ("completed_courses", list(&["CS101", "CS201"])),
            ],
            now - Duration::days(2),
        ),
        record(
            Source::Workday,
            RecordKind::Student,
            "STU001",
            &[
                ("academic_program", text("Computer Science")),
                ("credits", FieldValue::Number(90.0)),
            ],
            now - Duration::days(1),
        ),
        record(
            Source::Tableau,
            RecordKind::Analytic,
            "STU001",
            &[
                ("performance_score", FieldValue::Number(85.5)),
                ("engagement_level", text("High")),
                ("career_interest", text("Software Engineering")),
                ("skill_gaps", list(&["Machine Learning", "System Design"])),
            ],
            now - Duration::hours(6),
        ),
        record(
            Source::Oracle,
            RecordKind::Student,
            "STU002",
            &[
                ("first_name", text("Jane")),
                ("academic_program", text("Mathematics")),
                ("gpa", FieldValue::Number(3.2)),
            ],
            now - Duration::days(2),
        ),
        record(
            Source::Workday,
            RecordKind::Job,
            "JOB001",
            &[
                ("job_title", text("Software Engineer")),
                ("company", text("Tech Corp")),
                ("location", text("San Francisco, CA")),
                ("required_skills", list(&["Python", "AWS", "Docker"])),
                ("salary_range", text("120k-160k")),
                ("status", text("ACTIVE")),
                ("posting_date", text("2026-08-20")),
            ],
            now - Duration::days(1),
        ),
        record(
            Source::Workday,
            RecordKind::Job,
            "JOB002",
            &[
                ("job_title", text("Data Analyst")),
                ("company", text("Data Inc")),
                ("location", text("New York, NY")),
                ("required_skills", list(&["SQL", "Tableau"])),
                ("salary_range", text("$70,000 - $90,000")),
                ("status", text("ACTIVE")),
                ("application_deadline", text("2026-01-01")),
            ],
            now - Duration::days(1),
        ),
    ]
}

fn run(now: DateTime<Utc>) -> (BatchReport, Config) {
    let config = Config::default();
    let handle = IndexHandle::new();
    let report = run_batch_at(sample_batch(now), &[], &config, &handle, now).unwrap();
    (report, config)
}

#[test]
fn test_three_sources_merge_into_one_student() {
    let now = Utc::now();
    let (report, _) = run(now);

    assert_eq!(report.summary.records_in, 6);
    assert_eq!(report.summary.students_merged, 2);
    assert_eq!(report.summary.jobs_merged, 2);
    assert!(report.rejects.is_empty());

    let student = report.index.student("STU001").unwrap();
    assert_eq!(student.program.as_deref(), Some("Computer Science"));
    assert_eq!(student.gpa, Some(3.8));
    assert_eq!(student.performance_score, Some(85.5));
    assert_eq!(student.full_name.as_deref(), Some("John Doe"));
    assert_eq!(student.sources.len(), 3);
    assert!(student.quality_score > 0.0 && student.quality_score <= 1.0);
}

#[test]
fn test_student_search_with_min_gpa_filter() {
    let now = Utc::now();
    let (report, config) = run(now);

    let request = SearchRequest::new(SearchKind::Student, 10)
        .with_text("Computer Science")
        .with_filter("min_gpa", Constraint::Number(3.5));
    let hits = query_at(&report.index, &request, &config, now).unwrap();

    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].id, "STU001");
    assert!(hits[0].score > 0.0);
    assert_eq!(hits[0].fields["program"], "Computer Science");
}

#[test]
fn test_past_deadline_job_only_in_historical_search() {
    let now = Utc::now();
    let (report, config) = run(now);

    // JOB002's deadline has passed by the 2026-08 clock.
    let active = SearchRequest::new(SearchKind::Job, 10).with_text("analyst");
    let hits = query_at(&report.index, &active, &config, now).unwrap();
    assert!(hits.iter().all(|h| h.id != "JOB002"));

    let historical = SearchRequest::new(SearchKind::Job, 10)
        .with_text("analyst")
        .include_historical();
    let hits = query_at(&report.index, &historical, &config, now).unwrap();
    assert!(hits.iter().any(|h| h.id == "JOB002"));
}

#[test]
fn test_job_search_with_location_and_salary_filters() {
    let now = Utc::now();
    let (report, config) = run(now);

    let request = SearchRequest::new(SearchKind::Job, 10)
        .with_filter("location", Constraint::Text("francisco".into()))
        .with_filter("min_salary", Constraint::Number(100_000.0));
    let hits = query_at(&report.index, &request, &config, now).unwrap();

    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].id, "JOB001");
    assert_eq!(hits[0].fields["salary_range"]["low"], 120_000);
}

#[test]
fn test_recommendations_flow_from_gaps_to_catalog() {
    let now = Utc::now();
    let config = Config::default();
    let handle = IndexHandle::new();

    let catalog = vec![
        Course {
            code: "ML301".into(),
            name: Some("Applied Machine Learning".into()),
            description: None,
            credits: 4,
            tags: ["machine learning".to_string()].into(),
        },
        Course {
            code: "SD200".into(),
            name: Some("System Design".into()),
            description: None,
            credits: 3,
            tags: ["system design".to_string()].into(),
        },
    ];

    let report = run_batch_at(sample_batch(now), &catalog, &config, &handle, now).unwrap();
    let student = report.index.student("STU001").unwrap();

    // Analytics asserted two gaps; each finds its covering course.
    assert!(student.skill_gaps.contains("machine learning"));
    assert!(student.skill_gaps.contains("system design"));
    assert_eq!(student.recommended_courses, vec!["ML301", "SD200"]);
}

#[test]
fn test_bad_records_rejected_with_reasons_in_summary() {
    let now = Utc::now();
    let config = Config::default();
    let handle = IndexHandle::new();

    let mut batch = sample_batch(now);
    batch.push(record(
        Source::Oracle,
        RecordKind::Student,
        "",
        &[("gpa", FieldValue::Number(3.0))],
        now,
    ));
    batch.push(record(Source::Tableau, RecordKind::Unknown, "X1", &[], now));

    let report = run_batch_at(batch, &[], &config, &handle, now).unwrap();
    assert_eq!(report.summary.rejected, 2);
    assert_eq!(
        report.summary.rejected_by_reason.get("missing identity key"),
        Some(&1)
    );
    assert_eq!(
        report.summary.rejected_by_reason.get("unrecognized record kind"),
        Some(&1)
    );
    assert_eq!(report.rejects[0].reason, RejectReason::MissingIdentityKey);
    // Good records still merged.
    assert_eq!(report.summary.students_merged, 2);
}

#[test]
fn test_unknown_filter_surfaces_as_validation_error() {
    let now = Utc::now();
    let (report, config) = run(now);

    let request = SearchRequest::new(SearchKind::Student, 10)
        .with_filter("star_sign", Constraint::Text("leo".into()));
    let err = query_at(&report.index, &request, &config, now).unwrap_err();
    assert_eq!(
        err.to_string(),
        "Invalid filter 'star_sign': unknown filter field"
    );
}

#[test]
fn test_summary_quality_distribution_covers_all_entities() {
    let now = Utc::now();
    let (report, _) = run(now);

    let counted: usize = report.summary.quality_histogram.values().sum();
    assert_eq!(
        counted,
        report.summary.students_merged + report.summary.jobs_merged
    );
    assert!(report.summary.mean_quality > 0.0);
    assert!(report.summary.mean_quality <= 1.0);
}
