//! Canonical data model.
//!
//! Raw records arrive source-tagged from external connectors and are consumed
//! exactly once by the unifier. Unified entities ([`Student`], [`JobPosting`],
//! [`Course`]) are created by the unifier, enriched by the recommender, then
//! frozen into an index snapshot; they are never mutated after indexing.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

/// Upstream system a raw record came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Source {
    Oracle,
    Workday,
    Tableau,
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Oracle => write!(f, "oracle"),
            Self::Workday => write!(f, "workday"),
            Self::Tableau => write!(f, "tableau"),
        }
    }
}

/// Entity family a raw record describes.
///
/// `Analytic` records carry per-student metrics (performance, engagement,
/// career interest) and merge into the student with the same identity key.
/// Wire values outside the known set land on `Unknown` and are rejected by
/// the unifier rather than silently dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordKind {
    Student,
    Course,
    Job,
    Analytic,
    #[serde(other)]
    Unknown,
}

/// A scalar field value on a raw record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    Number(f64),
    List(Vec<String>),
    Text(String),
}

impl FieldValue {
    #[must_use]
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Self::Number(n) => Some(*n),
            Self::Text(t) => t.trim().parse().ok(),
            Self::List(_) => None,
        }
    }

    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(t) => Some(t.as_str()),
            _ => None,
        }
    }

    /// Interpret the value as a list of strings. Text values split on the
    /// delimiters the upstream systems use (comma, semicolon, pipe).
    #[must_use]
    pub fn as_list(&self) -> Vec<String> {
        match self {
            Self::List(items) => items
                .iter()
                .map(|s| clean_text(s))
                .filter(|s| !s.is_empty())
                .collect(),
            Self::Text(t) => t
                .split([',', ';', '|'])
                .map(clean_text)
                .filter(|s| !s.is_empty())
                .collect(),
            Self::Number(_) => Vec::new(),
        }
    }

    /// A value that carries no information and should not participate in
    /// merging.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        match self {
            Self::Text(t) => t.trim().is_empty(),
            Self::List(items) => items.iter().all(|s| s.trim().is_empty()),
            Self::Number(n) => n.is_nan(),
        }
    }
}

/// One source-tagged record handed to the unifier by an external connector.
/// Immutable once ingested.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawRecord {
    pub source: Source,
    pub kind: RecordKind,
    pub identity_key: String,
    pub fields: BTreeMap<String, FieldValue>,
    pub observed_at: DateTime<Utc>,
}

impl RawRecord {
    #[must_use]
    pub fn field(&self, name: &str) -> Option<&FieldValue> {
        self.fields.get(name)
    }
}

/// Student engagement bucket reported by analytics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EngagementLevel {
    Low,
    Medium,
    High,
}

impl FromStr for EngagementLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "low" => Ok(Self::Low),
            "medium" => Ok(Self::Medium),
            // Tableau reports a "Very High" bucket; it folds into High.
            "high" | "very high" => Ok(Self::High),
            other => Err(format!("unrecognized engagement level: {other}")),
        }
    }
}

/// A unified student entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Student {
    /// Stable identity and primary merge key, unique in the unified set.
    pub student_id: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub full_name: Option<String>,
    pub email: Option<String>,
    pub program: Option<String>,
    /// Grade point average, in [0.0, 4.0].
    pub gpa: Option<f64>,
    /// Earned credits, non-negative.
    pub credits: Option<f64>,
    /// Analytics performance metric, in [0.0, 100.0].
    pub performance_score: Option<f64>,
    pub engagement_level: Option<EngagementLevel>,
    pub learning_style: Option<String>,
    pub career_interest: Option<String>,
    /// Course codes with a completed enrollment; evidence for skills.
    pub completed_courses: BTreeSet<String>,
    pub skill_gaps: BTreeSet<String>,
    /// Ordered, capped course suggestions produced by the recommender.
    pub recommended_courses: Vec<String>,
    pub job_matches: Vec<JobMatch>,
    /// Completeness / agreement / recency measure in [0.0, 1.0], recomputed
    /// on every merge.
    pub quality_score: f64,
    pub sources: BTreeSet<Source>,
    pub last_updated: DateTime<Utc>,
}

/// One job suggested for a student, with the similarity that ranked it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobMatch {
    pub job_posting_id: String,
    pub title: Option<String>,
    pub company: Option<String>,
    pub similarity: f64,
    pub posting_date: Option<DateTime<Utc>>,
    /// Human-readable explanations for the match, one per matched skill.
    pub reasons: Vec<String>,
}

/// Lifecycle state of a job posting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Active,
    Closed,
    Expired,
}

impl FromStr for JobStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "active" | "open" => Ok(Self::Active),
            "closed" => Ok(Self::Closed),
            "expired" => Ok(Self::Expired),
            other => Err(format!("unrecognized job status: {other}")),
        }
    }
}

/// A salary range parsed out of the free-text formats the upstream systems
/// emit ("80k-120k", "$80,000 - $120,000", "100000").
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SalaryRange {
    pub low: u64,
    pub high: u64,
    pub currency: String,
}

impl SalaryRange {
    /// Parse a raw salary string. Returns `None` when no usable number is
    /// present. Amounts that do not fit a `u64` are skipped like any other
    /// unparseable token rather than failing the record.
    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        let re = salary_pattern();
        let mut amounts = Vec::new();
        for cap in re.captures_iter(raw) {
            if amounts.len() == 2 {
                break;
            }
            let digits: String = cap[1].chars().filter(char::is_ascii_digit).collect();
            let Ok(value) = digits.parse::<u64>() else {
                continue;
            };
            let value = if cap.get(2).is_some_and(|m| !m.as_str().is_empty()) {
                match value.checked_mul(1_000) {
                    Some(scaled) => scaled,
                    None => continue,
                }
            } else {
                value
            };
            amounts.push(value);
        }
        let (low, high) = match amounts.as_slice() {
            [] => return None,
            [one] => (*one, *one),
            [a, b, ..] => (*a.min(b), *a.max(b)),
        };
        Some(Self {
            low,
            high,
            currency: "USD".to_string(),
        })
    }
}

fn salary_pattern() -> &'static regex::Regex {
    use std::sync::OnceLock;
    static RE: OnceLock<regex::Regex> = OnceLock::new();
    RE.get_or_init(|| regex::Regex::new(r"(\d[\d,]*)\s*([kK]?)").expect("valid salary pattern"))
}

/// A unified job posting entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobPosting {
    /// Merge key, unique in the unified set.
    pub job_posting_id: String,
    pub title: Option<String>,
    pub company: Option<String>,
    pub location: Option<String>,
    pub required_skills: BTreeSet<String>,
    pub salary_range: Option<SalaryRange>,
    pub status: JobStatus,
    pub posting_date: Option<DateTime<Utc>>,
    pub application_deadline: Option<DateTime<Utc>>,
    pub quality_score: f64,
    pub sources: BTreeSet<Source>,
    pub last_updated: DateTime<Utc>,
}

impl JobPosting {
    /// Whether the posting accepts applications at `as_of`: status is active
    /// and the deadline, if declared, has not passed. Postings past deadline
    /// stay in the unified set for historical queries.
    #[must_use]
    pub fn is_open(&self, as_of: DateTime<Utc>) -> bool {
        self.status == JobStatus::Active
            && self.application_deadline.is_none_or(|d| d >= as_of)
    }
}

/// A catalog course, either supplied directly or unified from COURSE records.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Course {
    pub code: String,
    pub name: Option<String>,
    pub description: Option<String>,
    pub credits: u32,
    /// Skills the course teaches, lowercased.
    pub tags: BTreeSet<String>,
}

impl Course {
    /// Whether this course covers the given skill, via tags or description.
    #[must_use]
    pub fn covers(&self, skill: &str) -> bool {
        let needle = skill.trim().to_lowercase();
        if needle.is_empty() {
            return false;
        }
        self.tags.contains(&needle)
            || self
                .description
                .as_deref()
                .is_some_and(|d| d.to_lowercase().contains(&needle))
    }
}

/// Why a raw record was excluded from the unified set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectReason {
    MissingIdentityKey,
    UnrecognizedKind,
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingIdentityKey => write!(f, "missing identity key"),
            Self::UnrecognizedKind => write!(f, "unrecognized record kind"),
        }
    }
}

/// A rejected record together with the reason. Non-fatal: rejects are
/// accumulated and reported, never raised.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RejectedRecord {
    pub record: RawRecord,
    pub reason: RejectReason,
}

/// Trim and collapse internal whitespace, the normalization applied to every
/// text field before merging.
#[must_use]
pub fn clean_text(raw: &str) -> String {
    raw.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Parse the timestamp formats the upstream systems emit: RFC 3339,
/// `YYYY-MM-DD HH:MM:SS`, and bare `YYYY-MM-DD`.
#[must_use]
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let trimmed = raw.trim();
    if let Ok(ts) = DateTime::parse_from_rfc3339(trimmed) {
        return Some(ts.with_timezone(&Utc));
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(trimmed, "%Y-%m-%d %H:%M:%S") {
        return Some(naive.and_utc());
    }
    if let Ok(date) = NaiveDate::parse_from_str(trimmed, "%Y-%m-%d") {
        return Some(date.and_hms_opt(0, 0, 0)?.and_utc());
    }
    None
}
