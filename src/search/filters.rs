//! Filter parsing and evaluation.
//!
//! A request carries filters as a plain field→constraint mapping; the
//! serving layer forwards them untyped. Parsing happens before any scoring:
//! an unknown field or a constraint of the wrong shape yields a
//! [`EdError::Validation`] naming the offending filter, never a silently
//! ignored one.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::{EdError, Result};
use crate::model::{EngagementLevel, JobPosting, Student};

/// An untyped filter constraint as it arrives from the serving layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FilterValue {
    Number(f64),
    List(Vec<String>),
    Text(String),
}

/// A validated student filter.
#[derive(Debug, Clone, PartialEq)]
pub enum StudentFilter {
    Program(String),
    MinGpa(f64),
    MinQuality(f64),
    Engagement(EngagementLevel),
    CareerInterest(String),
    /// Any-match against the student's skill gaps.
    Skills(Vec<String>),
}

impl StudentFilter {
    #[must_use]
    pub fn matches(&self, student: &Student) -> bool {
        match self {
            Self::Program(program) => student
                .program
                .as_deref()
                .is_some_and(|p| p.eq_ignore_ascii_case(program)),
            Self::MinGpa(min) => student.gpa.is_some_and(|gpa| gpa >= *min),
            Self::MinQuality(min) => student.quality_score >= *min,
            Self::Engagement(level) => student.engagement_level == Some(*level),
            Self::CareerInterest(interest) => student
                .career_interest
                .as_deref()
                .is_some_and(|i| i.to_lowercase().contains(&interest.to_lowercase())),
            Self::Skills(skills) => skills.iter().any(|skill| {
                let needle = skill.to_lowercase();
                student.skill_gaps.iter().any(|g| g.to_lowercase() == needle)
            }),
        }
    }
}

/// A validated job filter.
#[derive(Debug, Clone, PartialEq)]
pub enum JobFilter {
    /// Substring match on location, case-insensitive.
    Location(String),
    Company(String),
    /// Any-match against required skills.
    Skills(Vec<String>),
    /// Posting's salary floor must reach this amount; postings without a
    /// parsed salary never match.
    MinSalary(f64),
}

impl JobFilter {
    #[must_use]
    pub fn matches(&self, job: &JobPosting) -> bool {
        match self {
            Self::Location(location) => job
                .location
                .as_deref()
                .is_some_and(|l| l.to_lowercase().contains(&location.to_lowercase())),
            Self::Company(company) => job
                .company
                .as_deref()
                .is_some_and(|c| c.eq_ignore_ascii_case(company)),
            Self::Skills(skills) => skills.iter().any(|skill| {
                let needle = skill.to_lowercase();
                job.required_skills.iter().any(|s| s.to_lowercase() == needle)
            }),
            Self::MinSalary(min) => job
                .salary_range
                .as_ref()
                .is_some_and(|range| range.low as f64 >= *min),
        }
    }
}

/// Validate the filter map of a student query.
pub fn parse_student_filters(
    filters: &BTreeMap<String, FilterValue>,
) -> Result<Vec<StudentFilter>> {
    filters
        .iter()
        .map(|(field, value)| match field.as_str() {
            "program" => Ok(StudentFilter::Program(expect_text(field, value)?)),
            "min_gpa" => Ok(StudentFilter::MinGpa(expect_number(field, value)?)),
            "min_quality" => Ok(StudentFilter::MinQuality(expect_number(field, value)?)),
            "engagement" => {
                let raw = expect_text(field, value)?;
                let level = raw
                    .parse::<EngagementLevel>()
                    .map_err(|err| EdError::validation(field, err))?;
                Ok(StudentFilter::Engagement(level))
            }
            "career_interest" => Ok(StudentFilter::CareerInterest(expect_text(field, value)?)),
            "skills" => Ok(StudentFilter::Skills(expect_list(field, value)?)),
            _ => Err(EdError::validation(field, "unknown filter field")),
        })
        .collect()
}

/// Validate the filter map of a job query.
pub fn parse_job_filters(filters: &BTreeMap<String, FilterValue>) -> Result<Vec<JobFilter>> {
    filters
        .iter()
        .map(|(field, value)| match field.as_str() {
            "location" => Ok(JobFilter::Location(expect_text(field, value)?)),
            "company" => Ok(JobFilter::Company(expect_text(field, value)?)),
            "skills" => Ok(JobFilter::Skills(expect_list(field, value)?)),
            "min_salary" => Ok(JobFilter::MinSalary(expect_number(field, value)?)),
            _ => Err(EdError::validation(field, "unknown filter field")),
        })
        .collect()
}

fn expect_text(field: &str, value: &FilterValue) -> Result<String> {
    match value {
        FilterValue::Text(t) if !t.trim().is_empty() => Ok(t.trim().to_string()),
        FilterValue::Text(_) => Err(EdError::validation(field, "constraint must not be empty")),
        _ => Err(EdError::validation(field, "expected a text constraint")),
    }
}

fn expect_number(field: &str, value: &FilterValue) -> Result<f64> {
    match value {
        FilterValue::Number(n) if n.is_finite() => Ok(*n),
        _ => Err(EdError::validation(field, "expected a number")),
    }
}

fn expect_list(field: &str, value: &FilterValue) -> Result<Vec<String>> {
    let items = match value {
        FilterValue::List(items) => items.clone(),
        FilterValue::Text(t) => t.split(',').map(|s| s.trim().to_string()).collect(),
        FilterValue::Number(_) => {
            return Err(EdError::validation(field, "expected a list of skills"));
        }
    };
    let items: Vec<String> = items.into_iter().filter(|s| !s.is_empty()).collect();
    if items.is_empty() {
        return Err(EdError::validation(field, "constraint must not be empty"));
    }
    Ok(items)
}
