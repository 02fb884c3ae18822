//! Recommendation deriver.
//!
//! Given a unified student, the configured role-skill map, the course
//! catalog, and a job index snapshot, computes skill gaps, an ordered
//! course-recommendation list, and ranked job matches. Derivation is pure
//! given its inputs and an `as_of` instant, so [`Recommender::derive_all`]
//! can safely fan out across students on a rayon pool.
//!
//! Job similarity is plain set overlap: |A ∩ B| / sqrt(|A| * |B|) over the
//! student's skill set and the posting's required skills, both lowercased.

use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use rayon::prelude::*;
use tracing::debug;

use crate::config::Config;
use crate::model::{Course, JobMatch, Student};
use crate::search::SearchIndex;

pub struct Recommender<'a> {
    config: &'a Config,
}

impl<'a> Recommender<'a> {
    #[must_use]
    pub fn new(config: &'a Config) -> Self {
        Self { config }
    }

    /// Derive recommendations against the current wall clock.
    #[must_use]
    pub fn derive(&self, student: &Student, catalog: &[Course], jobs: &SearchIndex) -> Student {
        self.derive_at(student, catalog, jobs, Utc::now())
    }

    /// Returns an enriched copy of the student; the inputs are untouched.
    #[must_use]
    pub fn derive_at(
        &self,
        student: &Student,
        catalog: &[Course],
        jobs: &SearchIndex,
        as_of: DateTime<Utc>,
    ) -> Student {
        let evidenced = evidenced_skills(student, catalog);
        let gaps = self.skill_gaps(student, &evidenced);
        let recommended_courses =
            recommend_courses(&gaps, catalog, self.config.recommend.max_courses);

        let mut matchable: BTreeSet<String> = evidenced;
        matchable.extend(interest_keywords(student));
        let job_matches = match_jobs(&matchable, jobs, as_of, self.config.recommend.max_jobs);

        debug!(
            student_id = %student.student_id,
            gaps = gaps.len(),
            courses = recommended_courses.len(),
            jobs = job_matches.len(),
            "derived recommendations"
        );

        let mut enriched = student.clone();
        enriched.skill_gaps = gaps;
        enriched.recommended_courses = recommended_courses;
        enriched.job_matches = job_matches;
        enriched
    }

    /// Enrich every student in parallel. Per-student derivation is
    /// independent and side-effect-free.
    #[must_use]
    pub fn derive_all(
        &self,
        students: &BTreeMap<String, Student>,
        catalog: &[Course],
        jobs: &SearchIndex,
        as_of: DateTime<Utc>,
    ) -> BTreeMap<String, Student> {
        students
            .par_iter()
            .map(|(id, student)| (id.clone(), self.derive_at(student, catalog, jobs, as_of)))
            .collect()
    }

    /// Skills the target role requires minus skills the student evidences,
    /// joined with gaps already asserted by analytics sources.
    fn skill_gaps(&self, student: &Student, evidenced: &BTreeSet<String>) -> BTreeSet<String> {
        let mut gaps: BTreeSet<String> = student
            .skill_gaps
            .iter()
            .map(|g| g.to_lowercase())
            .collect();
        if let Some(interest) = &student.career_interest {
            if let Some(required) = self.config.recommend.skills_for_role(interest) {
                for skill in required {
                    let skill = skill.to_lowercase();
                    if !evidenced.contains(&skill) {
                        gaps.insert(skill);
                    }
                }
            }
        }
        gaps
    }
}

/// Skills evidenced by completed coursework: the tags of every catalog
/// course the student finished, lowercased.
fn evidenced_skills(student: &Student, catalog: &[Course]) -> BTreeSet<String> {
    catalog
        .iter()
        .filter(|course| student.completed_courses.contains(&course.code))
        .flat_map(|course| course.tags.iter().map(|t| t.to_lowercase()))
        .collect()
}

fn interest_keywords(student: &Student) -> BTreeSet<String> {
    student
        .career_interest
        .as_deref()
        .map(|interest| {
            interest
                .split_whitespace()
                .map(str::to_lowercase)
                .collect()
        })
        .unwrap_or_default()
}

/// For each gap in order, the highest-credit course covering it, ties broken
/// by lowest course code. Deduplicated, capped at `max_courses`.
fn recommend_courses(gaps: &BTreeSet<String>, catalog: &[Course], max_courses: usize) -> Vec<String> {
    let mut recommended = Vec::new();
    for gap in gaps {
        if recommended.len() >= max_courses {
            break;
        }
        let best = catalog
            .iter()
            .filter(|course| course.covers(gap))
            .max_by(|a, b| {
                a.credits
                    .cmp(&b.credits)
                    .then_with(|| b.code.cmp(&a.code))
            });
        if let Some(course) = best {
            if !recommended.contains(&course.code) {
                recommended.push(course.code.clone());
            }
        }
    }
    recommended
}

/// Rank open postings by skill-set similarity; ties break on most recent
/// posting date, then id, so the list is reproducible.
fn match_jobs(
    skills: &BTreeSet<String>,
    jobs: &SearchIndex,
    as_of: DateTime<Utc>,
    max_jobs: usize,
) -> Vec<JobMatch> {
    let mut matches: Vec<JobMatch> = jobs
        .jobs()
        .values()
        .filter(|job| job.is_open(as_of))
        .filter_map(|job| {
            let required: BTreeSet<String> = job
                .required_skills
                .iter()
                .map(|s| s.to_lowercase())
                .collect();
            let similarity = set_cosine(skills, &required);
            (similarity > 0.0).then(|| JobMatch {
                job_posting_id: job.job_posting_id.clone(),
                title: job.title.clone(),
                company: job.company.clone(),
                similarity,
                posting_date: job.posting_date,
                reasons: skills
                    .intersection(&required)
                    .map(|skill| format!("matches required skill: {skill}"))
                    .collect(),
            })
        })
        .collect();

    matches.sort_by(|a, b| {
        b.similarity
            .partial_cmp(&a.similarity)
            .unwrap_or(Ordering::Equal)
            .then_with(|| b.posting_date.cmp(&a.posting_date))
            .then_with(|| a.job_posting_id.cmp(&b.job_posting_id))
    });
    matches.truncate(max_jobs);
    matches
}

/// Cosine similarity of two sets under binary term vectors.
fn set_cosine(a: &BTreeSet<String>, b: &BTreeSet<String>) -> f64 {
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    let intersection = a.intersection(b).count();
    intersection as f64 / ((a.len() * b.len()) as f64).sqrt()
}
