//! Pipeline configuration.
//!
//! Configuration is an explicit value passed into each engine rather than
//! ambient state, so unification, derivation, and queries stay deterministic
//! and safe to run in parallel. [`Config::validate`] runs at startup and
//! fails fast on invalid weights or tolerances.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::error::{EdError, Result};
use crate::model::Source;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub merge: MergeConfig,
    #[serde(default)]
    pub quality: QualityWeights,
    #[serde(default)]
    pub recommend: RecommendConfig,
    #[serde(default)]
    pub search: SearchConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            merge: MergeConfig::default(),
            quality: QualityWeights::default(),
            recommend: RecommendConfig::default(),
            search: SearchConfig::default(),
        }
    }
}

impl Config {
    /// Validate the whole configuration. Called once at startup; scoring
    /// never runs against invalid weights.
    pub fn validate(&self) -> Result<()> {
        self.merge.validate()?;
        self.quality.validate()?;
        self.recommend.validate()?;
        self.search.validate()
    }
}

/// Source priorities and conflict tolerances for the record unifier.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MergeConfig {
    /// Priority order for academic truth (students, courses).
    #[serde(default = "default_academic_priority")]
    pub academic_priority: Vec<Source>,
    /// Priority order for job and career truth.
    #[serde(default = "default_career_priority")]
    pub career_priority: Vec<Source>,
    /// Numeric fields whose reporting sources disagree by more than this
    /// resolve by most recent observation instead of source priority.
    #[serde(default = "default_numeric_tolerance")]
    pub numeric_tolerance: f64,
    /// Window over which the recency component decays linearly to zero.
    #[serde(default = "default_staleness_days")]
    pub staleness_days: u32,
}

fn default_academic_priority() -> Vec<Source> {
    vec![Source::Oracle, Source::Workday, Source::Tableau]
}

fn default_career_priority() -> Vec<Source> {
    vec![Source::Workday, Source::Tableau]
}

fn default_numeric_tolerance() -> f64 {
    0.1
}

fn default_staleness_days() -> u32 {
    90
}

impl Default for MergeConfig {
    fn default() -> Self {
        Self {
            academic_priority: default_academic_priority(),
            career_priority: default_career_priority(),
            numeric_tolerance: default_numeric_tolerance(),
            staleness_days: default_staleness_days(),
        }
    }
}

impl MergeConfig {
    fn validate(&self) -> Result<()> {
        for (name, order) in [
            ("merge.academic_priority", &self.academic_priority),
            ("merge.career_priority", &self.career_priority),
        ] {
            if order.is_empty() {
                return Err(EdError::Config(format!("{name} must not be empty")));
            }
            let unique: BTreeSet<_> = order.iter().collect();
            if unique.len() != order.len() {
                return Err(EdError::Config(format!("{name} contains duplicate sources")));
            }
        }
        if !self.numeric_tolerance.is_finite() || self.numeric_tolerance < 0.0 {
            return Err(EdError::Config(
                "merge.numeric_tolerance must be a non-negative number".to_string(),
            ));
        }
        if self.staleness_days == 0 {
            return Err(EdError::Config(
                "merge.staleness_days must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    /// Rank of a source in the given priority order; unlisted sources sort
    /// after every listed one.
    #[must_use]
    pub fn rank(order: &[Source], source: Source) -> usize {
        order
            .iter()
            .position(|s| *s == source)
            .unwrap_or(order.len())
    }
}

/// Weights for the three quality-score components. Defaults are equal thirds;
/// the score normalizes by the weight sum, so only the ratios matter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QualityWeights {
    #[serde(default = "default_third")]
    pub completeness: f64,
    #[serde(default = "default_third")]
    pub agreement: f64,
    #[serde(default = "default_third")]
    pub recency: f64,
}

fn default_third() -> f64 {
    1.0 / 3.0
}

impl Default for QualityWeights {
    fn default() -> Self {
        Self {
            completeness: default_third(),
            agreement: default_third(),
            recency: default_third(),
        }
    }
}

impl QualityWeights {
    fn validate(&self) -> Result<()> {
        for (name, w) in [
            ("quality.completeness", self.completeness),
            ("quality.agreement", self.agreement),
            ("quality.recency", self.recency),
        ] {
            if !w.is_finite() || !(0.0..=1.0).contains(&w) {
                return Err(EdError::Config(format!("{name} must be within [0.0, 1.0]")));
            }
        }
        if self.completeness + self.agreement + self.recency <= 0.0 {
            return Err(EdError::Config(
                "quality weights must not all be zero".to_string(),
            ));
        }
        Ok(())
    }
}

/// Settings for the recommendation deriver.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecommendConfig {
    /// Cap on the ordered course-recommendation list.
    #[serde(default = "default_max_courses")]
    pub max_courses: usize,
    /// Cap on job matches per student.
    #[serde(default = "default_max_jobs")]
    pub max_jobs: usize,
    /// Skills required by each target role, keyed by career interest
    /// (matched case-insensitively).
    #[serde(default)]
    pub role_skills: BTreeMap<String, BTreeSet<String>>,
}

fn default_max_courses() -> usize {
    5
}

fn default_max_jobs() -> usize {
    10
}

impl Default for RecommendConfig {
    fn default() -> Self {
        Self {
            max_courses: default_max_courses(),
            max_jobs: default_max_jobs(),
            role_skills: BTreeMap::new(),
        }
    }
}

impl RecommendConfig {
    fn validate(&self) -> Result<()> {
        if self.max_courses == 0 {
            return Err(EdError::Config(
                "recommend.max_courses must be greater than zero".to_string(),
            ));
        }
        if self.max_jobs == 0 {
            return Err(EdError::Config(
                "recommend.max_jobs must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    /// Skills required for a career interest, if one is configured.
    #[must_use]
    pub fn skills_for_role(&self, interest: &str) -> Option<&BTreeSet<String>> {
        let needle = interest.trim().to_lowercase();
        self.role_skills
            .iter()
            .find(|(role, _)| role.to_lowercase() == needle)
            .map(|(_, skills)| skills)
    }
}

/// Relevance weights and limits for the ranker.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchConfig {
    /// Weight of the keyword-match fraction.
    #[serde(default = "default_keyword_weight")]
    pub keyword_weight: f64,
    /// Weight of the secondary signal (student quality, job recency).
    #[serde(default = "default_secondary_weight")]
    pub secondary_weight: f64,
    /// Result cap applied when a request does not set its own limit.
    #[serde(default = "default_limit")]
    pub default_limit: usize,
}

fn default_keyword_weight() -> f64 {
    0.7
}

fn default_secondary_weight() -> f64 {
    0.3
}

fn default_limit() -> usize {
    50
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            keyword_weight: default_keyword_weight(),
            secondary_weight: default_secondary_weight(),
            default_limit: default_limit(),
        }
    }
}

impl SearchConfig {
    fn validate(&self) -> Result<()> {
        for (name, w) in [
            ("search.keyword_weight", self.keyword_weight),
            ("search.secondary_weight", self.secondary_weight),
        ] {
            if !w.is_finite() || !(0.0..=1.0).contains(&w) {
                return Err(EdError::Config(format!("{name} must be within [0.0, 1.0]")));
            }
        }
        if self.keyword_weight + self.secondary_weight <= 0.0 {
            return Err(EdError::Config(
                "search weights must not all be zero".to_string(),
            ));
        }
        if self.default_limit == 0 {
            return Err(EdError::Config(
                "search.default_limit must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}
