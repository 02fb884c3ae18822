//! Entity quality scoring.
//!
//! The score is a pure function of field completeness, cross-source
//! agreement, and recency, so re-merging the same group always reproduces
//! the same value.

use chrono::{DateTime, Utc};

use crate::config::Config;

/// Observations about one merged entity, collected during field resolution.
#[derive(Debug, Clone, Default)]
pub struct QualityInputs {
    /// Required fields that ended up populated.
    pub required_present: usize,
    /// Size of the required-field set for the entity kind.
    pub required_total: usize,
    /// Fields reported by at least two sources where at least two agree.
    pub agreeing_fields: usize,
    /// Fields reported by at least two sources.
    pub contested_fields: usize,
    /// Newest observation timestamp in the group.
    pub newest: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone)]
pub struct QualityScorer {
    completeness_weight: f64,
    agreement_weight: f64,
    recency_weight: f64,
    staleness_days: u32,
}

impl QualityScorer {
    #[must_use]
    pub fn new(config: &Config) -> Self {
        Self {
            completeness_weight: config.quality.completeness,
            agreement_weight: config.quality.agreement,
            recency_weight: config.quality.recency,
            staleness_days: config.merge.staleness_days,
        }
    }

    /// Weighted score, clamped to [0.0, 1.0].
    #[must_use]
    pub fn score(&self, inputs: &QualityInputs, as_of: DateTime<Utc>) -> f64 {
        let completeness = ratio(inputs.required_present, inputs.required_total);
        let agreement = if inputs.contested_fields == 0 {
            // No field has two reporters, so nothing disagrees.
            1.0
        } else {
            ratio(inputs.agreeing_fields, inputs.contested_fields)
        };
        let recency = self.recency(inputs.newest, as_of);

        weighted_average(&[
            (completeness, self.completeness_weight),
            (agreement, self.agreement_weight),
            (recency, self.recency_weight),
        ])
        .clamp(0.0, 1.0)
    }

    /// Linear decay from 1.0 at `as_of` to 0.0 at the staleness window.
    fn recency(&self, newest: Option<DateTime<Utc>>, as_of: DateTime<Utc>) -> f64 {
        let Some(newest) = newest else {
            return 0.0;
        };
        let age_days = as_of.signed_duration_since(newest).num_days().max(0) as f64;
        (1.0 - age_days / f64::from(self.staleness_days)).clamp(0.0, 1.0)
    }
}

fn ratio(numerator: usize, denominator: usize) -> f64 {
    if denominator == 0 {
        1.0
    } else {
        numerator as f64 / denominator as f64
    }
}

fn weighted_average(values: &[(f64, f64)]) -> f64 {
    let mut total = 0.0;
    let mut weight_sum = 0.0;
    for (value, weight) in values {
        total += value * weight;
        weight_sum += weight;
    }
    if weight_sum == 0.0 {
        0.0
    } else {
        total / weight_sum
    }
}
