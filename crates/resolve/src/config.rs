use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::ResolveError;

/// The scoring channels a weight table may reference.
pub const CHANNELS: &[&str] = &[
    "admin", "road", "building", "aoi", "poi", "unit", "geo", "anchor",
];

const WEIGHT_SUM_EPSILON: f64 = 1e-6;

// ---------------------------------------------------------------------------
// Top-level config
// ---------------------------------------------------------------------------

/// One run's operating point. Loaded once, validated before any processing,
/// never mutated in place; the tuner produces fresh values.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResolveConfig {
    pub name: String,
    /// Channel name → weight. Non-negative, summing to 1.
    pub weights: BTreeMap<String, f64>,
    pub thresholds: Thresholds,
    /// Decimal places of lat/lon quantization for geo bucketing.
    #[serde(default = "default_bucket_precision")]
    pub bucket_precision: u32,
    /// Upper bound on candidates considered per record.
    #[serde(default = "default_candidate_cap")]
    pub candidate_cap: usize,
    /// Distance at which geo proximity reaches zero.
    #[serde(default = "default_geo_radius_m")]
    pub geo_radius_m: f64,
    /// Distance scale for anchor-relative consistency.
    #[serde(default = "default_anchor_tolerance_m")]
    pub anchor_tolerance_m: f64,
    #[serde(default)]
    pub adjudicator: AdjudicatorKind,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Thresholds {
    pub t_match: f64,
    pub t_review: f64,
}

/// Which adjudication implementation a run uses. External (model-assisted)
/// implementations plug in as trait objects and need no entry here.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdjudicatorKind {
    Rule,
}

impl Default for AdjudicatorKind {
    fn default() -> Self {
        Self::Rule
    }
}

fn default_bucket_precision() -> u32 {
    4
}

fn default_candidate_cap() -> usize {
    50
}

fn default_geo_radius_m() -> f64 {
    200.0
}

fn default_anchor_tolerance_m() -> f64 {
    150.0
}

// ---------------------------------------------------------------------------
// Parse + Validate
// ---------------------------------------------------------------------------

impl ResolveConfig {
    pub fn from_toml(input: &str) -> Result<Self, ResolveError> {
        let config: ResolveConfig =
            toml::from_str(input).map_err(|e| ResolveError::ConfigParse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ResolveError> {
        if self.weights.is_empty() {
            return Err(ResolveError::ConfigValidation("weights must not be empty".into()));
        }
        for (channel, weight) in &self.weights {
            if !CHANNELS.contains(&channel.as_str()) {
                return Err(ResolveError::ConfigValidation(format!(
                    "unknown channel '{channel}'"
                )));
            }
            if !weight.is_finite() || *weight < 0.0 {
                return Err(ResolveError::ConfigValidation(format!(
                    "weight for '{channel}' must be a non-negative number, got {weight}"
                )));
            }
        }
        let sum: f64 = self.weights.values().sum();
        if (sum - 1.0).abs() > WEIGHT_SUM_EPSILON {
            return Err(ResolveError::ConfigValidation(format!(
                "weights must sum to 1, got {sum}"
            )));
        }

        let Thresholds { t_match, t_review } = self.thresholds;
        if !(0.0..=1.0).contains(&t_review) || !(0.0..=1.0).contains(&t_match) {
            return Err(ResolveError::ConfigValidation(format!(
                "thresholds must lie in [0, 1], got t_match={t_match} t_review={t_review}"
            )));
        }
        if t_review > t_match {
            return Err(ResolveError::ConfigValidation(format!(
                "t_review ({t_review}) must not exceed t_match ({t_match})"
            )));
        }

        if !(1..=6).contains(&self.bucket_precision) {
            return Err(ResolveError::ConfigValidation(format!(
                "bucket_precision must be 1..=6, got {}",
                self.bucket_precision
            )));
        }
        if self.candidate_cap == 0 {
            return Err(ResolveError::ConfigValidation("candidate_cap must be at least 1".into()));
        }
        if !(self.geo_radius_m > 0.0) {
            return Err(ResolveError::ConfigValidation(format!(
                "geo_radius_m must be positive, got {}",
                self.geo_radius_m
            )));
        }
        if !(self.anchor_tolerance_m > 0.0) {
            return Err(ResolveError::ConfigValidation(format!(
                "anchor_tolerance_m must be positive, got {}",
                self.anchor_tolerance_m
            )));
        }

        Ok(())
    }

    /// Weight of a channel; channels without an entry weigh nothing.
    pub fn weight(&self, channel: &str) -> f64 {
        self.weights.get(channel).copied().unwrap_or(0.0)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
