//! Offline grid search over the weight/threshold space against labeled
//! pairs. Evaluation reuses the live scorer + adjudicator; clustering is
//! deliberately out of the loop.

use std::collections::BTreeMap;

use ordered_float::OrderedFloat;
use serde::Serialize;

use crate::adjudicate::{Adjudicator, RuleAdjudicator};
use crate::config::{ResolveConfig, Thresholds};
use crate::conflict::ConflictDetector;
use crate::error::ResolveError;
use crate::index::{AliasIndex, AnchorIndex};
use crate::model::{Corpus, LabeledPair, Verdict};
use crate::score::FeatureScorer;

// ---------------------------------------------------------------------------
// Metrics
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct Metrics {
    pub true_positives: usize,
    pub false_positives: usize,
    pub true_negatives: usize,
    pub false_negatives: usize,
    pub precision: f64,
    pub recall: f64,
    pub f1: f64,
}

impl Metrics {
    pub fn from_counts(tp: usize, fp: usize, tn: usize, fn_count: usize) -> Self {
        let precision = if tp + fp > 0 { tp as f64 / (tp + fp) as f64 } else { 0.0 };
        let recall = if tp + fn_count > 0 { tp as f64 / (tp + fn_count) as f64 } else { 0.0 };
        let f1 = if precision + recall > 0.0 {
            2.0 * precision * recall / (precision + recall)
        } else {
            0.0
        };
        Self {
            true_positives: tp,
            false_positives: fp,
            true_negatives: tn,
            false_negatives: fn_count,
            precision,
            recall,
            f1,
        }
    }
}

// ---------------------------------------------------------------------------
// Search space
// ---------------------------------------------------------------------------

/// Lazy, finite, restartable enumeration of the search space: every grid
/// point is addressable by index, so an interrupted search can resume at
/// its cursor instead of replaying the Cartesian product.
#[derive(Debug, Clone)]
pub struct ConfigGrid {
    base: ResolveConfig,
    scales: Vec<BTreeMap<String, f64>>,
    thresholds: Vec<Thresholds>,
    cursor: usize,
}

const T_MATCH_GRID: &[f64] = &[0.70, 0.74, 0.78, 0.82];
const T_REVIEW_GRID: &[f64] = &[0.50, 0.55, 0.60];

impl ConfigGrid {
    /// The default grid around a base config: per-channel emphasis variants
    /// (re-normalized onto the simplex) crossed with every threshold pair
    /// satisfying `t_review < t_match`.
    pub fn around(base: &ResolveConfig) -> Self {
        let mut scales: Vec<BTreeMap<String, f64>> = vec![BTreeMap::new()];
        for channel in ["geo", "building", "aoi", "road"] {
            if base.weights.contains_key(channel) {
                let mut scale = BTreeMap::new();
                scale.insert(channel.to_string(), 1.2);
                scales.push(scale);
            }
        }
        let mut combined = BTreeMap::new();
        for (channel, factor) in [("geo", 1.2), ("building", 1.1), ("aoi", 1.1)] {
            if base.weights.contains_key(channel) {
                combined.insert(channel.to_string(), factor);
            }
        }
        if !combined.is_empty() {
            scales.push(combined);
        }

        let mut thresholds = Vec::new();
        for &t_match in T_MATCH_GRID {
            for &t_review in T_REVIEW_GRID {
                if t_review < t_match {
                    thresholds.push(Thresholds { t_match, t_review });
                }
            }
        }

        Self { base: base.clone(), scales, thresholds, cursor: 0 }
    }

    /// Resume enumeration at a previously reported grid index.
    pub fn resume_at(mut self, cursor: usize) -> Self {
        self.cursor = cursor;
        self
    }

    pub fn len(&self) -> usize {
        self.scales.len() * self.thresholds.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The grid point at `index`, independent of the cursor.
    pub fn point(&self, index: usize) -> Option<ResolveConfig> {
        if index >= self.len() {
            return None;
        }
        let threshold_idx = index / self.scales.len();
        let scale_idx = index % self.scales.len();

        let mut weights = self.base.weights.clone();
        for (channel, factor) in &self.scales[scale_idx] {
            if let Some(w) = weights.get_mut(channel) {
                *w *= factor;
            }
        }
        let sum: f64 = weights.values().sum();
        if sum > 0.0 {
            for w in weights.values_mut() {
                *w /= sum;
            }
        }

        let mut config = self.base.clone();
        config.name = format!("{}/grid-{index:03}", self.base.name);
        config.weights = weights;
        config.thresholds = self.thresholds[threshold_idx];
        Some(config)
    }
}

impl Iterator for ConfigGrid {
    type Item = (usize, ResolveConfig);

    fn next(&mut self) -> Option<Self::Item> {
        let index = self.cursor;
        let config = self.point(index)?;
        self.cursor += 1;
        Some((index, config))
    }
}

// ---------------------------------------------------------------------------
// Tuner
// ---------------------------------------------------------------------------

/// One evaluated grid point in the report.
#[derive(Debug, Clone, Serialize)]
pub struct GridPoint {
    pub index: usize,
    pub weights: BTreeMap<String, f64>,
    pub thresholds: Thresholds,
    pub metrics: Metrics,
}

/// The completed search: the winning config plus the full evaluation
/// report. Produced only when every grid point has been evaluated, so a
/// partial search can never clobber a previously published best.
#[derive(Debug, Clone, Serialize)]
pub struct TunerOutcome {
    pub best: ResolveConfig,
    pub best_metrics: Metrics,
    pub points: Vec<GridPoint>,
}

pub struct Tuner<'a> {
    corpus: &'a Corpus,
    roads: &'a AliasIndex,
    aois: &'a AliasIndex,
    anchors: &'a AnchorIndex,
}

impl<'a> Tuner<'a> {
    pub fn new(
        corpus: &'a Corpus,
        roads: &'a AliasIndex,
        aois: &'a AliasIndex,
        anchors: &'a AnchorIndex,
    ) -> Self {
        Self { corpus, roads, aois, anchors }
    }

    /// Score + adjudicate every labeled pair under `config` and tally
    /// against gold. REVIEW counts as a predicted non-match.
    pub fn evaluate(
        &self,
        config: &ResolveConfig,
        labels: &[LabeledPair],
    ) -> Result<Metrics, ResolveError> {
        let scorer = FeatureScorer::new(config, self.roads, self.aois, self.anchors);
        let detector = ConflictDetector::new(config.bucket_precision);
        let adjudicator = RuleAdjudicator::new(config.thresholds);

        let mut tp = 0;
        let mut fp = 0;
        let mut tn = 0;
        let mut fn_count = 0;
        for label in labels {
            let a = self
                .corpus
                .get(&label.pair.a)
                .ok_or_else(|| ResolveError::UnknownRecord(label.pair.a.to_string()))?;
            let b = self
                .corpus
                .get(&label.pair.b)
                .ok_or_else(|| ResolveError::UnknownRecord(label.pair.b.to_string()))?;

            let score = scorer.score_pair(a, b);
            let conflict = detector.detect(&label.pair, a, b, &score);
            let verdict = adjudicator
                .adjudicate(&score, conflict.as_ref())
                .unwrap_or(Verdict::Review);

            let predicted = verdict == Verdict::Match;
            match (predicted, label.expected_match) {
                (true, true) => tp += 1,
                (true, false) => fp += 1,
                (false, false) => tn += 1,
                (false, true) => fn_count += 1,
            }
        }
        Ok(Metrics::from_counts(tp, fp, tn, fn_count))
    }

    /// Exhaust the grid and select the F1-maximizing config. Ties break
    /// deterministically: lexicographically smallest weight vector, then
    /// smallest `(t_match, t_review)`.
    pub fn search(
        &self,
        grid: ConfigGrid,
        labels: &[LabeledPair],
    ) -> Result<TunerOutcome, ResolveError> {
        let mut points = Vec::new();
        let mut best: Option<(ResolveConfig, Metrics)> = None;

        for (index, config) in grid {
            let metrics = self.evaluate(&config, labels)?;
            points.push(GridPoint {
                index,
                weights: config.weights.clone(),
                thresholds: config.thresholds,
                metrics,
            });
            let better = match &best {
                None => true,
                Some((best_config, best_metrics)) => {
                    let candidate_key = rank_key(&config, metrics);
                    let best_key = rank_key(best_config, *best_metrics);
                    candidate_key < best_key
                }
            };
            if better {
                best = Some((config, metrics));
            }
        }

        let (best, best_metrics) =
            best.ok_or_else(|| ResolveError::ConfigValidation("empty search grid".into()))?;
        Ok(TunerOutcome { best, best_metrics, points })
    }
}

/// Ordering key for winner selection: higher F1 first, then smaller weight
/// vector, then smaller thresholds.
fn rank_key(config: &ResolveConfig, metrics: Metrics) -> (OrderedFloat<f64>, Vec<OrderedFloat<f64>>, OrderedFloat<f64>, OrderedFloat<f64>) {
    (
        OrderedFloat(-metrics.f1),
        config.weights.values().map(|&w| OrderedFloat(w)).collect(),
        OrderedFloat(config.thresholds.t_match),
        OrderedFloat(config.thresholds.t_review),
    )
}
