//! The adjudication seam: similarity evidence in, verdict out.
//!
//! Implementations are selected by configuration and swapped behind one
//! trait; a model-assisted adjudicator satisfying the same contract is a
//! drop-in replacement. The engine treats a failed adjudication as REVIEW,
//! never as a run failure.

use std::fmt;

use crate::config::{AdjudicatorKind, ResolveConfig, Thresholds};
use crate::model::{Conflict, ScoreVector, Verdict};

/// An adjudication capability failed for one pair.
#[derive(Debug, Clone)]
pub struct AdjudicationError {
    pub message: String,
}

impl AdjudicationError {
    pub fn new(message: impl Into<String>) -> Self {
        Self { message: message.into() }
    }
}

impl fmt::Display for AdjudicationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "adjudication error: {}", self.message)
    }
}

impl std::error::Error for AdjudicationError {}

/// Turns (score vector, conflict) into a verdict.
pub trait Adjudicator {
    /// Name recorded in each decision-log entry.
    fn name(&self) -> &str;

    fn adjudicate(
        &self,
        score: &ScoreVector,
        conflict: Option<&Conflict>,
    ) -> Result<Verdict, AdjudicationError>;
}

/// Threshold rule table:
/// - hard veto → NO_MATCH, regardless of score;
/// - composite < t_review → NO_MATCH;
/// - composite ≥ t_match with no conflict → MATCH;
/// - everything else (the band, or any soft conflict above t_review) → REVIEW.
#[derive(Debug, Clone)]
pub struct RuleAdjudicator {
    thresholds: Thresholds,
}

impl RuleAdjudicator {
    pub fn new(thresholds: Thresholds) -> Self {
        Self { thresholds }
    }
}

impl Adjudicator for RuleAdjudicator {
    fn name(&self) -> &str {
        "rule"
    }

    fn adjudicate(
        &self,
        score: &ScoreVector,
        conflict: Option<&Conflict>,
    ) -> Result<Verdict, AdjudicationError> {
        if conflict.is_some_and(Conflict::is_hard) {
            return Ok(Verdict::NoMatch);
        }
        if score.composite < self.thresholds.t_review {
            return Ok(Verdict::NoMatch);
        }
        if score.composite >= self.thresholds.t_match && conflict.is_none() {
            return Ok(Verdict::Match);
        }
        Ok(Verdict::Review)
    }
}

/// The configured adjudicator for a run.
pub fn adjudicator_for(config: &ResolveConfig) -> Box<dyn Adjudicator> {
    match config.adjudicator {
        AdjudicatorKind::Rule => Box::new(RuleAdjudicator::new(config.thresholds)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ConflictKind, PairId};
    use addrlink_core::RecordId;
    use std::collections::BTreeMap;

    fn score(composite: f64) -> ScoreVector {
        ScoreVector { channels: BTreeMap::new(), composite }
    }

    fn conflict(kind: ConflictKind) -> Conflict {
        Conflict {
            pair: PairId::new(RecordId::from("r_1"), RecordId::from("r_2")),
            kind,
            rule: "test".into(),
            evidence: vec![],
        }
    }

    fn adjudicator() -> RuleAdjudicator {
        RuleAdjudicator::new(Thresholds { t_match: 0.78, t_review: 0.55 })
    }

    #[test]
    fn threshold_bands() {
        let adj = adjudicator();
        assert_eq!(adj.adjudicate(&score(0.9), None).unwrap(), Verdict::Match);
        assert_eq!(adj.adjudicate(&score(0.78), None).unwrap(), Verdict::Match);
        assert_eq!(adj.adjudicate(&score(0.6), None).unwrap(), Verdict::Review);
        assert_eq!(adj.adjudicate(&score(0.55), None).unwrap(), Verdict::Review);
        assert_eq!(adj.adjudicate(&score(0.5), None).unwrap(), Verdict::NoMatch);
    }

    #[test]
    fn hard_veto_overrides_any_score() {
        let adj = adjudicator();
        let c = conflict(ConflictKind::HardVeto);
        assert_eq!(adj.adjudicate(&score(0.99), Some(&c)).unwrap(), Verdict::NoMatch);
        assert_eq!(adj.adjudicate(&score(0.1), Some(&c)).unwrap(), Verdict::NoMatch);
    }

    #[test]
    fn soft_conflict_caps_at_review() {
        let adj = adjudicator();
        let c = conflict(ConflictKind::Soft);
        assert_eq!(adj.adjudicate(&score(0.95), Some(&c)).unwrap(), Verdict::Review);
        assert_eq!(adj.adjudicate(&score(0.6), Some(&c)).unwrap(), Verdict::Review);
        assert_eq!(adj.adjudicate(&score(0.2), Some(&c)).unwrap(), Verdict::NoMatch);
    }

    #[test]
    fn configured_kind_selects_rule_implementation() {
        let toml = r#"
name = "t"

[weights]
geo = 1.0

[thresholds]
t_match = 0.8
t_review = 0.5
"#;
        let config = ResolveConfig::from_toml(toml).unwrap();
        let adj = adjudicator_for(&config);
        assert_eq!(adj.name(), "rule");
    }
}
