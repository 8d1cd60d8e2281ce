//! Contradiction rules: attribute combinations a true match never exhibits.
//!
//! The table is fixed and evaluated from the score vector and raw fields
//! only: no history, no run-order dependence. Hard rules are checked
//! before soft ones; the first rule that fires wins.

use addrlink_core::{AddressRecord, ParsedAddress};

use crate::geo::BucketKey;
use crate::model::{Conflict, ConflictKind, PairId, ResolvedRecord, RunIssue, ScoreVector};
use crate::score::admin_levels;
use crate::text::alias_key;

/// Near-identical name evidence (exact after alias folding).
const NEAR_IDENTICAL: f64 = 0.999;
/// Geo proximity that pins two records to the same spot.
const PINNING_GEO: f64 = 0.9;
/// Strong single-channel agreement.
const STRONG: f64 = 0.8;
/// Supporting agreement for soft rules.
const SUPPORTING: f64 = 0.7;
/// An anchor projection this far off contradicts the reference.
const ANCHOR_FAR: f64 = 0.2;

pub struct ConflictDetector {
    bucket_precision: u32,
}

impl ConflictDetector {
    pub fn new(bucket_precision: u32) -> Self {
        Self { bucket_precision }
    }

    pub fn detect(
        &self,
        pair: &PairId,
        a: &ResolvedRecord,
        b: &ResolvedRecord,
        score: &ScoreVector,
    ) -> Option<Conflict> {
        let same_bucket = match (a.record.geocode(), b.record.geocode()) {
            (Some((la, lo)), Some((lb, lob))) => {
                BucketKey::of(la, lo, self.bucket_precision)
                    == BucketKey::of(lb, lob, self.bucket_precision)
            }
            _ => false,
        };

        let districts = match (&a.parsed.district, &b.parsed.district) {
            (Some(da), Some(db)) if alias_key(da) != alias_key(db) => Some((da, db)),
            _ => None,
        };

        // Hard: same place by location evidence, different administrative
        // parent. Impossible for a true match.
        if let Some((da, db)) = districts {
            let pinned = same_bucket
                || score.channel_or("geo", 0.0) >= PINNING_GEO
                || (score.channel_or("road", 0.0) >= NEAR_IDENTICAL
                    && score.channel_or("building", 0.0) >= NEAR_IDENTICAL);
            if pinned {
                let mut evidence = vec![format!("district: {da} vs {db}")];
                if same_bucket {
                    evidence.push("same geo bucket".to_string());
                }
                if let Some(g) = score.channel("geo") {
                    evidence.push(format!("geo={g:.3}"));
                }
                return Some(Conflict {
                    pair: pair.clone(),
                    kind: ConflictKind::HardVeto,
                    rule: "admin-mismatch".into(),
                    evidence,
                });
            }
        }

        // Hard: the anchor-resolved position contradicts otherwise strong
        // location agreement.
        if let Some(anchor) = score.channel("anchor") {
            let strong_elsewhere = score.channel_or("geo", 0.0) >= STRONG
                || (score.channel_or("road", 0.0) >= STRONG
                    && score.channel_or("aoi", 0.0) >= STRONG);
            if anchor < ANCHOR_FAR && strong_elsewhere {
                return Some(Conflict {
                    pair: pair.clone(),
                    kind: ConflictKind::HardVeto,
                    rule: "anchor-out-of-range".into(),
                    evidence: vec![format!("anchor={anchor:.3}")],
                });
            }
        }

        // Soft: exactly one administrative level disagrees while location
        // evidence still leans toward a match. Worth review, not a veto.
        let (compared, agreed) = admin_levels(&a.parsed, &b.parsed);
        if compared > 0 && compared - agreed == 1 {
            let supported = score.channel_or("geo", 0.0) >= SUPPORTING
                || score.channel_or("road", 0.0) >= SUPPORTING;
            if supported {
                return Some(Conflict {
                    pair: pair.clone(),
                    kind: ConflictKind::Soft,
                    rule: "admin-partial".into(),
                    evidence: vec![format!("{agreed}/{compared} admin levels agree")],
                });
            }
        }

        None
    }
}

/// Per-record consistency checks between source-asserted and parsed fields.
/// Informational: reported in the summary, never a veto.
pub fn record_field_conflicts(record: &AddressRecord, parsed: &ParsedAddress) -> Vec<RunIssue> {
    let mut issues = Vec::new();
    if let (Some(claim), Some(district)) = (&record.district_claim, &parsed.district) {
        if alias_key(claim) != alias_key(district) {
            issues.push(RunIssue::RecordFieldConflict {
                record: record.id.clone(),
                field: "district_claim".into(),
                detail: format!("{claim} vs parsed {district}"),
            });
        }
    }
    if let (Some(grid), Some(district)) = (&record.grid_district, &parsed.district) {
        if alias_key(grid) != alias_key(district) {
            issues.push(RunIssue::RecordFieldConflict {
                record: record.id.clone(),
                field: "grid_district".into(),
                detail: format!("{grid} vs parsed {district}"),
            });
        }
    }
    issues
}
