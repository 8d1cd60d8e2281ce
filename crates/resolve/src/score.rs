//! Multi-channel similarity scoring for candidate pairs.
//!
//! Every channel is optional: a channel with no computable value is excluded
//! from the weighted sum and the remaining weights are renormalized for that
//! pair. A missing channel is never scored as zero.

use std::collections::BTreeMap;

use crate::config::ResolveConfig;
use crate::geo;
use crate::index::{AliasIndex, AnchorIndex};
use crate::model::{ResolvedRecord, ScoreVector};
use crate::text::{self, alias_key};

pub struct FeatureScorer<'a> {
    config: &'a ResolveConfig,
    roads: &'a AliasIndex,
    aois: &'a AliasIndex,
    anchors: &'a AnchorIndex,
}

impl<'a> FeatureScorer<'a> {
    pub fn new(
        config: &'a ResolveConfig,
        roads: &'a AliasIndex,
        aois: &'a AliasIndex,
        anchors: &'a AnchorIndex,
    ) -> Self {
        Self { config, roads, aois, anchors }
    }

    /// Score a pair. Symmetric: `score_pair(a, b) == score_pair(b, a)`.
    pub fn score_pair(&self, a: &ResolvedRecord, b: &ResolvedRecord) -> ScoreVector {
        let mut channels = BTreeMap::new();
        let mut put = |name: &str, value: Option<f64>| {
            if let Some(v) = value {
                channels.insert(name.to_string(), v.clamp(0.0, 1.0));
            }
        };

        put("admin", admin_agreement(&a.parsed, &b.parsed));
        put("road", self.road_similarity(a, b));
        put("building", building_agreement(a, b));
        put("aoi", self.aoi_similarity(a, b));
        put("poi", poi_similarity(a, b));
        put("unit", unit_agreement(a, b));
        put("geo", self.geo_proximity(a, b));
        put("anchor", self.anchor_consistency(a, b));

        let composite = composite_of(&channels, &self.config.weights);
        ScoreVector { channels, composite }
    }

    fn road_similarity(&self, a: &ResolvedRecord, b: &ResolvedRecord) -> Option<f64> {
        let mut best: Option<f64> = None;
        if let (Some(ra), Some(rb)) = (&a.parsed.road, &b.parsed.road) {
            let sim = text::name_similarity(
                &self.roads.key_of(ra),
                &self.roads.key_of(rb),
            );
            best = Some(sim);
        }
        if let (Some(na), Some(nb)) = (&a.parsed.road_no, &b.parsed.road_no) {
            let eq = if alias_key(na) == alias_key(nb) { 1.0 } else { 0.0 };
            best = Some(best.map_or(eq, |v| v.max(eq)));
        }
        best
    }

    fn aoi_similarity(&self, a: &ResolvedRecord, b: &ResolvedRecord) -> Option<f64> {
        match (&a.parsed.aoi, &b.parsed.aoi) {
            (Some(xa), Some(xb)) => Some(text::name_similarity(
                &self.aois.key_of(xa),
                &self.aois.key_of(xb),
            )),
            _ => None,
        }
    }

    fn geo_proximity(&self, a: &ResolvedRecord, b: &ResolvedRecord) -> Option<f64> {
        let (la, lo) = a.record.geocode()?;
        let (lb, lob) = b.record.geocode()?;
        let dist = geo::haversine_m(la, lo, lb, lob);
        Some(geo::proximity_score(dist, self.config.geo_radius_m))
    }

    /// Agreement of the anchor-projected position with the counterparty:
    /// the best proximity over every comparable (projected, actual) pairing,
    /// at the anchor tolerance scale.
    fn anchor_consistency(&self, a: &ResolvedRecord, b: &ResolvedRecord) -> Option<f64> {
        let proj_a = self.anchors.project(&a.parsed, self.roads);
        let proj_b = self.anchors.project(&b.parsed, self.roads);
        if proj_a.is_none() && proj_b.is_none() {
            return None;
        }
        let pos_a = a.record.geocode();
        let pos_b = b.record.geocode();

        let mut best: Option<f64> = None;
        for (x, y) in [(proj_a, pos_b), (proj_b, pos_a), (proj_a, proj_b)] {
            if let (Some((xl, xo)), Some((yl, yo))) = (x, y) {
                let score = geo::proximity_score(
                    geo::haversine_m(xl, xo, yl, yo),
                    self.config.anchor_tolerance_m,
                );
                best = Some(best.map_or(score, |v| v.max(score)));
            }
        }
        best
    }
}

/// Fraction of agreeing administrative levels among those present on both
/// sides; `None` when no level is comparable.
fn admin_agreement(p: &addrlink_core::ParsedAddress, q: &addrlink_core::ParsedAddress) -> Option<f64> {
    let (compared, agreed) = admin_levels(p, q);
    if compared == 0 {
        None
    } else {
        Some(agreed as f64 / compared as f64)
    }
}

/// (compared, agreed) counts over (province, city, district).
pub(crate) fn admin_levels(
    p: &addrlink_core::ParsedAddress,
    q: &addrlink_core::ParsedAddress,
) -> (usize, usize) {
    let levels = [
        (&p.province, &q.province),
        (&p.city, &q.city),
        (&p.district, &q.district),
    ];
    let mut compared = 0;
    let mut agreed = 0;
    for (x, y) in levels {
        if let (Some(x), Some(y)) = (x, y) {
            compared += 1;
            if alias_key(x) == alias_key(y) {
                agreed += 1;
            }
        }
    }
    (compared, agreed)
}

fn building_agreement(a: &ResolvedRecord, b: &ResolvedRecord) -> Option<f64> {
    match (&a.parsed.building, &b.parsed.building) {
        (Some(xa), Some(xb)) => Some(if alias_key(xa) == alias_key(xb) { 1.0 } else { 0.0 }),
        _ => None,
    }
}

fn poi_similarity(a: &ResolvedRecord, b: &ResolvedRecord) -> Option<f64> {
    match (&a.parsed.poi_name, &b.parsed.poi_name) {
        (Some(xa), Some(xb)) => Some(text::name_similarity(&alias_key(xa), &alias_key(xb))),
        _ => None,
    }
}

/// Agreement over the in-building levels (unit, floor, room) present on
/// both sides.
fn unit_agreement(a: &ResolvedRecord, b: &ResolvedRecord) -> Option<f64> {
    let levels = [
        (&a.parsed.unit, &b.parsed.unit),
        (&a.parsed.floor, &b.parsed.floor),
        (&a.parsed.room, &b.parsed.room),
    ];
    let mut compared = 0;
    let mut agreed = 0;
    for (x, y) in levels {
        if let (Some(x), Some(y)) = (x, y) {
            compared += 1;
            if alias_key(x) == alias_key(y) {
                agreed += 1;
            }
        }
    }
    if compared == 0 {
        None
    } else {
        Some(agreed as f64 / compared as f64)
    }
}

/// Check that a score vector's composite equals the renormalized weighted
/// sum of its present channels. Test/audit helper.
pub fn composite_law_holds(score: &ScoreVector, weights: &BTreeMap<String, f64>) -> bool {
    (score.composite - composite_of(&score.channels, weights)).abs() < 1e-9
}

/// Weighted composite over the present channels, weights renormalized to
/// sum to 1 over exactly those channels. Always in [0, 1].
pub(crate) fn composite_of(channels: &BTreeMap<String, f64>, weights: &BTreeMap<String, f64>) -> f64 {
    let mut weight_sum = 0.0;
    let mut acc = 0.0;
    for (name, value) in channels {
        let w = weights.get(name).copied().unwrap_or(0.0);
        weight_sum += w;
        acc += w * value;
    }
    if weight_sum <= 0.0 {
        0.0
    } else {
        (acc / weight_sum).clamp(0.0, 1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use addrlink_core::{AddressRecord, ParsedAddress, RecordId};

    fn config(weights: &[(&str, f64)]) -> ResolveConfig {
        let body: String = weights
            .iter()
            .map(|(k, v)| format!("{k} = {v}\n"))
            .collect();
        let toml = format!(
            "name = \"test\"\n\n[weights]\n{body}\n[thresholds]\nt_match = 0.8\nt_review = 0.5\n"
        );
        ResolveConfig::from_toml(&toml).unwrap()
    }

    fn rr(id: &str, lat: Option<f64>, lon: Option<f64>, parsed: ParsedAddress) -> ResolvedRecord {
        ResolvedRecord {
            record: AddressRecord {
                id: RecordId::from(id),
                source: "test".into(),
                raw_text: String::new(),
                district_claim: None,
                grid_district: None,
                lat,
                lon,
            },
            parsed,
        }
    }

    #[test]
    fn missing_channels_renormalize_instead_of_zeroing() {
        let config = config(&[("admin", 0.25), ("road", 0.25), ("geo", 0.25), ("building", 0.25)]);
        let roads = AliasIndex::default();
        let aois = AliasIndex::default();
        let anchors = AnchorIndex::default();
        let scorer = FeatureScorer::new(&config, &roads, &aois, &anchors);

        let mut pa = ParsedAddress::default();
        pa.district = Some("甲区".into());
        pa.road = Some("乙路".into());
        let pb = pa.clone();

        // No geocode, no building on either side: those channels are absent.
        let sv = scorer.score_pair(&rr("r_1", None, None, pa), &rr("r_2", None, None, pb));
        assert_eq!(sv.channels.len(), 2);
        assert_eq!(sv.channel("admin"), Some(1.0));
        assert_eq!(sv.channel("road"), Some(1.0));
        assert_eq!(sv.channel("geo"), None);
        // 0.25·1 + 0.25·1 renormalized over 0.5 of weight = 1.0, not 0.5.
        assert!((sv.composite - 1.0).abs() < 1e-12);
    }

    #[test]
    fn composite_is_renormalized_weighted_sum() {
        let config = config(&[("road", 0.6), ("geo", 0.2), ("admin", 0.2)]);
        let roads = AliasIndex::default();
        let aois = AliasIndex::default();
        let anchors = AnchorIndex::default();
        let scorer = FeatureScorer::new(&config, &roads, &aois, &anchors);

        let mut pa = ParsedAddress::default();
        pa.road = Some("乙路".into());
        let mut pb = ParsedAddress::default();
        pb.road = Some("乙路".into());

        let a = rr("r_1", Some(30.0), Some(120.0), pa);
        let b = rr("r_2", Some(30.0009), Some(120.0), pb); // ~100m
        let sv = scorer.score_pair(&a, &b);

        let geo = sv.channel("geo").unwrap();
        let expect = (0.6 * 1.0 + 0.2 * geo) / 0.8;
        assert!((sv.composite - expect).abs() < 1e-12, "composite {} expect {expect}", sv.composite);
        assert!(sv.composite >= 0.0 && sv.composite <= 1.0);
    }

    #[test]
    fn score_is_symmetric() {
        let config = config(&[("admin", 0.3), ("road", 0.4), ("geo", 0.3)]);
        let roads = AliasIndex::default();
        let aois = AliasIndex::default();
        let anchors = AnchorIndex::default();
        let scorer = FeatureScorer::new(&config, &roads, &aois, &anchors);

        let mut pa = ParsedAddress::default();
        pa.district = Some("甲区".into());
        pa.road = Some("乙路".into());
        let mut pb = ParsedAddress::default();
        pb.district = Some("乙区".into());
        pb.road = Some("乙路辅路".into());

        let a = rr("r_1", Some(30.0), Some(120.0), pa);
        let b = rr("r_2", Some(30.0001), Some(120.0001), pb);
        let ab = scorer.score_pair(&a, &b);
        let ba = scorer.score_pair(&b, &a);
        assert_eq!(ab.channels, ba.channels);
        assert_eq!(ab.composite, ba.composite);
    }

    #[test]
    fn road_number_equality_lifts_partial_name_match() {
        let config = config(&[("road", 1.0)]);
        let roads = AliasIndex::default();
        let aois = AliasIndex::default();
        let anchors = AnchorIndex::default();
        let scorer = FeatureScorer::new(&config, &roads, &aois, &anchors);

        let mut pa = ParsedAddress::default();
        pa.road = Some("乙路".into());
        pa.road_no = Some("3号".into());
        let mut pb = ParsedAddress::default();
        pb.road = Some("乙路南段".into());
        pb.road_no = Some("3号".into());

        let sv = scorer.score_pair(&rr("r_1", None, None, pa), &rr("r_2", None, None, pb));
        assert_eq!(sv.channel("road"), Some(1.0));
    }

    #[test]
    fn unit_channel_averages_compared_levels() {
        let config = config(&[("unit", 1.0)]);
        let roads = AliasIndex::default();
        let aois = AliasIndex::default();
        let anchors = AnchorIndex::default();
        let scorer = FeatureScorer::new(&config, &roads, &aois, &anchors);

        let mut pa = ParsedAddress::default();
        pa.floor = Some("1".into());
        pa.room = Some("101".into());
        let mut pb = ParsedAddress::default();
        pb.floor = Some("1".into());
        pb.room = Some("102".into());

        let sv = scorer.score_pair(&rr("r_1", None, None, pa), &rr("r_2", None, None, pb));
        assert_eq!(sv.channel("unit"), Some(0.5));
    }

    #[test]
    fn no_computable_channel_scores_zero_composite() {
        let config = config(&[("geo", 1.0)]);
        let roads = AliasIndex::default();
        let aois = AliasIndex::default();
        let anchors = AnchorIndex::default();
        let scorer = FeatureScorer::new(&config, &roads, &aois, &anchors);

        let sv = scorer.score_pair(
            &rr("r_1", None, None, ParsedAddress::default()),
            &rr("r_2", None, None, ParsedAddress::default()),
        );
        assert!(sv.channels.is_empty());
        assert_eq!(sv.composite, 0.0);
    }
}
