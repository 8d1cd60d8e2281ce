//! Candidate generation (blocking): the three index paths unioned, deduped
//! and capped, so downstream scoring stays near-linear in corpus size.

use std::collections::{BTreeMap, BTreeSet};

use addrlink_core::{AddressRecord, ParsedAddress, RecordId};
use ordered_float::OrderedFloat;

use crate::config::ResolveConfig;
use crate::geo;
use crate::index::{AliasIndex, AnchorIndex, GeoBucketIndex, RecordIndex};
use crate::model::{Candidate, CandidateSource, Corpus, PairId, RunIssue};

#[derive(Debug, Default)]
pub struct CandidateOutput {
    /// Capped, deterministically ranked candidates for one record.
    pub candidates: Vec<Candidate>,
    pub issues: Vec<RunIssue>,
}

pub struct CandidateGenerator<'a> {
    config: &'a ResolveConfig,
    roads: &'a AliasIndex,
    aois: &'a AliasIndex,
    records: &'a RecordIndex,
    geo: &'a GeoBucketIndex,
    anchors: &'a AnchorIndex,
}

impl<'a> CandidateGenerator<'a> {
    pub fn new(
        config: &'a ResolveConfig,
        roads: &'a AliasIndex,
        aois: &'a AliasIndex,
        records: &'a RecordIndex,
        geo: &'a GeoBucketIndex,
        anchors: &'a AnchorIndex,
    ) -> Self {
        Self { config, roads, aois, records, geo, anchors }
    }

    /// Candidates for one record against the corpus. Pure function of the
    /// record and the read-only indexes; safe to call in parallel.
    pub fn generate(
        &self,
        record: &AddressRecord,
        parsed: &ParsedAddress,
        corpus: &Corpus,
    ) -> CandidateOutput {
        let mut sources: BTreeMap<RecordId, BTreeSet<CandidateSource>> = BTreeMap::new();
        let mut issues = Vec::new();

        // Alias path: shared district / road / aoi / building postings.
        let mut alias_hits: Vec<&RecordId> = Vec::new();
        if let Some(district) = &parsed.district {
            alias_hits.extend(self.records.district(district));
        }
        if let Some(road) = &parsed.road {
            alias_hits.extend(self.records.road(road, self.roads));
        }
        if let Some(aoi) = &parsed.aoi {
            alias_hits.extend(self.records.aoi(aoi, self.aois));
        }
        if let Some(building) = &parsed.building {
            alias_hits.extend(self.records.building(building));
        }
        for id in alias_hits {
            sources.entry(id.clone()).or_default().insert(CandidateSource::Alias);
        }

        // Geo path: own bucket plus the eight neighbors.
        if let Some((lat, lon)) = record.geocode() {
            for id in self.geo.nearby(lat, lon) {
                sources.entry(id).or_default().insert(CandidateSource::Geo);
            }
        }

        // Anchor path: resolve the relative reference, then reuse the geo
        // path around the projected position. Unresolvable anchors skip the
        // path, never the record.
        if parsed.has_relative_reference() {
            match self.anchors.project(parsed, self.roads) {
                Some((lat, lon)) => {
                    for id in self.geo.nearby(lat, lon) {
                        sources.entry(id).or_default().insert(CandidateSource::Anchor);
                    }
                }
                None => {
                    let reference = relative_reference_text(parsed);
                    log::debug!("record {}: anchor '{}' not found, path skipped", record.id, reference);
                    issues.push(RunIssue::AnchorResolutionFailure {
                        record: record.id.clone(),
                        reference,
                    });
                }
            }
        }

        sources.remove(&record.id);

        // Cheap pre-score cap: more proposing sources first, then raw geo
        // distance, then id. Keeps the cap deterministic.
        let own_pos = record
            .geocode()
            .or_else(|| self.anchors.project(parsed, self.roads));
        let mut ranked: Vec<(RecordId, BTreeSet<CandidateSource>, f64)> = sources
            .into_iter()
            .map(|(id, srcs)| {
                let dist = match (own_pos, corpus.get(&id).and_then(|rr| rr.record.geocode())) {
                    (Some((la, lo)), Some((lb, lob))) => geo::haversine_m(la, lo, lb, lob),
                    _ => f64::INFINITY,
                };
                (id, srcs, dist)
            })
            .collect();
        ranked.sort_by(|x, y| {
            y.1.len()
                .cmp(&x.1.len())
                .then_with(|| OrderedFloat(x.2).cmp(&OrderedFloat(y.2)))
                .then_with(|| x.0.cmp(&y.0))
        });
        ranked.truncate(self.config.candidate_cap);

        let candidates = ranked
            .into_iter()
            .map(|(id, srcs, _)| Candidate {
                pair: PairId::new(record.id.clone(), id),
                sources: srcs,
            })
            .collect();

        CandidateOutput { candidates, issues }
    }
}

fn relative_reference_text(parsed: &ParsedAddress) -> String {
    if let Some((a, b)) = &parsed.intersection {
        return format!("{a}|{b}");
    }
    if let Some(aoi) = &parsed.aoi {
        return aoi.clone();
    }
    if let Some(poi) = &parsed.poi_name {
        return poi.clone();
    }
    "<unnamed>".to_string()
}
