//! Run orchestration: indexes → candidates → scores → conflicts → verdicts
//! → clusters, with per-record fault isolation.
//!
//! Determinism contract: records are processed in sorted id order, every
//! unordered pair is evaluated once, the decision log is sorted by pair id
//! and all public maps are ordered. Identical inputs and config produce
//! byte-identical decisions and assignments.

use std::collections::{BTreeMap, BTreeSet};

use addrlink_core::{AddressRecord, AnchorEntity, ParsedAddress};

use crate::adjudicate::Adjudicator;
use crate::candidates::CandidateGenerator;
use crate::cluster::ClusterBuilder;
use crate::config::ResolveConfig;
use crate::conflict::{record_field_conflicts, ConflictDetector};
use crate::error::ResolveError;
use crate::index::{AliasIndex, AnchorIndex, GeoBucketIndex, RecordIndex};
use crate::model::{
    Corpus, MatchDecision, ResolvedRecord, RunIssue, RunMeta, RunResult, RunSummary, Verdict,
};
use crate::score::FeatureScorer;

// ---------------------------------------------------------------------------
// Input
// ---------------------------------------------------------------------------

/// One record as delivered by the extraction collaborator. `parsed: None`
/// means extraction failed; the record is reported and excluded.
#[derive(Debug, Clone)]
pub struct RecordInput {
    pub record: AddressRecord,
    pub parsed: Option<ParsedAddress>,
}

/// Pre-loaded input for one run: records, the anchor catalog and the alias
/// dictionaries. All reference data is read-only to the engine.
#[derive(Debug, Clone, Default)]
pub struct RunInput {
    pub records: Vec<RecordInput>,
    pub anchors: Vec<AnchorEntity>,
    pub road_aliases: BTreeMap<String, Vec<String>>,
    pub aoi_aliases: BTreeMap<String, Vec<String>>,
}

// ---------------------------------------------------------------------------
// Run
// ---------------------------------------------------------------------------

/// Execute one resolution run. Only config validation can fail; every other
/// condition is isolated to its record, pair or component and reported in
/// the summary.
pub fn run(
    config: &ResolveConfig,
    input: &RunInput,
    adjudicator: &dyn Adjudicator,
) -> Result<RunResult, ResolveError> {
    config.validate()?;

    let mut issues: Vec<RunIssue> = Vec::new();

    // Partition out extraction failures.
    let mut corpus = Corpus::new();
    for entry in &input.records {
        match &entry.parsed {
            Some(parsed) => {
                corpus.insert(
                    entry.record.id.clone(),
                    ResolvedRecord { record: entry.record.clone(), parsed: parsed.clone() },
                );
            }
            None => {
                log::warn!("record {} failed extraction, excluded from run", entry.record.id);
                issues.push(RunIssue::ParseFailure { record: entry.record.id.clone() });
            }
        }
    }

    // Build the read-only indexes.
    let roads = AliasIndex::from_map(&input.road_aliases);
    let aois = AliasIndex::from_map(&input.aoi_aliases);
    let anchors = AnchorIndex::build(input.anchors.clone());
    let mut record_index = RecordIndex::default();
    let mut geo_index = GeoBucketIndex::new(config.bucket_precision);
    for (id, rr) in &corpus {
        record_index.insert(id, &rr.parsed, &roads, &aois);
        match rr.record.geocode() {
            Some((lat, lon)) => geo_index.insert(id, lat, lon),
            None => issues.push(RunIssue::MissingGeocode { record: id.clone() }),
        }
        issues.extend(record_field_conflicts(&rr.record, &rr.parsed));
    }

    let generator =
        CandidateGenerator::new(config, &roads, &aois, &record_index, &geo_index, &anchors);
    let scorer = FeatureScorer::new(config, &roads, &aois, &anchors);
    let detector = ConflictDetector::new(config.bucket_precision);

    // Score and adjudicate each unordered pair once.
    let mut evaluated = BTreeSet::new();
    let mut decisions: Vec<MatchDecision> = Vec::new();
    let mut builder = ClusterBuilder::new();
    let mut hard_vetoes = 0;
    let mut soft_conflicts = 0;
    for id in corpus.keys() {
        builder.add_record(id);
    }

    for rr in corpus.values() {
        let output = generator.generate(&rr.record, &rr.parsed, &corpus);
        issues.extend(output.issues);

        for candidate in output.candidates {
            if !evaluated.insert(candidate.pair.clone()) {
                continue;
            }
            let a = &corpus[&candidate.pair.a];
            let b = &corpus[&candidate.pair.b];

            let score = scorer.score_pair(a, b);
            let conflict = detector.detect(&candidate.pair, a, b, &score);
            let verdict = match adjudicator.adjudicate(&score, conflict.as_ref()) {
                Ok(verdict) => verdict,
                Err(err) => {
                    log::warn!("pair {}: {err}; downgraded to REVIEW", candidate.pair);
                    issues.push(RunIssue::AdjudicationError {
                        pair: candidate.pair.clone(),
                        message: err.message,
                    });
                    Verdict::Review
                }
            };

            if verdict == Verdict::Match {
                builder.add_match(&candidate.pair, score.composite);
            }
            match conflict.as_ref().map(|c| c.is_hard()) {
                Some(true) => {
                    hard_vetoes += 1;
                    builder.add_forbidden(&candidate.pair);
                }
                Some(false) => soft_conflicts += 1,
                None => {}
            }

            decisions.push(MatchDecision {
                pair: candidate.pair,
                sources: candidate.sources,
                score,
                conflict,
                verdict,
                adjudicator: adjudicator.name().to_string(),
            });
        }
    }

    let (clusters, cluster_issues) = builder.build(&corpus);
    issues.extend(cluster_issues);

    decisions.sort_by(|x, y| x.pair.cmp(&y.pair));

    let mut assignments = BTreeMap::new();
    for cluster in &clusters {
        for member in &cluster.members {
            assignments.insert(member.clone(), cluster.id.clone());
        }
    }

    let summary = RunSummary {
        records_in: input.records.len(),
        parse_failures: input.records.len() - corpus.len(),
        records_resolved: corpus.len(),
        pairs_evaluated: decisions.len(),
        matches: decisions.iter().filter(|d| d.verdict == Verdict::Match).count(),
        reviews: decisions.iter().filter(|d| d.verdict == Verdict::Review).count(),
        no_matches: decisions.iter().filter(|d| d.verdict == Verdict::NoMatch).count(),
        hard_vetoes,
        soft_conflicts,
        clusters: clusters.len(),
        multi_member_clusters: clusters.iter().filter(|c| c.members.len() > 1).count(),
        issues,
    };

    Ok(RunResult {
        meta: RunMeta {
            config_name: config.name.clone(),
            engine_version: env!("CARGO_PKG_VERSION").to_string(),
            run_at: chrono::Utc::now().to_rfc3339(),
        },
        summary,
        decisions,
        clusters,
        assignments,
    })
}
