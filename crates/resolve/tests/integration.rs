use std::collections::BTreeSet;
use std::path::PathBuf;

use addrlink_core::RecordId;
use addrlink_resolve::config::ResolveConfig;
use addrlink_resolve::engine::{run, RunInput};
use addrlink_resolve::index::{AliasIndex, AnchorIndex};
use addrlink_resolve::load::{
    assemble_input, load_alias_map_json, load_anchors_csv, load_labeled_pairs_csv,
    load_parsed_csv, load_records_csv,
};
use addrlink_resolve::model::{
    CandidateSource, ConflictKind, Corpus, PairId, ResolvedRecord, RunIssue, RunResult, Verdict,
};
use addrlink_resolve::score::composite_law_holds;
use addrlink_resolve::tuner::{ConfigGrid, Tuner};
use addrlink_resolve::RuleAdjudicator;

fn fixtures_dir() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures")
}

fn read(name: &str) -> String {
    let path = fixtures_dir().join(name);
    std::fs::read_to_string(&path).unwrap_or_else(|e| panic!("cannot read {}: {e}", path.display()))
}

fn fixture_config() -> ResolveConfig {
    ResolveConfig::from_toml(&read("resolve.toml")).unwrap()
}

fn fixture_input() -> RunInput {
    let records = load_records_csv(&read("records.csv")).unwrap();
    let parsed = load_parsed_csv(&read("parsed.csv")).unwrap();
    let anchors = load_anchors_csv(&read("anchors.csv")).unwrap();
    let road_aliases = load_alias_map_json(&read("alias_road.json")).unwrap();
    let aoi_aliases = load_alias_map_json(&read("alias_aoi.json")).unwrap();
    assemble_input(records, parsed, anchors, road_aliases, aoi_aliases)
}

fn run_fixture() -> RunResult {
    let config = fixture_config();
    let adjudicator = RuleAdjudicator::new(config.thresholds);
    run(&config, &fixture_input(), &adjudicator).unwrap()
}

fn decision_for<'a>(result: &'a RunResult, a: &str, b: &str) -> &'a addrlink_resolve::MatchDecision {
    let pair = PairId::new(RecordId::from(a), RecordId::from(b));
    result
        .decisions
        .iter()
        .find(|d| d.pair == pair)
        .unwrap_or_else(|| panic!("no decision for {pair}"))
}

// -------------------------------------------------------------------------
// Whole-run shape
// -------------------------------------------------------------------------

#[test]
fn full_run_summary() {
    let result = run_fixture();
    assert_eq!(result.summary.records_in, 11);
    assert_eq!(result.summary.parse_failures, 1);
    assert_eq!(result.summary.records_resolved, 10);
    assert!(result.summary.pairs_evaluated > 0);
    assert_eq!(result.meta.config_name, "fixture");

    // r_07 never made it past extraction.
    assert!(result
        .summary
        .issues
        .contains(&RunIssue::ParseFailure { record: RecordId::from("r_07") }));
    assert!(!result.assignments.contains_key(&RecordId::from("r_07")));
}

#[test]
fn clusters_partition_resolved_records() {
    let result = run_fixture();

    let mut seen: BTreeSet<RecordId> = BTreeSet::new();
    for cluster in &result.clusters {
        assert!(!cluster.members.is_empty());
        for member in &cluster.members {
            assert!(seen.insert(member.clone()), "{member} appears in two clusters");
        }
    }
    assert_eq!(seen.len(), result.summary.records_resolved);
    assert_eq!(result.assignments.len(), result.summary.records_resolved);
}

#[test]
fn composite_scores_obey_renormalization_law() {
    let config = fixture_config();
    let result = run_fixture();
    for decision in &result.decisions {
        assert!(decision.score.composite >= 0.0 && decision.score.composite <= 1.0);
        assert!(
            composite_law_holds(&decision.score, &config.weights),
            "renormalization law violated for {}",
            decision.pair
        );
    }
}

#[test]
fn repeated_runs_are_byte_identical() {
    let first = run_fixture();
    let second = run_fixture();

    // Everything except the wall-clock meta must be reproducible.
    let json = |r: &RunResult| {
        (
            serde_json::to_string(&r.decisions).unwrap(),
            serde_json::to_string(&r.clusters).unwrap(),
            serde_json::to_string(&r.assignments).unwrap(),
            serde_json::to_string(&r.summary).unwrap(),
        )
    };
    assert_eq!(json(&first), json(&second));
}

// -------------------------------------------------------------------------
// Scenario 1: same building, different wording
// -------------------------------------------------------------------------

#[test]
fn same_place_different_wording_matches() {
    let result = run_fixture();
    let decision = decision_for(&result, "r_01", "r_02");

    assert!(decision.score.composite > 0.78, "composite {}", decision.score.composite);
    assert!(decision.conflict.is_none());
    assert_eq!(decision.verdict, Verdict::Match);
    assert_eq!(
        result.assignments[&RecordId::from("r_01")],
        result.assignments[&RecordId::from("r_02")]
    );
}

// -------------------------------------------------------------------------
// Scenario 2: administrative hard veto
// -------------------------------------------------------------------------

#[test]
fn district_contradiction_vetoes_identical_location() {
    let result = run_fixture();
    let decision = decision_for(&result, "r_03", "r_04");

    let conflict = decision.conflict.as_ref().expect("veto expected");
    assert_eq!(conflict.kind, ConflictKind::HardVeto);
    assert_eq!(conflict.rule, "admin-mismatch");
    assert_eq!(decision.verdict, Verdict::NoMatch);
    assert_ne!(
        result.assignments[&RecordId::from("r_03")],
        result.assignments[&RecordId::from("r_04")]
    );

    // The source-asserted district on r_04 also disagrees with its parse.
    assert!(result.summary.issues.iter().any(|i| matches!(
        i,
        RunIssue::RecordFieldConflict { record, field, .. }
            if record == &RecordId::from("r_04") && field == "district_claim"
    )));
}

// -------------------------------------------------------------------------
// Scenario 3: anchor-only location cue
// -------------------------------------------------------------------------

#[test]
fn intersection_reference_yields_anchor_candidates() {
    let result = run_fixture();

    // r_05 carries no coordinates at all.
    assert!(result
        .summary
        .issues
        .contains(&RunIssue::MissingGeocode { record: RecordId::from("r_05") }));

    // Yet the resolved intersection anchor produced geo-path candidates.
    let decision = decision_for(&result, "r_05", "r_06");
    assert!(decision.sources.contains(&CandidateSource::Anchor));
    assert!(decision.score.channel("anchor").is_some());
    assert!(decision.score.channel("geo").is_none());
}

#[test]
fn unresolvable_anchor_is_skipped_not_fatal() {
    let result = run_fixture();
    assert!(result.summary.issues.iter().any(|i| matches!(
        i,
        RunIssue::AnchorResolutionFailure { record, reference }
            if record == &RecordId::from("r_11") && reference == "庚路|辛路"
    )));
    // The record still lands in a (singleton) cluster.
    assert!(result.assignments.contains_key(&RecordId::from("r_11")));
}

// -------------------------------------------------------------------------
// Veto law across the whole output
// -------------------------------------------------------------------------

#[test]
fn no_cluster_contains_a_vetoed_pair() {
    let result = run_fixture();
    let vetoed: Vec<&PairId> = result
        .decisions
        .iter()
        .filter(|d| d.conflict.as_ref().is_some_and(|c| c.kind == ConflictKind::HardVeto))
        .map(|d| &d.pair)
        .collect();
    assert!(!vetoed.is_empty(), "fixture should produce at least one veto");
    for pair in vetoed {
        assert_ne!(result.assignments[&pair.a], result.assignments[&pair.b], "{pair} co-clustered");
    }
}

// -------------------------------------------------------------------------
// Tuner
// -------------------------------------------------------------------------

#[test]
fn tuner_winner_dominates_grid() {
    let config = fixture_config();
    let input = fixture_input();
    let labels = load_labeled_pairs_csv(&read("labels.csv")).unwrap();

    let corpus: Corpus = input
        .records
        .iter()
        .filter_map(|entry| {
            entry.parsed.as_ref().map(|parsed| {
                (
                    entry.record.id.clone(),
                    ResolvedRecord { record: entry.record.clone(), parsed: parsed.clone() },
                )
            })
        })
        .collect();
    let roads = AliasIndex::from_map(&input.road_aliases);
    let aois = AliasIndex::from_map(&input.aoi_aliases);
    let anchors = AnchorIndex::build(input.anchors.clone());

    let tuner = Tuner::new(&corpus, &roads, &aois, &anchors);
    let outcome = tuner.search(ConfigGrid::around(&config), &labels).unwrap();

    for point in &outcome.points {
        assert!(
            outcome.best_metrics.f1 >= point.metrics.f1,
            "grid point {} beats the winner",
            point.index
        );
    }
    // This sample is cleanly separable, so the winner is perfect.
    assert!((outcome.best_metrics.f1 - 1.0).abs() < 1e-12);
    outcome.best.validate().unwrap();
}
