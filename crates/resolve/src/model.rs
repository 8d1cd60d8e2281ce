use std::collections::{BTreeMap, BTreeSet};

use addrlink_core::{AddressRecord, ParsedAddress, RecordId};
use serde::Serialize;

// ---------------------------------------------------------------------------
// Input
// ---------------------------------------------------------------------------

/// A record that survived extraction: raw fields plus parsed fields.
#[derive(Debug, Clone)]
pub struct ResolvedRecord {
    pub record: AddressRecord,
    pub parsed: ParsedAddress,
}

/// The per-run corpus of comparable records, keyed (and iterated) by id.
pub type Corpus = BTreeMap<RecordId, ResolvedRecord>;

// ---------------------------------------------------------------------------
// Pairs + candidates
// ---------------------------------------------------------------------------

/// Unordered pair of record ids, stored smaller-first.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct PairId {
    pub a: RecordId,
    pub b: RecordId,
}

impl PairId {
    pub fn new(x: RecordId, y: RecordId) -> Self {
        if x <= y {
            Self { a: x, b: y }
        } else {
            Self { a: y, b: x }
        }
    }
}

impl std::fmt::Display for PairId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}~{}", self.a, self.b)
    }
}

/// Which blocking path proposed a candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CandidateSource {
    Alias,
    Anchor,
    Geo,
}

/// A candidate pair plus every source that proposed it. Transient, produced
/// per run.
#[derive(Debug, Clone)]
pub struct Candidate {
    pub pair: PairId,
    pub sources: BTreeSet<CandidateSource>,
}

// ---------------------------------------------------------------------------
// Scores + conflicts + verdicts
// ---------------------------------------------------------------------------

/// Per-channel similarity breakdown. Only computable channels are present;
/// a missing channel is excluded from the composite, never scored as zero.
#[derive(Debug, Clone, Serialize)]
pub struct ScoreVector {
    pub channels: BTreeMap<String, f64>,
    /// Weighted sum of present channels, weights renormalized over them.
    pub composite: f64,
}

impl ScoreVector {
    pub fn channel(&self, name: &str) -> Option<f64> {
        self.channels.get(name).copied()
    }

    /// Channel value with a fallback for absent channels.
    pub fn channel_or(&self, name: &str, default: f64) -> f64 {
        self.channel(name).unwrap_or(default)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictKind {
    HardVeto,
    Soft,
}

/// An attribute contradiction detected for a pair.
#[derive(Debug, Clone, Serialize)]
pub struct Conflict {
    pub pair: PairId,
    pub kind: ConflictKind,
    /// Name of the rule that fired.
    pub rule: String,
    /// The disagreeing fields/channels, human-readable.
    pub evidence: Vec<String>,
}

impl Conflict {
    pub fn is_hard(&self) -> bool {
        self.kind == ConflictKind::HardVeto
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Verdict {
    Match,
    Review,
    NoMatch,
}

impl std::fmt::Display for Verdict {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Match => write!(f, "MATCH"),
            Self::Review => write!(f, "REVIEW"),
            Self::NoMatch => write!(f, "NO_MATCH"),
        }
    }
}

/// One adjudicated pair: the decision-log entry exposed to callers.
#[derive(Debug, Clone, Serialize)]
pub struct MatchDecision {
    pub pair: PairId,
    pub sources: BTreeSet<CandidateSource>,
    pub score: ScoreVector,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub conflict: Option<Conflict>,
    pub verdict: Verdict,
    pub adjudicator: String,
}

// ---------------------------------------------------------------------------
// Clusters
// ---------------------------------------------------------------------------

/// A resolved entity: the records that denote one physical place.
#[derive(Debug, Clone, Serialize)]
pub struct Cluster {
    /// `cluster_` + the smallest member id.
    pub id: String,
    /// Member ids, sorted.
    pub members: Vec<RecordId>,
    /// Per-field majority-vote values over the members.
    pub representative: BTreeMap<String, String>,
}

// ---------------------------------------------------------------------------
// Issues
// ---------------------------------------------------------------------------

/// A non-fatal condition isolated to one record, pair or component.
/// Issues never abort a run; they are reported in the summary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RunIssue {
    /// Upstream extraction failed; the record is excluded from the run.
    ParseFailure { record: RecordId },
    /// The record lacks coordinates; its pairs skip the geo channel.
    MissingGeocode { record: RecordId },
    /// A relative-position reference named an unknown landmark.
    AnchorResolutionFailure { record: RecordId, reference: String },
    /// The adjudication capability failed; the pair was downgraded to REVIEW.
    AdjudicationError { pair: PairId, message: String },
    /// A forbidden pair was connected through MATCH edges; an edge was removed.
    ClusterContradiction { pair: PairId, removed_edge: PairId },
    /// A source-asserted field disagrees with the parsed field.
    RecordFieldConflict { record: RecordId, field: String, detail: String },
}

impl std::fmt::Display for RunIssue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ParseFailure { record } => write!(f, "parse failure: record {record} excluded"),
            Self::MissingGeocode { record } => write!(f, "record {record} has no geocode"),
            Self::AnchorResolutionFailure { record, reference } => {
                write!(f, "record {record}: anchor '{reference}' not found")
            }
            Self::AdjudicationError { pair, message } => {
                write!(f, "pair {pair}: adjudication failed ({message}), downgraded to REVIEW")
            }
            Self::ClusterContradiction { pair, removed_edge } => {
                write!(f, "forbidden pair {pair} was connected; removed edge {removed_edge}")
            }
            Self::RecordFieldConflict { record, field, detail } => {
                write!(f, "record {record}: {field} conflict ({detail})")
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Labels
// ---------------------------------------------------------------------------

/// A human-labeled pair for offline tuning.
#[derive(Debug, Clone, Serialize)]
pub struct LabeledPair {
    pub pair: PairId,
    /// Whether the two records denote the same place.
    pub expected_match: bool,
}

// ---------------------------------------------------------------------------
// Summary + Output
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Serialize)]
pub struct RunSummary {
    pub records_in: usize,
    pub parse_failures: usize,
    pub records_resolved: usize,
    pub pairs_evaluated: usize,
    pub matches: usize,
    pub reviews: usize,
    pub no_matches: usize,
    pub hard_vetoes: usize,
    pub soft_conflicts: usize,
    pub clusters: usize,
    pub multi_member_clusters: usize,
    pub issues: Vec<RunIssue>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RunMeta {
    pub config_name: String,
    pub engine_version: String,
    pub run_at: String,
}

/// Everything one run exposes to collaborators: the decision log, the
/// cluster assignment, and the summary. Persistence is the caller's choice.
#[derive(Debug, Clone, Serialize)]
pub struct RunResult {
    pub meta: RunMeta,
    pub summary: RunSummary,
    /// One entry per evaluated candidate pair, sorted by pair id.
    pub decisions: Vec<MatchDecision>,
    pub clusters: Vec<Cluster>,
    /// Record id → cluster id.
    pub assignments: BTreeMap<RecordId, String>,
}
