//! Veto-aware clustering of MATCH verdicts into entities.
//!
//! The graph is explicit (edges + a separate forbidden-pair set) rather than
//! an incremental union-find: contradictory evidence is resolved by a
//! deterministic edge-removal pass after all verdicts are in, so the result
//! is independent of arrival order.

use std::collections::{BTreeMap, BTreeSet, HashMap, VecDeque};

use addrlink_core::{ParsedAddress, RecordId};
use ordered_float::OrderedFloat;
use petgraph::graph::{NodeIndex, UnGraph};

use crate::model::{Cluster, Corpus, PairId, RunIssue};

#[derive(Debug)]
pub struct ClusterBuilder {
    graph: UnGraph<RecordId, f64>,
    node_of: BTreeMap<RecordId, NodeIndex>,
    /// Record ids in first-seen order; representative ties resolve by it.
    order: Vec<RecordId>,
    forbidden: BTreeSet<PairId>,
}

impl Default for ClusterBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ClusterBuilder {
    pub fn new() -> Self {
        Self {
            graph: UnGraph::new_undirected(),
            node_of: BTreeMap::new(),
            order: Vec::new(),
            forbidden: BTreeSet::new(),
        }
    }

    /// Register a record. Every processed record must be registered so that
    /// edge-less records still come out as singleton clusters.
    pub fn add_record(&mut self, id: &RecordId) {
        if !self.node_of.contains_key(id) {
            let node = self.graph.add_node(id.clone());
            self.node_of.insert(id.clone(), node);
            self.order.push(id.clone());
        }
    }

    /// Record a MATCH verdict, weighted by its composite score.
    pub fn add_match(&mut self, pair: &PairId, weight: f64) {
        self.add_record(&pair.a);
        self.add_record(&pair.b);
        let na = self.node_of[&pair.a];
        let nb = self.node_of[&pair.b];
        self.graph.update_edge(na, nb, weight);
    }

    /// Record a hard-veto pair: the two records must never co-cluster.
    pub fn add_forbidden(&mut self, pair: &PairId) {
        self.add_record(&pair.a);
        self.add_record(&pair.b);
        self.forbidden.insert(pair.clone());
    }

    /// Resolve contradictions and emit the final partition.
    ///
    /// For each forbidden pair still connected through MATCH edges, the
    /// lowest-scoring edge on the connecting path is removed (ties broken by
    /// the lexicographically smaller endpoint pair) until the pair is
    /// separated. This merge phase is the single serialized step; it must
    /// run only after all verdicts are collected.
    pub fn build(mut self, corpus: &Corpus) -> (Vec<Cluster>, Vec<RunIssue>) {
        let mut issues = Vec::new();

        for pair in self.forbidden.clone() {
            let (Some(&na), Some(&nb)) = (self.node_of.get(&pair.a), self.node_of.get(&pair.b))
            else {
                continue;
            };
            while let Some(path) = self.bfs_path(na, nb) {
                let Some((edge, removed)) = self.lowest_edge_on(&path) else {
                    break;
                };
                log::warn!("forbidden pair {pair} connected through MATCH edges; removing {removed}");
                self.graph.remove_edge(edge);
                issues.push(RunIssue::ClusterContradiction {
                    pair: pair.clone(),
                    removed_edge: removed,
                });
            }
        }

        let clusters = self.components(corpus);
        (clusters, issues)
    }

    /// Shortest path by hops, neighbors expanded in record-id order so the
    /// path (and therefore the removed edge) is deterministic.
    fn bfs_path(&self, from: NodeIndex, to: NodeIndex) -> Option<Vec<NodeIndex>> {
        let mut prev: HashMap<NodeIndex, NodeIndex> = HashMap::new();
        let mut queue = VecDeque::new();
        prev.insert(from, from);
        queue.push_back(from);

        while let Some(node) = queue.pop_front() {
            if node == to {
                let mut path = vec![to];
                let mut cur = to;
                while cur != from {
                    cur = prev[&cur];
                    path.push(cur);
                }
                path.reverse();
                return Some(path);
            }
            let mut neighbors: Vec<NodeIndex> = self.graph.neighbors(node).collect();
            neighbors.sort_by(|x, y| self.graph[*x].cmp(&self.graph[*y]));
            for next in neighbors {
                if !prev.contains_key(&next) {
                    prev.insert(next, node);
                    queue.push_back(next);
                }
            }
        }
        None
    }

    fn lowest_edge_on(
        &self,
        path: &[NodeIndex],
    ) -> Option<(petgraph::graph::EdgeIndex, PairId)> {
        let mut best: Option<(petgraph::graph::EdgeIndex, f64, PairId)> = None;
        for window in path.windows(2) {
            let edge = self.graph.find_edge(window[0], window[1])?;
            let weight = self.graph[edge];
            let endpoints =
                PairId::new(self.graph[window[0]].clone(), self.graph[window[1]].clone());
            let better = match &best {
                None => true,
                Some((_, bw, bp)) => (OrderedFloat(weight), &endpoints) < (OrderedFloat(*bw), bp),
            };
            if better {
                best = Some((edge, weight, endpoints));
            }
        }
        best.map(|(edge, _, endpoints)| (edge, endpoints))
    }

    /// Connected components in sorted-id order, with representatives.
    fn components(&self, corpus: &Corpus) -> Vec<Cluster> {
        let mut visited: BTreeSet<RecordId> = BTreeSet::new();
        let mut clusters = Vec::new();

        for (id, &node) in &self.node_of {
            if visited.contains(id) {
                continue;
            }
            let mut members = Vec::new();
            let mut queue = VecDeque::new();
            visited.insert(id.clone());
            queue.push_back(node);
            while let Some(cur) = queue.pop_front() {
                members.push(self.graph[cur].clone());
                for next in self.graph.neighbors(cur) {
                    let next_id = &self.graph[next];
                    if visited.insert(next_id.clone()) {
                        queue.push_back(next);
                    }
                }
            }
            members.sort_unstable();
            let cluster_id = format!("cluster_{}", members[0]);
            let representative = self.representative(&members, corpus);
            clusters.push(Cluster { id: cluster_id, members, representative });
        }

        clusters
    }

    /// Per-field majority vote over the members, ties broken by first-seen
    /// record order.
    fn representative(&self, members: &[RecordId], corpus: &Corpus) -> BTreeMap<String, String> {
        let member_set: BTreeSet<&RecordId> = members.iter().collect();
        let in_order: Vec<&RecordId> =
            self.order.iter().filter(|id| member_set.contains(id)).collect();

        let mut rep = BTreeMap::new();
        for (field, get) in REPRESENTATIVE_FIELDS {
            let mut counts: BTreeMap<&str, usize> = BTreeMap::new();
            for id in &in_order {
                if let Some(value) = corpus.get(*id).and_then(|rr| get(&rr.parsed)) {
                    *counts.entry(value).or_insert(0) += 1;
                }
            }
            let mut best: Option<(&str, usize)> = None;
            for id in &in_order {
                if let Some(value) = corpus.get(*id).and_then(|rr| get(&rr.parsed)) {
                    let count = counts[value];
                    if best.map_or(true, |(_, bc)| count > bc) {
                        best = Some((value, count));
                    }
                }
            }
            if let Some((value, _)) = best {
                rep.insert((*field).to_string(), value.to_string());
            }
        }
        rep
    }
}

type FieldGetter = fn(&ParsedAddress) -> Option<&str>;

const REPRESENTATIVE_FIELDS: &[(&str, FieldGetter)] = &[
    ("province", |p| p.province.as_deref()),
    ("city", |p| p.city.as_deref()),
    ("district", |p| p.district.as_deref()),
    ("street", |p| p.street.as_deref()),
    ("road", |p| p.road.as_deref()),
    ("road_no", |p| p.road_no.as_deref()),
    ("aoi", |p| p.aoi.as_deref()),
    ("building", |p| p.building.as_deref()),
    ("unit", |p| p.unit.as_deref()),
    ("floor", |p| p.floor.as_deref()),
    ("room", |p| p.room.as_deref()),
    ("poi", |p| p.poi_name.as_deref()),
];
