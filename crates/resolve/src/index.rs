//! The three read-only indexes behind candidate generation: alias lookup,
//! inverted field postings, spatial buckets, and the anchor catalog.
//!
//! All indexes are built once per run from reference data and never mutated
//! afterwards, so sharing them across parallel scorers is safe.

use std::collections::{BTreeMap, HashMap};

use addrlink_core::{AnchorEntity, AnchorKind, ParsedAddress, RecordId};

use crate::error::ResolveError;
use crate::geo::{self, BucketKey};
use crate::text::alias_key;

// ---------------------------------------------------------------------------
// AliasIndex
// ---------------------------------------------------------------------------

/// Normalized-name → canonical-name lookup, built from `canonical → aliases`
/// dictionaries. Names without an entry canonicalize to themselves.
#[derive(Debug, Clone, Default)]
pub struct AliasIndex {
    canonical: HashMap<String, String>,
}

impl AliasIndex {
    pub fn from_map(canonical_to_aliases: &BTreeMap<String, Vec<String>>) -> Self {
        let mut canonical = HashMap::new();
        for (canon, aliases) in canonical_to_aliases {
            canonical.insert(alias_key(canon), canon.clone());
            for alias in aliases {
                canonical.insert(alias_key(alias), canon.clone());
            }
        }
        Self { canonical }
    }

    /// Parse a `{"canonical": ["alias", ...]}` JSON dictionary.
    pub fn from_json(json: &str) -> Result<Self, ResolveError> {
        let map: BTreeMap<String, Vec<String>> =
            serde_json::from_str(json).map_err(|e| ResolveError::AliasParse(e.to_string()))?;
        Ok(Self::from_map(&map))
    }

    pub fn canonicalize<'a>(&'a self, name: &'a str) -> &'a str {
        self.canonical
            .get(&alias_key(name))
            .map(String::as_str)
            .unwrap_or(name)
    }

    /// Posting key for a name: alias-folded canonical form.
    pub fn key_of(&self, name: &str) -> String {
        alias_key(self.canonicalize(name))
    }
}

// ---------------------------------------------------------------------------
// RecordIndex
// ---------------------------------------------------------------------------

/// Inverted postings over parsed fields, used by the alias blocking path.
#[derive(Debug, Clone, Default)]
pub struct RecordIndex {
    by_district: HashMap<String, Vec<RecordId>>,
    by_road: HashMap<String, Vec<RecordId>>,
    by_aoi: HashMap<String, Vec<RecordId>>,
    by_building: HashMap<String, Vec<RecordId>>,
}

fn posting<'a>(map: &'a HashMap<String, Vec<RecordId>>, key: &str) -> &'a [RecordId] {
    map.get(key).map(Vec::as_slice).unwrap_or(&[])
}

impl RecordIndex {
    pub fn insert(
        &mut self,
        id: &RecordId,
        parsed: &ParsedAddress,
        roads: &AliasIndex,
        aois: &AliasIndex,
    ) {
        if let Some(district) = &parsed.district {
            self.by_district
                .entry(alias_key(district))
                .or_default()
                .push(id.clone());
        }
        if let Some(road) = &parsed.road {
            self.by_road.entry(roads.key_of(road)).or_default().push(id.clone());
        }
        if let Some(aoi) = &parsed.aoi {
            self.by_aoi.entry(aois.key_of(aoi)).or_default().push(id.clone());
        }
        if let Some(building) = &parsed.building {
            self.by_building
                .entry(alias_key(building))
                .or_default()
                .push(id.clone());
        }
    }

    pub fn district(&self, name: &str) -> &[RecordId] {
        posting(&self.by_district, &alias_key(name))
    }

    pub fn road(&self, name: &str, roads: &AliasIndex) -> &[RecordId] {
        posting(&self.by_road, &roads.key_of(name))
    }

    pub fn aoi(&self, name: &str, aois: &AliasIndex) -> &[RecordId] {
        posting(&self.by_aoi, &aois.key_of(name))
    }

    pub fn building(&self, name: &str) -> &[RecordId] {
        posting(&self.by_building, &alias_key(name))
    }
}

// ---------------------------------------------------------------------------
// GeoBucketIndex
// ---------------------------------------------------------------------------

/// Spatial bucketing of geocoded records at a fixed precision.
#[derive(Debug, Clone)]
pub struct GeoBucketIndex {
    precision: u32,
    buckets: HashMap<BucketKey, Vec<RecordId>>,
}

impl GeoBucketIndex {
    pub fn new(precision: u32) -> Self {
        Self { precision, buckets: HashMap::new() }
    }

    pub fn precision(&self) -> u32 {
        self.precision
    }

    pub fn insert(&mut self, id: &RecordId, lat: f64, lon: f64) {
        let key = BucketKey::of(lat, lon, self.precision);
        self.buckets.entry(key).or_default().push(id.clone());
    }

    pub fn bucket_of(&self, lat: f64, lon: f64) -> BucketKey {
        BucketKey::of(lat, lon, self.precision)
    }

    /// Records in the cell containing (lat, lon) and its eight neighbors,
    /// sorted and deduplicated.
    pub fn nearby(&self, lat: f64, lon: f64) -> Vec<RecordId> {
        let mut out = Vec::new();
        for key in self.bucket_of(lat, lon).neighborhood() {
            if let Some(ids) = self.buckets.get(&key) {
                out.extend(ids.iter().cloned());
            }
        }
        out.sort_unstable();
        out.dedup();
        out
    }
}

// ---------------------------------------------------------------------------
// AnchorIndex
// ---------------------------------------------------------------------------

/// Catalog of landmarks used to resolve relative-position references.
#[derive(Debug, Clone, Default)]
pub struct AnchorIndex {
    anchors: Vec<AnchorEntity>,
    by_key: HashMap<String, usize>,
}

impl AnchorIndex {
    pub fn build(anchors: Vec<AnchorEntity>) -> Self {
        let mut by_key = HashMap::new();
        for (i, anchor) in anchors.iter().enumerate() {
            // First entry wins on key collisions; catalog order is the
            // caller's priority order.
            by_key.entry(alias_key(&anchor.name)).or_insert(i);
            for alias in &anchor.aliases {
                by_key.entry(alias_key(alias)).or_insert(i);
            }
            if anchor.kind == AnchorKind::Intersection {
                // Also reachable through the road pair regardless of how the
                // catalog spelled the name.
                if let Some((a, b)) = anchor.name.split_once('|') {
                    by_key.entry(Self::intersection_key(a, b)).or_insert(i);
                }
            }
        }
        Self { anchors, by_key }
    }

    /// Canonical lookup key for an intersection: sorted alias-folded roads
    /// joined with `|`, so `(a, b)` and `(b, a)` resolve identically.
    pub fn intersection_key(road_a: &str, road_b: &str) -> String {
        let a = alias_key(road_a);
        let b = alias_key(road_b);
        if a <= b {
            format!("{a}|{b}")
        } else {
            format!("{b}|{a}")
        }
    }

    pub fn get(&self, key: &str) -> Option<&AnchorEntity> {
        self.by_key.get(&alias_key(key)).map(|&i| &self.anchors[i])
    }

    /// Resolve a parsed relative reference to its anchor: the intersection
    /// road pair first (roads canonicalized), then the aoi, then the poi name.
    pub fn resolve(&self, parsed: &ParsedAddress, roads: &AliasIndex) -> Option<&AnchorEntity> {
        if let Some((a, b)) = &parsed.intersection {
            let key = Self::intersection_key(roads.canonicalize(a), roads.canonicalize(b));
            if let Some(i) = self.by_key.get(&key) {
                return Some(&self.anchors[*i]);
            }
        }
        if let Some(aoi) = &parsed.aoi {
            if let Some(anchor) = self.get(aoi) {
                return Some(anchor);
            }
        }
        if let Some(poi) = &parsed.poi_name {
            if let Some(anchor) = self.get(poi) {
                return Some(anchor);
            }
        }
        None
    }

    /// Target position of a relative reference: the resolved anchor, offset
    /// by direction and distance when the text carries them.
    pub fn project(&self, parsed: &ParsedAddress, roads: &AliasIndex) -> Option<(f64, f64)> {
        let anchor = self.resolve(parsed, roads)?;
        Some(match (parsed.direction, parsed.distance_m) {
            (Some(direction), Some(distance_m)) => {
                geo::offset_latlon(anchor.lat, anchor.lon, direction, f64::from(distance_m))
            }
            _ => (anchor.lat, anchor.lon),
        })
    }
}
