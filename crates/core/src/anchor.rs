use serde::{Deserialize, Serialize};

/// Stable identifier of an anchor entity.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AnchorId(pub String);

impl AnchorId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }
}

impl std::fmt::Display for AnchorId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnchorKind {
    Poi,
    Road,
    Intersection,
}

/// A named, geocoded reference entity used to resolve relative-position text.
///
/// Intersection anchors carry the sorted road pair joined with `|` as their
/// canonical name (e.g. `"丙路|乙路"`), matching the catalog convention.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnchorEntity {
    pub id: AnchorId,
    pub kind: AnchorKind,
    pub name: String,
    #[serde(default)]
    pub aliases: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub district: Option<String>,
    pub lat: f64,
    pub lon: f64,
}
