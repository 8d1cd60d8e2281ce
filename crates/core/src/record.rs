use serde::{Deserialize, Serialize};

/// Stable identifier of an address record.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordId(pub String);

impl RecordId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for RecordId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for RecordId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// One raw address record as delivered by an upstream source.
///
/// `district_claim` is the district asserted by the submitting source;
/// `grid_district` is the district implied by the source's grid assignment.
/// Either may disagree with what extraction later parses out of the text.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AddressRecord {
    pub id: RecordId,
    pub source: String,
    pub raw_text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub district_claim: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub grid_district: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lat: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lon: Option<f64>,
}

impl AddressRecord {
    /// Both coordinates, or nothing.
    pub fn geocode(&self) -> Option<(f64, f64)> {
        match (self.lat, self.lon) {
            (Some(lat), Some(lon)) => Some((lat, lon)),
            _ => None,
        }
    }
}

/// Structured fields extracted from an address text by the upstream parser.
///
/// All fields are optional: extraction yields whatever the text supports.
/// `intersection`, `direction` and `distance_m` together describe a
/// relative-position reference ("50m east of the A/B crossing").
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ParsedAddress {
    pub norm_text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub province: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub city: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub district: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub street: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub road: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub road_no: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aoi: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub building: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub floor: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub room: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub poi_name: Option<String>,
    /// Road pair of an intersection reference, in text order.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub intersection: Option<(String, String)>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub direction: Option<Direction>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub distance_m: Option<u32>,
}

impl ParsedAddress {
    /// Whether the text carried any relative-position cue worth resolving
    /// through an anchor catalog.
    pub fn has_relative_reference(&self) -> bool {
        self.intersection.is_some() || (self.direction.is_some() && self.distance_m.is_some())
    }
}

/// Eight compass points used in relative-position references.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    North,
    South,
    East,
    West,
    Northeast,
    Northwest,
    Southeast,
    Southwest,
}

impl Direction {
    /// Parse the single-character Chinese compass forms and their ASCII names.
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim() {
            "北" | "north" | "n" => Some(Self::North),
            "南" | "south" | "s" => Some(Self::South),
            "东" | "east" | "e" => Some(Self::East),
            "西" | "west" | "w" => Some(Self::West),
            "东北" | "northeast" | "ne" => Some(Self::Northeast),
            "西北" | "northwest" | "nw" => Some(Self::Northwest),
            "东南" | "southeast" | "se" => Some(Self::Southeast),
            "西南" | "southwest" | "sw" => Some(Self::Southwest),
            _ => None,
        }
    }

    /// Unit (lat, lon) displacement. Lat grows north, lon grows east;
    /// diagonals are normalized so distance is preserved.
    pub fn unit_vector(self) -> (f64, f64) {
        const D: f64 = std::f64::consts::FRAC_1_SQRT_2;
        match self {
            Self::North => (1.0, 0.0),
            Self::South => (-1.0, 0.0),
            Self::East => (0.0, 1.0),
            Self::West => (0.0, -1.0),
            Self::Northeast => (D, D),
            Self::Northwest => (D, -D),
            Self::Southeast => (-D, D),
            Self::Southwest => (-D, -D),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_id_orders_lexicographically() {
        let a = RecordId::from("r_01");
        let b = RecordId::from("r_02");
        assert!(a < b);
        assert_eq!(a.to_string(), "r_01");
    }

    #[test]
    fn geocode_requires_both_coordinates() {
        let mut rec = AddressRecord {
            id: RecordId::from("r_1"),
            source: "crm".into(),
            raw_text: "甲区乙路3号".into(),
            district_claim: None,
            grid_district: None,
            lat: Some(30.0),
            lon: None,
        };
        assert_eq!(rec.geocode(), None);
        rec.lon = Some(120.0);
        assert_eq!(rec.geocode(), Some((30.0, 120.0)));
    }

    #[test]
    fn direction_parses_chinese_and_ascii() {
        assert_eq!(Direction::parse("东"), Some(Direction::East));
        assert_eq!(Direction::parse("northwest"), Some(Direction::Northwest));
        assert_eq!(Direction::parse("NE".to_lowercase().as_str()), Some(Direction::Northeast));
        assert_eq!(Direction::parse("up"), None);
    }

    #[test]
    fn diagonal_vectors_are_unit_length() {
        let (dlat, dlon) = Direction::Southwest.unit_vector();
        let norm = (dlat * dlat + dlon * dlon).sqrt();
        assert!((norm - 1.0).abs() < 1e-12);
        assert!(dlat < 0.0 && dlon < 0.0);
    }

    #[test]
    fn relative_reference_detection() {
        let mut p = ParsedAddress::default();
        assert!(!p.has_relative_reference());
        p.direction = Some(Direction::East);
        assert!(!p.has_relative_reference());
        p.distance_m = Some(50);
        assert!(p.has_relative_reference());
        p.direction = None;
        p.distance_m = None;
        p.intersection = Some(("乙路".into(), "丙路".into()));
        assert!(p.has_relative_reference());
    }
}
