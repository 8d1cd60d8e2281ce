//! Ingestion helpers: parse records, parsed fields, anchors and labels from
//! CSV text, and alias dictionaries from JSON. Convenience for callers and
//! fixtures; the engine itself only ever sees the in-memory structures.

use std::collections::BTreeMap;

use addrlink_core::{
    AddressRecord, AnchorEntity, AnchorId, AnchorKind, Direction, ParsedAddress, RecordId,
};

use crate::engine::{RecordInput, RunInput};
use crate::error::ResolveError;
use crate::model::{LabeledPair, PairId};

fn reader(data: &str) -> csv::Reader<&[u8]> {
    csv::ReaderBuilder::new().has_headers(true).from_reader(data.as_bytes())
}

fn headers(reader: &mut csv::Reader<&[u8]>, table: &str) -> Result<Vec<String>, ResolveError> {
    Ok(reader
        .headers()
        .map_err(|e| ResolveError::FieldParse {
            table: table.into(),
            record_id: String::new(),
            column: "<headers>".into(),
            value: e.to_string(),
        })?
        .iter()
        .map(|h| h.to_string())
        .collect())
}

fn column(headers: &[String], table: &str, name: &str) -> Result<usize, ResolveError> {
    headers.iter().position(|h| h == name).ok_or_else(|| ResolveError::MissingColumn {
        table: table.into(),
        column: name.into(),
    })
}

fn optional(record: &csv::StringRecord, idx: usize) -> Option<String> {
    record.get(idx).map(str::trim).filter(|v| !v.is_empty()).map(String::from)
}

fn required(record: &csv::StringRecord, idx: usize) -> String {
    record.get(idx).unwrap_or("").trim().to_string()
}

/// Records table: `rid, source, raw_address, district_claim, grid_district,
/// lat, lon`.
pub fn load_records_csv(data: &str) -> Result<Vec<AddressRecord>, ResolveError> {
    const TABLE: &str = "address_records";
    let mut reader = reader(data);
    let headers = headers(&mut reader, TABLE)?;

    let rid = column(&headers, TABLE, "rid")?;
    let source = column(&headers, TABLE, "source")?;
    let raw_address = column(&headers, TABLE, "raw_address")?;
    let district_claim = column(&headers, TABLE, "district_claim")?;
    let grid_district = column(&headers, TABLE, "grid_district")?;
    let lat = column(&headers, TABLE, "lat")?;
    let lon = column(&headers, TABLE, "lon")?;

    let mut out = Vec::new();
    for row in reader.records() {
        let row = row.map_err(|e| ResolveError::FieldParse {
            table: TABLE.into(),
            record_id: String::new(),
            column: "<row>".into(),
            value: e.to_string(),
        })?;
        let id = required(&row, rid);
        out.push(AddressRecord {
            id: RecordId::new(id.clone()),
            source: required(&row, source),
            raw_text: required(&row, raw_address),
            district_claim: optional(&row, district_claim),
            grid_district: optional(&row, grid_district),
            lat: parse_coord(&row, lat, TABLE, &id, "lat")?,
            lon: parse_coord(&row, lon, TABLE, &id, "lon")?,
        });
    }
    Ok(out)
}

fn parse_coord(
    row: &csv::StringRecord,
    idx: usize,
    table: &str,
    record_id: &str,
    column: &str,
) -> Result<Option<f64>, ResolveError> {
    match optional(row, idx) {
        None => Ok(None),
        Some(value) => value.parse::<f64>().map(Some).map_err(|_| ResolveError::FieldParse {
            table: table.into(),
            record_id: record_id.into(),
            column: column.into(),
            value,
        }),
    }
}

/// Parsed-fields table: `rid, norm_text, province, city, district, street,
/// road, road_no, aoi, building, unit, floor, room, poi_name, intersection,
/// direction, distance_m`. Intersections are `a|b`.
pub fn load_parsed_csv(data: &str) -> Result<BTreeMap<RecordId, ParsedAddress>, ResolveError> {
    const TABLE: &str = "parsed_addresses";
    let mut reader = reader(data);
    let headers = headers(&mut reader, TABLE)?;

    let rid = column(&headers, TABLE, "rid")?;
    let norm_text = column(&headers, TABLE, "norm_text")?;
    let simple = [
        "province", "city", "district", "street", "road", "road_no", "aoi", "building", "unit",
        "floor", "room", "poi_name",
    ];
    let mut simple_idx = Vec::with_capacity(simple.len());
    for name in simple {
        simple_idx.push(column(&headers, TABLE, name)?);
    }
    let intersection = column(&headers, TABLE, "intersection")?;
    let direction = column(&headers, TABLE, "direction")?;
    let distance_m = column(&headers, TABLE, "distance_m")?;

    let mut out = BTreeMap::new();
    for row in reader.records() {
        let row = row.map_err(|e| ResolveError::FieldParse {
            table: TABLE.into(),
            record_id: String::new(),
            column: "<row>".into(),
            value: e.to_string(),
        })?;
        let id = required(&row, rid);

        let mut parsed = ParsedAddress::default();
        parsed.norm_text = required(&row, norm_text);
        let mut fields = simple_idx.iter().map(|&i| optional(&row, i));
        parsed.province = fields.next().flatten();
        parsed.city = fields.next().flatten();
        parsed.district = fields.next().flatten();
        parsed.street = fields.next().flatten();
        parsed.road = fields.next().flatten();
        parsed.road_no = fields.next().flatten();
        parsed.aoi = fields.next().flatten();
        parsed.building = fields.next().flatten();
        parsed.unit = fields.next().flatten();
        parsed.floor = fields.next().flatten();
        parsed.room = fields.next().flatten();
        parsed.poi_name = fields.next().flatten();

        parsed.intersection = optional(&row, intersection).and_then(|v| {
            v.split_once('|').map(|(a, b)| (a.trim().to_string(), b.trim().to_string()))
        });
        parsed.direction = match optional(&row, direction) {
            None => None,
            Some(value) => Some(Direction::parse(&value).ok_or_else(|| {
                ResolveError::FieldParse {
                    table: TABLE.into(),
                    record_id: id.clone(),
                    column: "direction".into(),
                    value,
                }
            })?),
        };
        parsed.distance_m = match optional(&row, distance_m) {
            None => None,
            Some(value) => {
                Some(value.parse::<u32>().map_err(|_| ResolveError::FieldParse {
                    table: TABLE.into(),
                    record_id: id.clone(),
                    column: "distance_m".into(),
                    value,
                })?)
            }
        };

        out.insert(RecordId::new(id), parsed);
    }
    Ok(out)
}

/// Anchor catalog: `anchor_id, kind, name, aliases, district, lat, lon`.
/// Aliases are `|`-separated; kind is `poi`, `road` or `intersection`.
pub fn load_anchors_csv(data: &str) -> Result<Vec<AnchorEntity>, ResolveError> {
    const TABLE: &str = "anchors";
    let mut reader = reader(data);
    let headers = headers(&mut reader, TABLE)?;

    let anchor_id = column(&headers, TABLE, "anchor_id")?;
    let kind = column(&headers, TABLE, "kind")?;
    let name = column(&headers, TABLE, "name")?;
    let aliases = column(&headers, TABLE, "aliases")?;
    let district = column(&headers, TABLE, "district")?;
    let lat = column(&headers, TABLE, "lat")?;
    let lon = column(&headers, TABLE, "lon")?;

    let mut out = Vec::new();
    for row in reader.records() {
        let row = row.map_err(|e| ResolveError::FieldParse {
            table: TABLE.into(),
            record_id: String::new(),
            column: "<row>".into(),
            value: e.to_string(),
        })?;
        let id = required(&row, anchor_id);

        let kind_value = required(&row, kind);
        let kind = match kind_value.as_str() {
            "poi" => AnchorKind::Poi,
            "road" => AnchorKind::Road,
            "intersection" => AnchorKind::Intersection,
            _ => {
                return Err(ResolveError::FieldParse {
                    table: TABLE.into(),
                    record_id: id,
                    column: "kind".into(),
                    value: kind_value,
                })
            }
        };

        let parse = |idx: usize, column: &str| -> Result<f64, ResolveError> {
            let value = required(&row, idx);
            value.parse::<f64>().map_err(|_| ResolveError::FieldParse {
                table: TABLE.into(),
                record_id: id.clone(),
                column: column.into(),
                value,
            })
        };
        let lat = parse(lat, "lat")?;
        let lon = parse(lon, "lon")?;

        out.push(AnchorEntity {
            id: AnchorId::new(id),
            kind,
            name: required(&row, name),
            aliases: optional(&row, aliases)
                .map(|v| v.split('|').map(|a| a.trim().to_string()).collect())
                .unwrap_or_default(),
            district: optional(&row, district),
            lat,
            lon,
        });
    }
    Ok(out)
}

/// Labeled pairs: `rid1, rid2, label` with label 1 = same entity.
pub fn load_labeled_pairs_csv(data: &str) -> Result<Vec<LabeledPair>, ResolveError> {
    const TABLE: &str = "pair_labels";
    let mut reader = reader(data);
    let headers = headers(&mut reader, TABLE)?;

    let rid1 = column(&headers, TABLE, "rid1")?;
    let rid2 = column(&headers, TABLE, "rid2")?;
    let label = column(&headers, TABLE, "label")?;

    let mut out = Vec::new();
    for row in reader.records() {
        let row = row.map_err(|e| ResolveError::FieldParse {
            table: TABLE.into(),
            record_id: String::new(),
            column: "<row>".into(),
            value: e.to_string(),
        })?;
        let a = required(&row, rid1);
        let label_value = required(&row, label);
        let expected_match = match label_value.as_str() {
            "1" | "true" => true,
            "0" | "false" => false,
            _ => {
                return Err(ResolveError::FieldParse {
                    table: TABLE.into(),
                    record_id: a,
                    column: "label".into(),
                    value: label_value,
                })
            }
        };
        out.push(LabeledPair {
            pair: PairId::new(RecordId::new(a), RecordId::new(required(&row, rid2))),
            expected_match,
        });
    }
    Ok(out)
}

/// Alias dictionary: `{"canonical": ["alias", ...]}` JSON.
pub fn load_alias_map_json(json: &str) -> Result<BTreeMap<String, Vec<String>>, ResolveError> {
    serde_json::from_str(json).map_err(|e| ResolveError::AliasParse(e.to_string()))
}

/// Join records with their parsed rows into engine input. Records without a
/// parsed row become extraction failures.
pub fn assemble_input(
    records: Vec<AddressRecord>,
    mut parsed: BTreeMap<RecordId, ParsedAddress>,
    anchors: Vec<AnchorEntity>,
    road_aliases: BTreeMap<String, Vec<String>>,
    aoi_aliases: BTreeMap<String, Vec<String>>,
) -> RunInput {
    let records = records
        .into_iter()
        .map(|record| {
            let parsed = parsed.remove(&record.id);
            RecordInput { record, parsed }
        })
        .collect();
    RunInput { records, anchors, road_aliases, aoi_aliases }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn load_records_basic() {
        let csv = "\
rid,source,raw_address,district_claim,grid_district,lat,lon
r_1,crm,甲区乙路3号,甲区,,30.0000,120.0000
r_2,manual,甲区乙路3号楼A座,,,,
";
        let records = load_records_csv(csv).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].id, RecordId::from("r_1"));
        assert_eq!(records[0].geocode(), Some((30.0, 120.0)));
        assert_eq!(records[0].district_claim.as_deref(), Some("甲区"));
        assert_eq!(records[1].geocode(), None);
    }

    #[test]
    fn load_records_rejects_bad_coordinate() {
        let csv = "\
rid,source,raw_address,district_claim,grid_district,lat,lon
r_1,crm,x,,,thirty,120.0
";
        let err = load_records_csv(csv).unwrap_err();
        assert!(err.to_string().contains("lat"));
        assert!(err.to_string().contains("thirty"));
    }

    #[test]
    fn load_records_missing_column() {
        let csv = "rid,source\nr_1,crm\n";
        let err = load_records_csv(csv).unwrap_err();
        assert!(matches!(err, ResolveError::MissingColumn { ref column, .. } if column == "raw_address"));
    }

    #[test]
    fn load_parsed_with_intersection_and_direction() {
        let csv = "\
rid,norm_text,province,city,district,street,road,road_no,aoi,building,unit,floor,room,poi_name,intersection,direction,distance_m
r_1,乙路与丙路交口东50米,,,甲区,,,,,,,,,,乙路|丙路,东,50
";
        let parsed = load_parsed_csv(csv).unwrap();
        let p = &parsed[&RecordId::from("r_1")];
        assert_eq!(p.intersection, Some(("乙路".to_string(), "丙路".to_string())));
        assert_eq!(p.direction, Some(Direction::East));
        assert_eq!(p.distance_m, Some(50));
        assert!(p.has_relative_reference());
    }

    #[test]
    fn load_parsed_rejects_unknown_direction() {
        let csv = "\
rid,norm_text,province,city,district,street,road,road_no,aoi,building,unit,floor,room,poi_name,intersection,direction,distance_m
r_1,x,,,,,,,,,,,,,,up,50
";
        let err = load_parsed_csv(csv).unwrap_err();
        assert!(err.to_string().contains("direction"));
    }

    #[test]
    fn load_anchors_with_aliases() {
        let csv = "\
anchor_id,kind,name,aliases,district,lat,lon
anc_1,intersection,丙路|乙路,,甲区,30.0002,120.0003
anc_2,poi,高新创新园,创新园|Chuangxin Park,甲区,30.001,120.001
";
        let anchors = load_anchors_csv(csv).unwrap();
        assert_eq!(anchors.len(), 2);
        assert_eq!(anchors[0].kind, AnchorKind::Intersection);
        assert_eq!(anchors[1].aliases, vec!["创新园".to_string(), "Chuangxin Park".to_string()]);
    }

    #[test]
    fn load_labels_and_assemble() {
        let labels = load_labeled_pairs_csv("rid1,rid2,label\nr_2,r_1,1\nr_1,r_3,0\n").unwrap();
        assert_eq!(labels.len(), 2);
        assert!(labels[0].expected_match);
        // Pair ids normalize order.
        assert_eq!(labels[0].pair.a, RecordId::from("r_1"));

        let records = load_records_csv(
            "rid,source,raw_address,district_claim,grid_district,lat,lon\nr_1,crm,x,,,,\nr_2,crm,y,,,,\n",
        )
        .unwrap();
        let parsed = load_parsed_csv(
            "rid,norm_text,province,city,district,street,road,road_no,aoi,building,unit,floor,room,poi_name,intersection,direction,distance_m\nr_1,x,,,,,,,,,,,,,,,\n",
        )
        .unwrap();
        let input = assemble_input(records, parsed, vec![], BTreeMap::new(), BTreeMap::new());
        assert_eq!(input.records.len(), 2);
        assert!(input.records[0].parsed.is_some());
        assert!(input.records[1].parsed.is_none(), "r_2 has no parsed row");
    }

    #[test]
    fn load_labels_rejects_bad_label() {
        let err = load_labeled_pairs_csv("rid1,rid2,label\nr_1,r_2,maybe\n").unwrap_err();
        assert!(err.to_string().contains("maybe"));
    }
}
