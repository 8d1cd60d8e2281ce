//! `addrlink-core` — shared vocabulary for address entity resolution.
//!
//! Record and anchor types exchanged between the extraction side (which
//! produces parsed fields) and the resolution engine (which consumes them).
//! Everything here is plain data; behavior lives in `addrlink-resolve`.

pub mod anchor;
pub mod record;

pub use anchor::{AnchorEntity, AnchorId, AnchorKind};
pub use record::{AddressRecord, Direction, ParsedAddress, RecordId};
