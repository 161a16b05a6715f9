//! RPSL dump parsing
//!
//! Line stream → [`Stanza`] → [`NetworkRecord`](ipindex_common::types::NetworkRecord).

pub mod assembler;
pub mod attributes;
pub mod cidr;
pub mod parser;

pub use assembler::{
    leaves_stanza_open, AssemblerStats, Stanza, StanzaAssembler, Stanzas, DEFAULT_PRIMARY_TYPES,
};
pub use attributes::{extract_attribute, Attributes};
pub use cidr::{ipv4_range_to_cidrs, CidrMode, RangeNormalizer};
pub use parser::{ParsedStanza, RecordParser};
