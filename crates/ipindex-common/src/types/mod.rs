//! Common types used across ipindex

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::IpIndexError;

/// Namespace for deterministic record identifiers (UUIDv5)
pub const RECORD_ID_NAMESPACE: Uuid = Uuid::from_u128(0x3f6c_9a1e_52d4_4b8e_9c07_d1a2_e6b4_f013);

/// Regional internet registry that published a dump
///
/// The tag is supplied by the caller per input file; it is never read from
/// the stanza body.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Registry {
    Ripe,
    Arin,
    Afrinic,
    Apnic,
    Lacnic,
}

impl Registry {
    pub const ALL: [Registry; 5] = [
        Registry::Ripe,
        Registry::Arin,
        Registry::Afrinic,
        Registry::Apnic,
        Registry::Lacnic,
    ];

    /// Canonical tag stored with every record
    pub fn as_str(&self) -> &'static str {
        match self {
            Registry::Ripe => "RIPE",
            Registry::Arin => "ARIN",
            Registry::Afrinic => "AFRINIC",
            Registry::Apnic => "APNIC",
            Registry::Lacnic => "LACNIC",
        }
    }

    /// File names of the split dumps this registry publishes
    pub fn dump_files(&self) -> &'static [&'static str] {
        match self {
            Registry::Ripe => &["ripe.db.inetnum.gz", "ripe.db.inet6num.gz"],
            Registry::Arin => &["arin.db"],
            Registry::Afrinic => &["afrinic.db.gz"],
            Registry::Apnic => &["apnic.db.inetnum.gz", "apnic.db.inet6num.gz"],
            Registry::Lacnic => &["lacnic.db.gz"],
        }
    }

    /// Comment lines the registry inserts periodically into its dumps
    pub fn trailer_markers(&self) -> &'static [&'static str] {
        match self {
            Registry::Ripe => &["% RIPE-USER-RESOURCE"],
            _ => &[],
        }
    }
}

impl std::str::FromStr for Registry {
    type Err = IpIndexError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "RIPE" | "RIPE-IPV6" => Ok(Registry::Ripe),
            "ARIN" => Ok(Registry::Arin),
            "AFRINIC" => Ok(Registry::Afrinic),
            "APNIC" | "APNIC-IPV6" => Ok(Registry::Apnic),
            "LACNIC" => Ok(Registry::Lacnic),
            _ => Err(IpIndexError::UnknownRegistry(s.to_string())),
        }
    }
}

impl std::fmt::Display for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A network allocation extracted from one registry stanza.
///
/// Records are immutable once built. The `id` depends only on the normalized
/// network and the registry, so ingesting the same dump twice yields the same
/// ids.
///
/// # Examples
///
/// ```rust
/// use ipindex_common::types::{NetworkRecord, Registry};
///
/// let a = NetworkRecord::derive_id(Registry::Ripe, "10.0.0.0/24");
/// let b = NetworkRecord::derive_id(Registry::Ripe, "10.0.0.0/24");
/// assert_eq!(a, b);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkRecord {
    /// Deterministic identifier, see [`NetworkRecord::derive_id`]
    pub id: Uuid,

    /// Normalized CIDR block; `None` when the stanza had no parseable range
    pub network: Option<String>,

    /// `netname:` values
    pub name: Option<String>,

    /// `descr:` values
    pub description: Option<String>,

    /// `country:` values
    pub country: Option<String>,

    /// `mnt-by:` values
    pub maintainer: Option<String>,

    /// `created:` values
    pub created: Option<String>,

    /// `last-modified:` values
    pub last_modified: Option<String>,

    /// Registry the dump came from
    pub source: Registry,
}

impl NetworkRecord {
    /// Derive the record id from a normalized network and its registry
    pub fn derive_id(source: Registry, network: &str) -> Uuid {
        let name = format!("{}|{}", source.as_str(), network);
        Uuid::new_v5(&RECORD_ID_NAMESPACE, name.as_bytes())
    }

    /// Derive the id of a record whose range could not be normalized.
    ///
    /// The raw range text stands in for the network so distinct unparseable
    /// stanzas do not collapse onto one id.
    pub fn derive_unparsed_id(source: Registry, raw_range: &str) -> Uuid {
        let name = format!("{}|unparsed|{}", source.as_str(), raw_range.trim());
        Uuid::new_v5(&RECORD_ID_NAMESPACE, name.as_bytes())
    }
}
