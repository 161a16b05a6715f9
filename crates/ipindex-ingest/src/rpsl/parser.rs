//! Stanza to record conversion

use ipindex_common::types::{NetworkRecord, Registry};

use super::assembler::Stanza;
use super::attributes::Attributes;
use super::cidr::{CidrMode, RangeNormalizer};

/// Builds [`NetworkRecord`]s from kept stanzas of one registry's dump
#[derive(Debug, Clone)]
pub struct RecordParser {
    source: Registry,
    cidr_mode: CidrMode,
    normalizer: RangeNormalizer,
}

/// Records produced by one stanza
#[derive(Debug, Clone, Default)]
pub struct ParsedStanza {
    pub records: Vec<NetworkRecord>,
    /// The stanza's range could not be normalized
    pub unparsed: bool,
}

impl RecordParser {
    pub fn new(source: Registry, cidr_mode: CidrMode) -> Result<Self, regex::Error> {
        Ok(Self {
            source,
            cidr_mode,
            normalizer: RangeNormalizer::new()?,
        })
    }

    pub fn parse(&self, stanza: &Stanza) -> ParsedStanza {
        let attrs = Attributes::from_stanza(stanza);

        let Some(mut networks) = self.normalizer.normalize(&attrs) else {
            let raw = attrs
                .first("inetnum")
                .or_else(|| attrs.first("inet6num"))
                .unwrap_or_default();
            tracing::warn!(
                source = %self.source,
                range = raw,
                "Unparseable network range, storing record without network"
            );
            let id = NetworkRecord::derive_unparsed_id(self.source, raw);
            return ParsedStanza {
                records: vec![self.build(&attrs, id, None)],
                unparsed: true,
            };
        };

        if self.cidr_mode == CidrMode::FirstBlock {
            networks.truncate(1);
        }

        let records = networks
            .into_iter()
            .map(|network| {
                let id = NetworkRecord::derive_id(self.source, &network);
                self.build(&attrs, id, Some(network))
            })
            .collect();

        ParsedStanza {
            records,
            unparsed: false,
        }
    }

    fn build(
        &self,
        attrs: &Attributes<'_>,
        id: uuid::Uuid,
        network: Option<String>,
    ) -> NetworkRecord {
        NetworkRecord {
            id,
            network,
            name: attrs.joined("netname"),
            description: attrs.joined("descr"),
            country: attrs.joined("country"),
            maintainer: attrs.joined("mnt-by"),
            created: attrs.joined("created"),
            last_modified: attrs.joined("last-modified"),
            source: self.source,
        }
    }
}
