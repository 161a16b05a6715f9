//! CIDR normalization
//!
//! IPv4 stanzas declare an inclusive `start - end` range which is converted to
//! its minimal covering set of CIDR blocks. IPv6 stanzas already declare a
//! block and are taken verbatim. A range is expected to lie on a single line
//! after folding.

use std::net::Ipv4Addr;
use std::str::FromStr;

use ipnetwork::{IpNetworkError, Ipv4Network};
use regex::Regex;
use serde::{Deserialize, Serialize};

use super::attributes::Attributes;

/// How many records an IPv4 range that needs several blocks produces
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CidrMode {
    /// Keep only the first covering block; the rest of the range is lost
    #[default]
    FirstBlock,
    /// One record per covering block
    AllBlocks,
}

impl FromStr for CidrMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "first" | "first-block" => Ok(CidrMode::FirstBlock),
            "all" | "all-blocks" => Ok(CidrMode::AllBlocks),
            other => Err(format!("unknown CIDR mode '{other}' (expected first or all)")),
        }
    }
}

/// Minimal set of CIDR blocks exactly covering `start..=end`, lowest first
pub fn ipv4_range_to_cidrs(
    start: Ipv4Addr,
    end: Ipv4Addr,
) -> Result<Vec<Ipv4Network>, IpNetworkError> {
    let mut current = u64::from(u32::from(start));
    let end = u64::from(u32::from(end));
    let mut blocks = Vec::new();

    while current <= end {
        // Largest block aligned on `current`...
        let mut size: u64 = if current == 0 {
            1 << 32
        } else {
            1 << current.trailing_zeros().min(32)
        };
        // ...that does not run past `end`
        while current + size - 1 > end {
            size >>= 1;
        }

        let prefix = 32 - size.trailing_zeros() as u8;
        blocks.push(Ipv4Network::new(Ipv4Addr::from(current as u32), prefix)?);
        current += size;
    }

    Ok(blocks)
}

/// Detects and normalizes the range declared by a stanza
#[derive(Debug, Clone)]
pub struct RangeNormalizer {
    ipv4_range: Regex,
    ipv6_block: Regex,
}

impl RangeNormalizer {
    pub fn new() -> Result<Self, regex::Error> {
        Ok(Self {
            ipv4_range: Regex::new(r"^(\d{1,3}(?:\.\d{1,3}){3})\s*-\s*(\d{1,3}(?:\.\d{1,3}){3})")?,
            ipv6_block: Regex::new(r"^[0-9a-fA-F:/]{1,43}")?,
        })
    }

    /// Covering blocks of the stanza's range, or `None` when it has no
    /// parseable range
    pub fn normalize(&self, attrs: &Attributes<'_>) -> Option<Vec<String>> {
        if let Some(range) = attrs.first("inetnum") {
            return self.normalize_ipv4(range);
        }
        attrs.first("inet6num").and_then(|block| self.normalize_ipv6(block))
    }

    /// `a.b.c.d - e.f.g.h`, or a CIDR block as some registries write it
    pub fn normalize_ipv4(&self, value: &str) -> Option<Vec<String>> {
        let value = value.trim();

        if let Some(caps) = self.ipv4_range.captures(value) {
            let start = Ipv4Addr::from_str(&caps[1]).ok()?;
            let end = Ipv4Addr::from_str(&caps[2]).ok()?;
            if start > end {
                return None;
            }
            let blocks = ipv4_range_to_cidrs(start, end).ok()?;
            return Some(blocks.iter().map(ToString::to_string).collect());
        }

        let block = Ipv4Network::from_str(value).ok()?;
        let canonical = Ipv4Network::new(block.network(), block.prefix()).ok()?;
        Some(vec![canonical.to_string()])
    }

    pub fn normalize_ipv6(&self, value: &str) -> Option<Vec<String>> {
        self.ipv6_block
            .find(value.trim())
            .map(|m| vec![m.as_str().to_string()])
    }
}
