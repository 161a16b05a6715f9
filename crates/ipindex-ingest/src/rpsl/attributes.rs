//! Attribute extraction from assembled stanzas

use super::assembler::Stanza;

/// Key/value view over one stanza.
///
/// Keys are matched exactly against the text before the first `:` of a line,
/// so `descr` never matches `descr-extra:` and a key is only recognised at the
/// start of a line.
#[derive(Debug, Clone)]
pub struct Attributes<'a> {
    pairs: Vec<(&'a str, &'a str)>,
}

impl<'a> Attributes<'a> {
    pub fn parse(text: &'a str) -> Self {
        let pairs = text
            .lines()
            .filter_map(|line| line.split_once(':'))
            .map(|(key, value)| (key, value.trim()))
            .collect();
        Self { pairs }
    }

    pub fn from_stanza(stanza: &'a Stanza) -> Self {
        Self::parse(stanza.text())
    }

    /// First value of `key`, even when empty
    pub fn first(&self, key: &str) -> Option<&'a str> {
        self.pairs.iter().find(|(k, _)| *k == key).map(|(_, v)| *v)
    }

    /// All non-empty values of `key` joined by a single space
    pub fn joined(&self, key: &str) -> Option<String> {
        let values: Vec<&str> = self
            .pairs
            .iter()
            .filter(|(k, v)| *k == key && !v.is_empty())
            .map(|(_, v)| *v)
            .collect();

        if values.is_empty() {
            None
        } else {
            Some(values.join(" "))
        }
    }
}

/// One-shot form of [`Attributes::joined`]
pub fn extract_attribute(text: &str, key: &str) -> Option<String> {
    Attributes::parse(text).joined(key)
}
