//! Stanza assembly
//!
//! Turns a raw line stream into discrete RPSL stanzas. A stanza is the run of
//! attribute lines between two blank lines (or between two primary-type
//! heads). Only stanzas whose first attribute is a primary type are kept.
//!
//! [`Stanzas`] drives a [`StanzaAssembler`] over one chunk of a dump. Past the
//! end of its byte range it keeps reading only while a stanza is still open,
//! so a stanza whose head lies inside the chunk is always emitted whole. The
//! next chunk starts in [`StanzaAssembler::start_mid_stanza`] mode and skips
//! that tail without counting it, so per-chunk counters add up to the counts
//! of a single pass.

use std::io::{self, BufRead};

/// Primary object types kept by default
pub const DEFAULT_PRIMARY_TYPES: &[&str] = &["inetnum", "inet6num"];

/// Attribute whose lines (and their continuations) never reach a stanza
const REMARKS_KEY: &str = "remarks";

/// A kept stanza: one attribute per line, continuations already folded in
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Stanza {
    text: String,
}

impl Stanza {
    pub fn text(&self) -> &str {
        &self.text
    }
}

/// Counters kept by the assembler for one chunk
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AssemblerStats {
    pub stanzas_kept: u64,
    pub stanzas_discarded: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    OutsideStanza,
    Accumulating,
    /// Inside a stanza whose head precedes this chunk
    Fragment,
}

#[derive(Debug, PartialEq, Eq)]
enum LineKind<'a> {
    Blank,
    Comment,
    Remarks,
    Continuation(&'a str),
    Attribute(Option<&'a str>),
}

fn classify(line: &str) -> LineKind<'_> {
    if line.trim().is_empty() {
        return LineKind::Blank;
    }

    match line.as_bytes()[0] {
        b'%' | b'#' => LineKind::Comment,
        b' ' | b'\t' | b'+' => LineKind::Continuation(line[1..].trim()),
        _ => match attribute_key(line) {
            Some(REMARKS_KEY) => LineKind::Remarks,
            key => LineKind::Attribute(key),
        },
    }
}

/// Key of an attribute line: everything before the first `:`
pub(crate) fn attribute_key(line: &str) -> Option<&str> {
    line.split_once(':').map(|(key, _)| key)
}

/// Per-chunk stanza state machine
#[derive(Debug)]
pub struct StanzaAssembler {
    primary_types: Vec<String>,
    state: State,
    buffer: String,
    /// Set after a `remarks:` line so its continuation lines are dropped too
    in_remarks: bool,
    stats: AssemblerStats,
}

impl StanzaAssembler {
    pub fn new<S: AsRef<str>>(primary_types: &[S]) -> Self {
        Self {
            primary_types: primary_types.iter().map(|t| t.as_ref().to_string()).collect(),
            state: State::OutsideStanza,
            buffer: String::new(),
            in_remarks: false,
            stats: AssemblerStats::default(),
        }
    }

    /// Skip the tail of a stanza opened before the first line fed in.
    ///
    /// Lines are ignored up to the next blank line or primary head.
    pub fn start_mid_stanza(&mut self) {
        self.state = State::Fragment;
        self.buffer.clear();
    }

    pub fn is_accumulating(&self) -> bool {
        self.state == State::Accumulating
    }

    pub fn stats(&self) -> AssemblerStats {
        self.stats
    }

    fn is_primary(&self, key: &str) -> bool {
        self.primary_types.iter().any(|t| t == key)
    }

    /// Whether `line` would start a new stanza (a primary-type head)
    pub fn opens_stanza(&self, line: &str) -> bool {
        matches!(classify(line), LineKind::Attribute(Some(key)) if self.is_primary(key))
    }

    /// Feed one line (without its terminator); returns a stanza when one closes
    pub fn push_line(&mut self, line: &str) -> Option<Stanza> {
        match classify(line) {
            LineKind::Blank => {
                self.in_remarks = false;
                self.terminate()
            },
            LineKind::Comment => None,
            LineKind::Remarks => {
                self.in_remarks = true;
                None
            },
            LineKind::Continuation(value) => {
                if self.is_accumulating() && !self.in_remarks && !value.is_empty() {
                    self.buffer.push(' ');
                    self.buffer.push_str(value);
                }
                None
            },
            LineKind::Attribute(key) => {
                self.in_remarks = false;
                let opens = key.is_some_and(|key| self.is_primary(key));
                if self.state == State::Fragment && !opens {
                    return None;
                }
                let closed = if opens { self.terminate() } else { None };
                if !self.buffer.is_empty() {
                    self.buffer.push('\n');
                }
                self.buffer.push_str(line.trim_end());
                self.state = State::Accumulating;
                closed
            },
        }
    }

    /// Close whatever is open, e.g. at end of input
    pub fn finish(&mut self) -> Option<Stanza> {
        self.in_remarks = false;
        self.terminate()
    }

    fn terminate(&mut self) -> Option<Stanza> {
        let previous = std::mem::replace(&mut self.state, State::OutsideStanza);
        if previous != State::Accumulating {
            return None;
        }

        let text = std::mem::take(&mut self.buffer);
        let keep = text
            .lines()
            .next()
            .and_then(attribute_key)
            .is_some_and(|key| self.is_primary(key));

        if keep {
            self.stats.stanzas_kept += 1;
            Some(Stanza { text })
        } else {
            self.stats.stanzas_discarded += 1;
            None
        }
    }
}

/// Lazy sequence of kept stanzas read from one chunk.
///
/// `limit` is the chunk length in bytes, counted from the reader's current
/// position. Lines starting before the limit are always consumed; lines after
/// it only while the stanza they belong to is still open.
pub struct Stanzas<R> {
    reader: R,
    assembler: StanzaAssembler,
    limit: u64,
    consumed: u64,
    buf: Vec<u8>,
    done: bool,
}

impl<R: BufRead> Stanzas<R> {
    pub fn new(reader: R, limit: u64, assembler: StanzaAssembler) -> Self {
        Self {
            reader,
            assembler,
            limit,
            consumed: 0,
            buf: Vec::with_capacity(256),
            done: false,
        }
    }

    pub fn stats(&self) -> AssemblerStats {
        self.assembler.stats()
    }

    /// Bytes read so far, including look-ahead past the limit
    pub fn bytes_consumed(&self) -> u64 {
        self.consumed
    }

    fn close(&mut self) -> Option<io::Result<Stanza>> {
        self.done = true;
        self.assembler.finish().map(Ok)
    }
}

impl<R: BufRead> Iterator for Stanzas<R> {
    type Item = io::Result<Stanza>;

    fn next(&mut self) -> Option<Self::Item> {
        while !self.done {
            self.buf.clear();
            let n = match self.reader.read_until(b'\n', &mut self.buf) {
                Ok(n) => n,
                Err(e) => {
                    self.done = true;
                    return Some(Err(e));
                },
            };
            if n == 0 {
                return self.close();
            }

            let line_start = self.consumed;
            self.consumed += n as u64;
            let line = decode_line(&self.buf);
            let look_ahead = line_start >= self.limit;

            if look_ahead
                && (!self.assembler.is_accumulating() || self.assembler.opens_stanza(&line))
            {
                return self.close();
            }

            let closed = self.assembler.push_line(&line);
            if look_ahead && !self.assembler.is_accumulating() {
                self.done = true;
            }
            if closed.is_some() {
                return closed.map(Ok);
            }
        }
        None
    }
}

/// Whether the content right before a chunk leaves a stanza open.
///
/// `preceding` ends at the chunk start. Its first line is ignored unless
/// `from_line_start` says it is complete. A stanza is open when the last
/// blank or attribute line is an attribute line; comment, remarks and
/// continuation lines do not decide. An undecided window counts as closed.
pub fn leaves_stanza_open(preceding: &[u8], from_line_start: bool) -> bool {
    let mut body = preceding.strip_suffix(b"\n").unwrap_or(preceding);
    if !from_line_start {
        match body.iter().position(|&b| b == b'\n') {
            Some(first_newline) => body = &body[first_newline + 1..],
            None => return false,
        }
    }

    for raw in body.rsplit(|&b| b == b'\n') {
        match classify(&decode_line(raw)) {
            LineKind::Blank => return false,
            LineKind::Attribute(_) => return true,
            LineKind::Comment | LineKind::Remarks | LineKind::Continuation(_) => {},
        }
    }
    false
}

/// Decode one raw line as ISO-8859-1, dropping the `\n` / `\r\n` terminator
pub(crate) fn decode_line(raw: &[u8]) -> String {
    let raw = raw.strip_suffix(b"\n").unwrap_or(raw);
    let raw = raw.strip_suffix(b"\r").unwrap_or(raw);
    raw.iter().map(|&b| char::from(b)).collect()
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn assemble(input: &str) -> (Vec<String>, AssemblerStats) {
        let mut stanzas = Stanzas::new(
            input.as_bytes(),
            u64::MAX,
            StanzaAssembler::new(DEFAULT_PRIMARY_TYPES),
        );
        let texts = stanzas
            .by_ref()
            .map(|s| s.unwrap().text().to_string())
            .collect();
        (texts, stanzas.stats())
    }

    #[test]
    fn test_classify() {
        assert_eq!(classify(""), LineKind::Blank);
        assert_eq!(classify("   \t"), LineKind::Blank);
        assert_eq!(classify("% RIPE-USER-RESOURCE"), LineKind::Comment);
        assert_eq!(classify("# comment"), LineKind::Comment);
        assert_eq!(classify("remarks: hello"), LineKind::Remarks);
        assert_eq!(classify("   more text"), LineKind::Continuation("more text"));
        assert_eq!(classify("+"), LineKind::Continuation(""));
        assert_eq!(classify("netname: TEST"), LineKind::Attribute(Some("netname")));
        assert_eq!(classify("garbage"), LineKind::Attribute(None));
    }

    #[test]
    fn test_keeps_primary_stanzas_only() {
        let input = "inetnum: 10.0.0.0 - 10.0.0.255\nnetname: TEST\n\n\
                     role: Some Role\nnic-hdl: AB1-RIPE\n\n\
                     inet6num: 2001:db8::/32\n\n";
        let (texts, stats) = assemble(input);

        assert_eq!(
            texts,
            vec![
                "inetnum: 10.0.0.0 - 10.0.0.255\nnetname: TEST",
                "inet6num: 2001:db8::/32"
            ]
        );
        assert_eq!(stats.stanzas_kept, 2);
        assert_eq!(stats.stanzas_discarded, 1);
    }

    #[test]
    fn test_continuation_folds_into_previous_attribute() {
        let input = "inetnum: 10.0.0.0 - 10.0.0.255\ndescr: Example Corp\n        more text\n\n";
        let (texts, _) = assemble(input);
        assert_eq!(texts, vec!["inetnum: 10.0.0.0 - 10.0.0.255\ndescr: Example Corp more text"]);
    }

    #[test]
    fn test_drops_comments_remarks_and_remark_continuations() {
        let input = "inetnum: 10.0.0.0 - 10.0.0.255\n\
                     % a comment inside\n\
                     remarks: first remark\n\
                     \x20       continued remark\n\
                     netname: TEST\n\n";
        let (texts, _) = assemble(input);
        assert_eq!(texts, vec!["inetnum: 10.0.0.0 - 10.0.0.255\nnetname: TEST"]);
    }

    #[test]
    fn test_primary_head_acts_as_boundary() {
        let input = "inetnum: 10.0.0.0 - 10.0.0.255\nnetname: A\ninetnum: 10.0.1.0 - 10.0.1.255\nnetname: B\n";
        let (texts, stats) = assemble(input);
        assert_eq!(texts.len(), 2);
        assert!(texts[1].ends_with("netname: B"));
        assert_eq!(stats.stanzas_kept, 2);
    }

    #[test]
    fn test_emits_last_stanza_without_trailing_blank_line() {
        let (texts, _) = assemble("inetnum: 10.0.0.0 - 10.0.0.255\nnetname: TEST");
        assert_eq!(texts, vec!["inetnum: 10.0.0.0 - 10.0.0.255\nnetname: TEST"]);
    }

    #[test]
    fn test_crlf_line_endings() {
        let (texts, _) = assemble("inetnum: 10.0.0.0 - 10.0.0.255\r\nnetname: TEST\r\n\r\n");
        assert_eq!(texts, vec!["inetnum: 10.0.0.0 - 10.0.0.255\nnetname: TEST"]);
    }

    #[test]
    fn test_leading_partial_stanza_is_discarded() {
        // Starts inside the body of a stanza whose head belongs to an earlier chunk
        let input = "         continuation of a descr\n\
                     country: NL\nmnt-by: EXAMPLE-MNT\n\n\
                     inetnum: 10.0.1.0 - 10.0.1.255\nnetname: SECOND\n\n";
        let (texts, stats) = assemble(input);
        assert_eq!(texts, vec!["inetnum: 10.0.1.0 - 10.0.1.255\nnetname: SECOND"]);
        assert_eq!(stats.stanzas_discarded, 1);
    }

    #[test]
    fn test_mid_stanza_start_skips_tail_without_counting() {
        let input = "         continuation of a descr\n\
                     country: NL\nmnt-by: EXAMPLE-MNT\n\n\
                     role: Ops\nnic-hdl: OPS1-RIPE\n\n\
                     inetnum: 10.0.1.0 - 10.0.1.255\nnetname: SECOND\n\n";
        let mut assembler = StanzaAssembler::new(DEFAULT_PRIMARY_TYPES);
        assembler.start_mid_stanza();
        let mut stanzas = Stanzas::new(input.as_bytes(), u64::MAX, assembler);
        let texts: Vec<_> = stanzas.by_ref().map(|s| s.unwrap().text().to_string()).collect();

        assert_eq!(texts, vec!["inetnum: 10.0.1.0 - 10.0.1.255\nnetname: SECOND"]);
        assert_eq!(stanzas.stats().stanzas_kept, 1);
        // Only the role stanza; the leading tail belongs to an earlier chunk
        assert_eq!(stanzas.stats().stanzas_discarded, 1);
    }

    #[test]
    fn test_mid_stanza_start_ends_at_primary_head() {
        let input = "country: NL\ninetnum: 10.0.1.0 - 10.0.1.255\nnetname: NEXT\n";
        let mut assembler = StanzaAssembler::new(DEFAULT_PRIMARY_TYPES);
        assembler.start_mid_stanza();
        let mut stanzas = Stanzas::new(input.as_bytes(), u64::MAX, assembler);
        let texts: Vec<_> = stanzas.by_ref().map(|s| s.unwrap().text().to_string()).collect();

        assert_eq!(texts, vec!["inetnum: 10.0.1.0 - 10.0.1.255\nnetname: NEXT"]);
        assert_eq!(stanzas.stats().stanzas_discarded, 0);
    }

    #[test]
    fn test_leaves_stanza_open() {
        assert!(!leaves_stanza_open(b"", true));
        assert!(!leaves_stanza_open(b"netname: A\n\n", true));
        assert!(leaves_stanza_open(b"\ninetnum: 10.0.0.0 - 10.0.0.255\n", true));
        assert!(leaves_stanza_open(b"role: Ops\n", true));
        assert!(leaves_stanza_open(b"descr: Corp\n   more\nremarks: x\n% note\n", true));
        assert!(!leaves_stanza_open(b"\n% RIPE-USER-RESOURCE\n", true));
        assert!(!leaves_stanza_open(b"# header\n", true));
    }

    #[test]
    fn test_leaves_stanza_open_ignores_partial_first_line() {
        // "tnum: ..." is the cut-off end of a line and must not decide
        assert!(!leaves_stanza_open(b"tnum: 10.0.0.0\n   more\n", false));
        assert!(leaves_stanza_open(b"tnum: 10.0.0.0\nnetname: A\n", false));
        assert!(!leaves_stanza_open(b"netname: A\n", false));
    }

    #[test]
    fn test_look_ahead_finishes_open_stanza_past_limit() {
        let input = "inetnum: 10.0.0.0 - 10.0.0.255\nnetname: FIRST\n\ninetnum: 10.0.1.0 - 10.0.1.255\nnetname: SECOND\n\ninetnum: 10.0.2.0 - 10.0.2.255\n\n";
        // Limit ends right after the head line of the second stanza
        let limit = input.find("netname: SECOND").unwrap() as u64;
        let stanzas: Vec<_> = Stanzas::new(
            input.as_bytes(),
            limit,
            StanzaAssembler::new(DEFAULT_PRIMARY_TYPES),
        )
        .map(|s| s.unwrap())
        .collect();

        assert_eq!(stanzas.len(), 2);
        assert_eq!(
            stanzas[1].text(),
            "inetnum: 10.0.1.0 - 10.0.1.255\nnetname: SECOND"
        );
    }

    #[test]
    fn test_look_ahead_stops_at_next_head() {
        let input = "inetnum: 10.0.0.0 - 10.0.0.255\nnetname: FIRST\ninetnum: 10.0.1.0 - 10.0.1.255\n\n";
        let limit = input.find("netname").unwrap() as u64;
        let mut stanzas = Stanzas::new(
            input.as_bytes(),
            limit,
            StanzaAssembler::new(DEFAULT_PRIMARY_TYPES),
        );

        let first = stanzas.next().unwrap().unwrap();
        assert_eq!(first.text(), "inetnum: 10.0.0.0 - 10.0.0.255\nnetname: FIRST");
        assert!(stanzas.next().is_none());
        assert!(stanzas.bytes_consumed() < input.len() as u64);
    }

    #[test]
    fn test_latin1_is_decoded() {
        let raw = b"descr: M\xfcnchen\n";
        assert_eq!(decode_line(raw), "descr: M\u{fc}nchen");
    }
}
