//! Chunk planning
//!
//! Splits a dump into at most `worker_count` byte ranges that start on line
//! boundaries. Candidate cut points are spaced evenly; each one is pushed
//! forward to the next full line, then past any registry trailer marker lines.
//! Stanza boundaries are not respected here, the assembler's head check and
//! look-ahead take care of stanzas split across chunks.
//!
//! Candidates are visited in ascending order over a single forward reader, so
//! a gzip dump is decompressed once for its length and once for the cuts.

use tracing::debug;

use super::types::Chunk;
use crate::common::decompression::{ForwardReader, SourceFile};
use crate::error::IngestError;

/// Plan the chunks of `source`.
///
/// Chunks are returned in file order, are pairwise disjoint and together
/// cover the whole file. Fewer than `worker_count` chunks come back when
/// several cut points collapse onto the same line.
pub fn plan_chunks<S: AsRef<str>>(
    source: &SourceFile,
    worker_count: usize,
    markers: &[S],
) -> Result<Vec<Chunk>, IngestError> {
    if worker_count == 0 {
        return Err(IngestError::InvalidWorkerCount);
    }

    let planning_error = |source_err: std::io::Error| IngestError::Planning {
        path: source.path().to_path_buf(),
        source: source_err,
    };

    let size = source.len().map_err(planning_error)?;
    if size == 0 {
        return Err(IngestError::EmptyFile(source.path().to_path_buf()));
    }

    let mut starts: Vec<u64> = vec![0];
    if worker_count > 1 {
        let mut reader = source.open_forward().map_err(planning_error)?;
        for i in 1..worker_count {
            let candidate = (i as u128 * size as u128 / worker_count as u128) as u64;
            let last = starts.last().copied().unwrap_or(0);
            if candidate <= last {
                continue;
            }
            match next_line_start(&mut reader, candidate, markers).map_err(planning_error)? {
                Some(boundary) if boundary > last && boundary < size => starts.push(boundary),
                Some(_) => {},
                None => break,
            }
        }
    }

    let chunks: Vec<Chunk> = starts
        .iter()
        .enumerate()
        .map(|(index, &start)| {
            let end = starts.get(index + 1).copied().unwrap_or(size);
            Chunk {
                index,
                start,
                length: end - start,
            }
        })
        .collect();

    debug!(
        path = %source.path().display(),
        size,
        requested = worker_count,
        planned = chunks.len(),
        "Planned chunks"
    );

    Ok(chunks)
}

/// First line start at or after `offset` that is not a trailer marker line.
///
/// `offset` must be past every offset visited before on `reader`. Returns
/// `None` when the file ends before such a line.
fn next_line_start<S: AsRef<str>>(
    reader: &mut ForwardReader,
    offset: u64,
    markers: &[S],
) -> std::io::Result<Option<u64>> {
    let mut line = Vec::new();

    let mut boundary = if offset - 1 < reader.position() {
        // The cut falls into the line read last, which ended on a newline
        reader.position()
    } else {
        // Reading from the byte before `offset` consumes the rest of the line the
        // cut falls into; when that byte is a newline, `offset` is already a line start.
        reader.skip_to(offset - 1)?;
        let n = reader.read_line(&mut line)?;
        if n == 0 || line.last() != Some(&b'\n') {
            return Ok(None);
        }
        reader.position()
    };

    loop {
        line.clear();
        let n = reader.read_line(&mut line)?;
        if n == 0 {
            return Ok(None);
        }
        if !is_marker_line(&line, markers) {
            return Ok(Some(boundary));
        }
        boundary += n as u64;
    }
}

fn is_marker_line<S: AsRef<str>>(line: &[u8], markers: &[S]) -> bool {
    markers.iter().any(|marker| {
        let marker = marker.as_ref().as_bytes();
        !marker.is_empty() && line.windows(marker.len()).any(|w| w == marker)
    })
}
