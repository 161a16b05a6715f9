//! Core types for chunked ingestion

use serde::Serialize;
use uuid::Uuid;

use crate::error::IngestError;

/// A contiguous byte range of a dump, processed by one worker task.
///
/// `start` is always 0 or the first byte of a line. The final chunk of a file
/// runs to end of file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct Chunk {
    pub index: usize,
    pub start: u64,
    pub length: u64,
}

impl Chunk {
    /// Exclusive end offset
    pub fn end(&self) -> u64 {
        self.start + self.length
    }
}

/// Counters from one successfully processed chunk
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ChunkOutcome {
    pub stanzas_kept: u64,
    pub stanzas_discarded: u64,
    pub unparsed_networks: u64,
    pub records_produced: u64,
    pub records_inserted: u64,
    /// Ids the sink already held
    pub conflicts: Vec<Uuid>,
    pub bytes_read: u64,
    pub batches_flushed: u64,
}

/// A chunk that still failed after every retry round
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChunkFailure {
    pub chunk: Chunk,
    pub attempts: u32,
    pub error: String,
}

impl std::fmt::Display for ChunkFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "chunk {} [{}..{}) after {} attempt(s): {}",
            self.chunk.index,
            self.chunk.start,
            self.chunk.end(),
            self.attempts,
            self.error
        )
    }
}

/// Aggregate result of one ingestion run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct IngestReport {
    pub chunks_planned: usize,
    pub chunks_succeeded: usize,
    pub stanzas_kept: u64,
    pub stanzas_discarded: u64,
    pub unparsed_networks: u64,
    pub records_produced: u64,
    pub records_inserted: u64,
    pub conflicts: u64,
    pub failed_chunks: Vec<ChunkFailure>,
}

impl IngestReport {
    pub fn absorb(&mut self, outcome: &ChunkOutcome) {
        self.chunks_succeeded += 1;
        self.stanzas_kept += outcome.stanzas_kept;
        self.stanzas_discarded += outcome.stanzas_discarded;
        self.unparsed_networks += outcome.unparsed_networks;
        self.records_produced += outcome.records_produced;
        self.records_inserted += outcome.records_inserted;
        self.conflicts += outcome.conflicts.len() as u64;
    }

    pub fn merge(&mut self, other: &IngestReport) {
        self.chunks_planned += other.chunks_planned;
        self.chunks_succeeded += other.chunks_succeeded;
        self.stanzas_kept += other.stanzas_kept;
        self.stanzas_discarded += other.stanzas_discarded;
        self.unparsed_networks += other.unparsed_networks;
        self.records_produced += other.records_produced;
        self.records_inserted += other.records_inserted;
        self.conflicts += other.conflicts;
        self.failed_chunks.extend(other.failed_chunks.iter().cloned());
    }

    pub fn is_success(&self) -> bool {
        self.failed_chunks.is_empty()
    }

    /// First chunk that failed hard, if any
    pub fn first_failure(&self) -> Option<&ChunkFailure> {
        self.failed_chunks.iter().min_by_key(|f| f.chunk.index)
    }

    /// Turn a report with failed chunks into an error
    pub fn into_result(self) -> Result<IngestReport, IngestError> {
        if self.is_success() {
            Ok(self)
        } else {
            Err(IngestError::ChunksFailed {
                failures: self.failed_chunks,
            })
        }
    }
}
