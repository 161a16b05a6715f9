//! Chunk worker
//!
//! Processes one chunk end to end: opens its own sink connection and source
//! reader, assembles and parses stanzas, and flushes records in batches.
//!
//! Parsing is synchronous file I/O and runs on the blocking pool. Full batches
//! travel to the async side over a small bounded channel, so the parser stalls
//! while a flush is in flight instead of buffering the whole chunk. If the
//! flush side gives up, the channel closes and the parser stops at its next
//! send. Both the reader and the sink are dropped on every exit path.

use std::io::{self, BufRead};
use std::sync::Arc;

use ipindex_common::types::{NetworkRecord, Registry};
use tokio::sync::mpsc;
use tracing::{debug, info};

use super::sink::{LoadSink, SinkConnector};
use super::types::{Chunk, ChunkOutcome};
use crate::common::decompression::SourceFile;
use crate::config::IngestConfig;
use crate::error::ChunkError;
use crate::rpsl::{leaves_stanza_open, RecordParser, StanzaAssembler, Stanzas};

/// Batches in flight between the parser and the flushing task
const CHANNEL_CAPACITY: usize = 2;

/// Bytes before a chunk inspected to tell whether it starts inside a stanza
const PRECEDING_WINDOW: u64 = 16 * 1024;

/// Parser-side counters, returned when the blocking task ends
#[derive(Debug, Default)]
struct ParseStats {
    stanzas_kept: u64,
    stanzas_discarded: u64,
    unparsed_networks: u64,
    records_produced: u64,
    bytes_read: u64,
}

/// Worker that turns chunks of one dump into stored records
pub struct ChunkWorker<C: SinkConnector> {
    source: SourceFile,
    parser: RecordParser,
    connector: Arc<C>,
    config: Arc<IngestConfig>,
}

impl<C: SinkConnector> ChunkWorker<C> {
    pub fn new(
        source: SourceFile,
        registry: Registry,
        connector: Arc<C>,
        config: Arc<IngestConfig>,
    ) -> Result<Self, regex::Error> {
        Ok(Self {
            source,
            parser: RecordParser::new(registry, config.cidr_mode)?,
            connector,
            config,
        })
    }

    /// Process `chunk`, honouring the configured chunk timeout
    pub async fn run(&self, chunk: Chunk) -> Result<ChunkOutcome, ChunkError> {
        match self.config.chunk_timeout() {
            Some(limit) => tokio::time::timeout(limit, self.process(chunk))
                .await
                .map_err(|_| ChunkError::TimedOut(limit.as_secs()))?,
            None => self.process(chunk).await,
        }
    }

    /// Process `chunk` without a timeout
    pub async fn process(&self, chunk: Chunk) -> Result<ChunkOutcome, ChunkError> {
        debug!(
            chunk = chunk.index,
            start = chunk.start,
            end = chunk.end(),
            "Processing chunk"
        );

        let mut sink = self.connector.open_connection().await?;
        let (tx, mut rx) = mpsc::channel::<Vec<NetworkRecord>>(CHANNEL_CAPACITY);

        let source = self.source.clone();
        let parser = self.parser.clone();
        let primary_types = self.config.primary_types.clone();
        let batch_size = self.config.batch_size;
        let producer = tokio::task::spawn_blocking(move || {
            parse_chunk(&source, chunk, &parser, &primary_types, batch_size, &tx)
        });

        let mut outcome = ChunkOutcome::default();
        let mut flush_error = None;
        while let Some(batch) = rx.recv().await {
            match sink.bulk_write(&batch).await {
                Ok(written) => {
                    outcome.records_inserted += written.inserted;
                    outcome.conflicts.extend(written.conflicts);
                    outcome.batches_flushed += 1;
                },
                Err(e) => {
                    flush_error = Some(e);
                    break;
                },
            }
        }
        // Unblocks a parser waiting on a full channel
        drop(rx);

        let parsed = producer
            .await
            .map_err(|e| ChunkError::Aborted(e.to_string()))?;

        if let Some(e) = flush_error {
            return Err(e.into());
        }
        let stats = parsed?;

        outcome.stanzas_kept = stats.stanzas_kept;
        outcome.stanzas_discarded = stats.stanzas_discarded;
        outcome.unparsed_networks = stats.unparsed_networks;
        outcome.records_produced = stats.records_produced;
        outcome.bytes_read = stats.bytes_read;

        info!(
            chunk = chunk.index,
            kept = outcome.stanzas_kept,
            inserted = outcome.records_inserted,
            conflicts = outcome.conflicts.len(),
            "Chunk complete"
        );

        Ok(outcome)
    }
}

/// Stanzas of `chunk`.
///
/// When the chunk starts inside a stanza, that stanza belongs to the chunk
/// holding its head and is skipped here without being counted.
pub fn chunk_stanzas<S: AsRef<str>>(
    source: &SourceFile,
    chunk: Chunk,
    primary_types: &[S],
) -> io::Result<Stanzas<Box<dyn BufRead + Send>>> {
    let (preceding, reader) = source.open_with_preceding(chunk.start, PRECEDING_WINDOW)?;
    let mut assembler = StanzaAssembler::new(primary_types);
    if leaves_stanza_open(&preceding, chunk.start <= PRECEDING_WINDOW) {
        assembler.start_mid_stanza();
    }
    Ok(Stanzas::new(reader, chunk.length, assembler))
}

/// Blocking half of a chunk: read, assemble, parse and hand off batches
fn parse_chunk(
    source: &SourceFile,
    chunk: Chunk,
    parser: &RecordParser,
    primary_types: &[String],
    batch_size: usize,
    tx: &mpsc::Sender<Vec<NetworkRecord>>,
) -> io::Result<ParseStats> {
    let mut stanzas = chunk_stanzas(source, chunk, primary_types)?;
    let mut stats = ParseStats::default();
    let mut batch = Vec::with_capacity(batch_size);

    for stanza in stanzas.by_ref() {
        let parsed = parser.parse(&stanza?);
        if parsed.unparsed {
            stats.unparsed_networks += 1;
        }
        stats.records_produced += parsed.records.len() as u64;
        batch.extend(parsed.records);

        if batch.len() >= batch_size {
            let full = std::mem::replace(&mut batch, Vec::with_capacity(batch_size));
            if tx.blocking_send(full).is_err() {
                // Flush side stopped; its error is reported instead
                return Ok(stats);
            }
        }
    }

    if !batch.is_empty() {
        // A closed channel here also means the flush side already failed
        let _ = tx.blocking_send(batch);
    }

    let assembled = stanzas.stats();
    stats.stanzas_kept = assembled.stanzas_kept;
    stats.stanzas_discarded = assembled.stanzas_discarded;
    stats.bytes_read = stanzas.bytes_consumed();
    Ok(stats)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::storage::memory::MemoryStore;
    use tempfile::TempDir;

    const DUMP: &str = "inetnum: 10.0.0.0 - 10.0.0.255\nnetname: A\n\n\
                        role: Ops\nnic-hdl: OPS1-RIPE\n\n\
                        inetnum: 10.0.1.0 - 10.0.1.255\nnetname: B\n\n\
                        inet6num: 2001:db8::/32\nnetname: C\n\n";

    fn worker(dir: &TempDir, store: MemoryStore, batch_size: usize) -> ChunkWorker<MemoryStore> {
        let path = dir.path().join("ripe.db");
        std::fs::write(&path, DUMP).unwrap();
        let config = IngestConfig::default().with_batch_size(batch_size);
        ChunkWorker::new(
            SourceFile::new(path),
            Registry::Ripe,
            Arc::new(store),
            Arc::new(config),
        )
        .unwrap()
    }

    fn whole_file() -> Chunk {
        Chunk { index: 0, start: 0, length: DUMP.len() as u64 }
    }

    #[tokio::test]
    async fn test_process_whole_file() {
        let dir = TempDir::new().unwrap();
        let store = MemoryStore::new();
        let outcome = worker(&dir, store.clone(), 5000).process(whole_file()).await.unwrap();

        assert_eq!(outcome.stanzas_kept, 3);
        assert_eq!(outcome.stanzas_discarded, 1);
        assert_eq!(outcome.records_inserted, 3);
        assert_eq!(outcome.batches_flushed, 1);
        assert_eq!(outcome.bytes_read, DUMP.len() as u64);
        assert_eq!(store.len().await, 3);
    }

    #[tokio::test]
    async fn test_small_batches_flush_repeatedly() {
        let dir = TempDir::new().unwrap();
        let store = MemoryStore::new();
        let outcome = worker(&dir, store.clone(), 1).process(whole_file()).await.unwrap();

        assert_eq!(outcome.batches_flushed, 3);
        assert_eq!(store.len().await, 3);
    }

    #[tokio::test]
    async fn test_rerun_reports_conflicts() {
        let dir = TempDir::new().unwrap();
        let store = MemoryStore::new();
        let w = worker(&dir, store.clone(), 2);

        w.process(whole_file()).await.unwrap();
        let second = w.process(whole_file()).await.unwrap();

        assert_eq!(second.records_inserted, 0);
        assert_eq!(second.conflicts.len(), 3);
        assert_eq!(store.len().await, 3);
    }

    #[tokio::test]
    async fn test_chunk_starting_mid_stanza() {
        let dir = TempDir::new().unwrap();
        let store = MemoryStore::new();
        let start = DUMP.find("netname: A").unwrap() as u64;
        let chunk = Chunk { index: 1, start, length: DUMP.len() as u64 - start };

        let outcome = worker(&dir, store.clone(), 5000).process(chunk).await.unwrap();

        assert_eq!(outcome.stanzas_kept, 2);
        assert_eq!(outcome.stanzas_discarded, 1);
        let names: Vec<_> = store
            .records()
            .await
            .into_iter()
            .filter_map(|r| r.name)
            .collect();
        assert!(!names.contains(&"A".to_string()));
        assert!(names.contains(&"B".to_string()));
    }
}
