//! Integration tests for chunked ingestion
//!
//! These run the coordinator end to end against the in-memory store:
//! - worker-count independence
//! - idempotent re-runs
//! - gzip-compressed dumps
//! - failing sinks and chunk retries
//! - whole data directories

use std::collections::HashSet;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use flate2::write::GzEncoder;
use ipindex_common::types::{NetworkRecord, Registry};
use ipindex_ingest::framework::WriteOutcome;
use ipindex_ingest::rpsl::CidrMode;
use ipindex_ingest::storage::MemorySink;
use ipindex_ingest::{
    IngestConfig, IngestCoordinator, IngestError, LoadSink, MemoryStore, SinkConnector, SinkError,
};
use tempfile::TempDir;
use uuid::Uuid;

fn fixture() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures/ripe_sample.db")
}

fn config(workers: usize) -> IngestConfig {
    IngestConfig::default().with_worker_count(workers).with_batch_size(2)
}

async fn ids(store: &MemoryStore) -> HashSet<Uuid> {
    store.records().await.into_iter().map(|r| r.id).collect()
}

fn gzip_copy(src: &Path, dest: &Path) {
    let content = std::fs::read(src).unwrap();
    let mut encoder = GzEncoder::new(
        std::fs::File::create(dest).unwrap(),
        flate2::Compression::default(),
    );
    encoder.write_all(&content).unwrap();
    encoder.finish().unwrap();
}

// ============================================================================
// Parsing through the coordinator
// ============================================================================

#[tokio::test]
async fn test_fixture_records() {
    let store = MemoryStore::new();
    let coordinator = IngestCoordinator::new(store.clone(), config(1));
    let report = coordinator.run_ingest(&fixture(), Registry::Ripe, 1).await.unwrap();

    assert!(report.is_success());
    assert_eq!(report.stanzas_kept, 6);
    assert_eq!(report.stanzas_discarded, 2);
    assert_eq!(report.unparsed_networks, 1);
    assert_eq!(report.records_inserted, 6);

    let test = store
        .get(&NetworkRecord::derive_id(Registry::Ripe, "10.0.0.0/24"))
        .await
        .unwrap();
    assert_eq!(test.name.as_deref(), Some("TEST"));
    assert_eq!(test.description.as_deref(), Some("Example Corp more text"));
    assert_eq!(test.country.as_deref(), Some("NL"));
    assert_eq!(test.maintainer.as_deref(), Some("EXAMPLE-MNT"));
    assert_eq!(test.created.as_deref(), Some("2010-01-01T00:00:00Z"));
    assert_eq!(test.last_modified.as_deref(), Some("2020-01-01T00:00:00Z"));

    let split = store
        .get(&NetworkRecord::derive_id(Registry::Ripe, "10.0.1.0/24"))
        .await
        .unwrap();
    assert_eq!(split.description.as_deref(), Some("Range that needs two blocks"));

    let v6 = store
        .get(&NetworkRecord::derive_id(Registry::Ripe, "2001:db8::/32"))
        .await
        .unwrap();
    assert_eq!(v6.name.as_deref(), Some("DOC-V6"));

    let test_net = store
        .get(&NetworkRecord::derive_id(Registry::Ripe, "192.0.2.0/24"))
        .await
        .unwrap();
    assert_eq!(test_net.description.as_deref(), Some("Documentation Second descr line"));
    assert_eq!(test_net.maintainer.as_deref(), Some("IANA-MNT RIPE-NCC-HM-MNT"));

    let unparsed: Vec<_> = store
        .records()
        .await
        .into_iter()
        .filter(|r| r.network.is_none())
        .collect();
    assert_eq!(unparsed.len(), 1);
    assert_eq!(unparsed[0].name.as_deref(), Some("INVERTED"));
}

#[tokio::test]
async fn test_all_blocks_mode() {
    let store = MemoryStore::new();
    let coordinator = IngestCoordinator::new(
        store.clone(),
        config(2).with_cidr_mode(CidrMode::AllBlocks),
    );
    let report = coordinator.run_ingest(&fixture(), Registry::Ripe, 2).await.unwrap();

    assert_eq!(report.stanzas_kept, 6);
    assert_eq!(report.records_inserted, 7);
    assert!(store
        .get(&NetworkRecord::derive_id(Registry::Ripe, "10.0.2.0/25"))
        .await
        .is_some());
}

// ============================================================================
// Worker count and idempotence
// ============================================================================

#[tokio::test]
async fn test_worker_count_does_not_change_result() {
    let single = MemoryStore::new();
    let report_single = IngestCoordinator::new(single.clone(), config(1))
        .run_ingest(&fixture(), Registry::Ripe, 1)
        .await
        .unwrap();

    for workers in [2, 3, 5, 8, 16] {
        let parallel = MemoryStore::new();
        let report = IngestCoordinator::new(parallel.clone(), config(workers))
            .run_ingest(&fixture(), Registry::Ripe, workers)
            .await
            .unwrap();

        assert_eq!(report.stanzas_kept, report_single.stanzas_kept, "workers={workers}");
        assert_eq!(
            report.stanzas_discarded, report_single.stanzas_discarded,
            "workers={workers}"
        );
        assert_eq!(
            report.unparsed_networks, report_single.unparsed_networks,
            "workers={workers}"
        );
        assert_eq!(ids(&parallel).await, ids(&single).await, "workers={workers}");
    }
}

#[tokio::test]
async fn test_rerun_is_idempotent() {
    let store = MemoryStore::new();
    let coordinator = IngestCoordinator::new(store.clone(), config(4));

    let first = coordinator.run_ingest(&fixture(), Registry::Ripe, 4).await.unwrap();
    let ids_after_first = ids(&store).await;

    let second = coordinator.run_ingest(&fixture(), Registry::Ripe, 4).await.unwrap();

    assert_eq!(second.records_inserted, 0);
    assert_eq!(second.conflicts, first.records_inserted);
    assert_eq!(store.len().await, ids_after_first.len());
    assert_eq!(ids(&store).await, ids_after_first);
}

#[tokio::test]
async fn test_source_tag_separates_records() {
    let store = MemoryStore::new();
    let coordinator = IngestCoordinator::new(store.clone(), config(2));

    coordinator.run_ingest(&fixture(), Registry::Ripe, 2).await.unwrap();
    let report = coordinator.run_ingest(&fixture(), Registry::Apnic, 2).await.unwrap();

    assert_eq!(report.conflicts, 0);
    assert_eq!(store.len().await, 12);
}

// ============================================================================
// Compressed input
// ============================================================================

#[tokio::test]
async fn test_gzip_dump_matches_plain() {
    let dir = TempDir::new().unwrap();
    let gz = dir.path().join("ripe.db.inetnum.gz");
    gzip_copy(&fixture(), &gz);

    let plain = MemoryStore::new();
    IngestCoordinator::new(plain.clone(), config(1))
        .run_ingest(&fixture(), Registry::Ripe, 1)
        .await
        .unwrap();

    let compressed = MemoryStore::new();
    let report = IngestCoordinator::new(compressed.clone(), config(3))
        .run_ingest(&gz, Registry::Ripe, 3)
        .await
        .unwrap();

    assert!(report.is_success());
    assert_eq!(ids(&compressed).await, ids(&plain).await);
}

// ============================================================================
// Failures and retries
// ============================================================================

/// Connector whose first `failures` connection attempts are refused
struct FlakyConnector {
    store: MemoryStore,
    failures: usize,
    attempts: Arc<AtomicUsize>,
}

#[async_trait]
impl SinkConnector for FlakyConnector {
    type Sink = MemorySink;

    async fn open_connection(&self) -> Result<MemorySink, SinkError> {
        let attempt = self.attempts.fetch_add(1, Ordering::SeqCst);
        if attempt < self.failures {
            return Err(SinkError::Connection("connection refused".to_string()));
        }
        self.store.open_connection().await
    }
}

/// Sink that rejects every write
struct BrokenSink;

#[async_trait]
impl LoadSink for BrokenSink {
    async fn bulk_write(&mut self, _batch: &[NetworkRecord]) -> Result<WriteOutcome, SinkError> {
        Err(SinkError::Backend("disk full".to_string()))
    }
}

struct BrokenConnector;

#[async_trait]
impl SinkConnector for BrokenConnector {
    type Sink = BrokenSink;

    async fn open_connection(&self) -> Result<BrokenSink, SinkError> {
        Ok(BrokenSink)
    }
}

/// Sink whose writes never finish in time
struct StalledSink;

#[async_trait]
impl LoadSink for StalledSink {
    async fn bulk_write(&mut self, _batch: &[NetworkRecord]) -> Result<WriteOutcome, SinkError> {
        tokio::time::sleep(Duration::from_secs(30)).await;
        Ok(WriteOutcome::default())
    }
}

struct StalledConnector;

#[async_trait]
impl SinkConnector for StalledConnector {
    type Sink = StalledSink;

    async fn open_connection(&self) -> Result<StalledSink, SinkError> {
        Ok(StalledSink)
    }
}

#[tokio::test]
async fn test_stuck_chunk_times_out() {
    let config = config(1)
        .with_chunk_timeout(Duration::from_secs(1))
        .with_max_chunk_retries(1);
    let report = IngestCoordinator::new(StalledConnector, config)
        .run_ingest(&fixture(), Registry::Ripe, 1)
        .await
        .unwrap();

    assert_eq!(report.chunks_succeeded, 0);
    assert_eq!(report.failed_chunks.len(), 1);
    assert_eq!(report.failed_chunks[0].attempts, 2);
    assert!(report.failed_chunks[0].error.contains("timed out"));
}

#[tokio::test]
async fn test_failed_chunks_are_retried() {
    let store = MemoryStore::new();
    let attempts = Arc::new(AtomicUsize::new(0));
    let connector = FlakyConnector {
        store: store.clone(),
        failures: 2,
        attempts: attempts.clone(),
    };

    let report = IngestCoordinator::new(connector, config(2))
        .run_ingest(&fixture(), Registry::Ripe, 2)
        .await
        .unwrap();

    assert!(report.is_success());
    assert_eq!(report.chunks_succeeded, report.chunks_planned);
    assert!(attempts.load(Ordering::SeqCst) > 2);
    assert_eq!(store.len().await, 6);
}

#[tokio::test]
async fn test_persistent_failure_is_reported() {
    let config = config(1).with_max_chunk_retries(1);
    let report = IngestCoordinator::new(BrokenConnector, config)
        .run_ingest(&fixture(), Registry::Ripe, 1)
        .await
        .unwrap();

    assert!(!report.is_success());
    assert_eq!(report.failed_chunks.len(), report.chunks_planned);
    assert_eq!(report.chunks_succeeded, 0);

    let first = report.first_failure().unwrap();
    assert_eq!(first.chunk.index, 0);
    assert_eq!(first.attempts, 2);
    assert!(first.error.contains("disk full"));

    assert!(matches!(
        report.into_result(),
        Err(IngestError::ChunksFailed { .. })
    ));
}

#[tokio::test]
async fn test_connection_failures_exhaust_retries() {
    let connector = FlakyConnector {
        store: MemoryStore::new(),
        failures: usize::MAX,
        attempts: Arc::new(AtomicUsize::new(0)),
    };
    let report = IngestCoordinator::new(connector, config(1).with_max_chunk_retries(2))
        .run_ingest(&fixture(), Registry::Ripe, 1)
        .await
        .unwrap();

    assert_eq!(report.failed_chunks.len(), 1);
    assert_eq!(report.failed_chunks[0].attempts, 3);
    assert!(report.failed_chunks[0].error.contains("connection refused"));
}

#[tokio::test]
async fn test_missing_file_fails_planning() {
    let dir = TempDir::new().unwrap();
    let result = IngestCoordinator::new(MemoryStore::new(), config(2))
        .run_ingest(&dir.path().join("absent.db"), Registry::Ripe, 2)
        .await;

    assert!(matches!(result, Err(IngestError::Planning { .. })));
}

// ============================================================================
// Data directories
// ============================================================================

#[tokio::test]
async fn test_ingest_directory() {
    let dir = TempDir::new().unwrap();
    gzip_copy(&fixture(), &dir.path().join("ripe.db.inetnum.gz"));
    std::fs::copy(fixture(), dir.path().join("arin.db")).unwrap();

    let store = MemoryStore::new();
    let reports = IngestCoordinator::new(store.clone(), config(2))
        .ingest_directory(dir.path())
        .await
        .unwrap();

    let sources: Vec<_> = reports.iter().map(|r| r.registry).collect();
    assert_eq!(sources, vec![Registry::Ripe, Registry::Arin]);
    assert!(reports.iter().all(|r| r.report.records_inserted == 6));
    assert_eq!(store.len().await, 12);
}
