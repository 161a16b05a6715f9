//! Ingestion coordinator
//!
//! Plans a dump into chunks, runs one worker task per chunk with bounded
//! concurrency, retries chunks that failed and aggregates the outcome into an
//! [`IngestReport`]. Chunks are independent, so one failing chunk never stops
//! the others.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use futures::stream::{self, StreamExt};
use indicatif::ProgressBar;
use ipindex_common::types::Registry;
use tracing::{info, warn};

use super::planner::plan_chunks;
use super::sink::SinkConnector;
use super::types::{Chunk, ChunkFailure, IngestReport};
use super::worker::ChunkWorker;
use crate::common::decompression::SourceFile;
use crate::config::IngestConfig;
use crate::error::IngestError;

/// Report for one file of a data directory
#[derive(Debug)]
pub struct FileReport {
    pub registry: Registry,
    pub path: PathBuf,
    pub report: IngestReport,
}

/// Drives chunk workers over whole dump files
pub struct IngestCoordinator<C: SinkConnector> {
    connector: Arc<C>,
    config: Arc<IngestConfig>,
    progress: Option<ProgressBar>,
}

impl<C: SinkConnector> IngestCoordinator<C> {
    pub fn new(connector: C, config: IngestConfig) -> Self {
        Self {
            connector: Arc::new(connector),
            config: Arc::new(config),
            progress: None,
        }
    }

    /// Advance `progress` by one for every chunk that finishes
    pub fn with_progress(mut self, progress: ProgressBar) -> Self {
        self.progress = Some(progress);
        self
    }

    pub fn config(&self) -> &IngestConfig {
        &self.config
    }

    /// Markers that never start a chunk of a `registry` dump
    fn markers_for(&self, registry: Registry) -> Vec<String> {
        registry
            .trailer_markers()
            .iter()
            .map(|m| m.to_string())
            .chain(self.config.extra_trailer_markers.iter().cloned())
            .collect()
    }

    /// Plan the chunks of `path` without processing them
    pub async fn plan(
        &self,
        path: &Path,
        registry: Registry,
        worker_count: usize,
    ) -> Result<Vec<Chunk>, IngestError> {
        let source = SourceFile::new(path);
        let markers = self.markers_for(registry);

        tokio::task::spawn_blocking(move || plan_chunks(&source, worker_count, &markers))
            .await
            .map_err(|e| IngestError::Planning {
                path: path.to_path_buf(),
                source: std::io::Error::other(e.to_string()),
            })?
    }

    /// Ingest one dump file with up to `worker_count` concurrent chunks.
    ///
    /// Returns `Err` only when the file cannot be planned. Chunks that still
    /// fail after all retry rounds are listed in the report; use
    /// [`IngestReport::into_result`] to treat them as a hard failure.
    pub async fn run_ingest(
        &self,
        path: &Path,
        registry: Registry,
        worker_count: usize,
    ) -> Result<IngestReport, IngestError> {
        let started = Instant::now();
        let chunks = self.plan(path, registry, worker_count).await?;
        let worker = Arc::new(ChunkWorker::new(
            SourceFile::new(path),
            registry,
            self.connector.clone(),
            self.config.clone(),
        )?);
        let concurrency = worker_count.max(1);

        info!(
            path = %path.display(),
            source = %registry,
            chunks = chunks.len(),
            concurrency,
            "Starting ingestion"
        );

        if let Some(progress) = &self.progress {
            progress.set_length(chunks.len() as u64);
            progress.set_position(0);
        }

        let mut report = IngestReport {
            chunks_planned: chunks.len(),
            ..Default::default()
        };
        let mut attempts: HashMap<usize, u32> = HashMap::new();
        let mut pending = chunks;
        let mut round = 0;

        loop {
            let results: Vec<_> = stream::iter(pending)
                .map(|chunk| {
                    let worker = worker.clone();
                    async move { (chunk, worker.run(chunk).await) }
                })
                .buffer_unordered(concurrency)
                .collect()
                .await;

            let mut failed = Vec::new();
            for (chunk, result) in results {
                *attempts.entry(chunk.index).or_insert(0) += 1;
                match result {
                    Ok(outcome) => {
                        report.absorb(&outcome);
                        if let Some(progress) = &self.progress {
                            progress.inc(1);
                        }
                    },
                    Err(e) => {
                        warn!(
                            chunk = chunk.index,
                            start = chunk.start,
                            end = chunk.end(),
                            round,
                            error = %e,
                            "Chunk failed"
                        );
                        failed.push((chunk, e));
                    },
                }
            }

            if failed.is_empty() {
                break;
            }
            if round >= self.config.max_chunk_retries {
                for (chunk, e) in failed {
                    if let Some(progress) = &self.progress {
                        progress.inc(1);
                    }
                    report.failed_chunks.push(ChunkFailure {
                        chunk,
                        attempts: attempts.get(&chunk.index).copied().unwrap_or(0),
                        error: e.to_string(),
                    });
                }
                break;
            }

            round += 1;
            info!(round, retrying = failed.len(), "Retrying failed chunks");
            pending = failed.into_iter().map(|(chunk, _)| chunk).collect();
        }

        report.failed_chunks.sort_by_key(|f| f.chunk.index);

        info!(
            path = %path.display(),
            source = %registry,
            kept = report.stanzas_kept,
            inserted = report.records_inserted,
            conflicts = report.conflicts,
            failed_chunks = report.failed_chunks.len(),
            elapsed_secs = started.elapsed().as_secs_f64(),
            "Ingestion finished"
        );

        Ok(report)
    }

    /// Ingest every known dump file found in `dir`.
    ///
    /// Files are taken from each registry's catalogue; missing files are
    /// skipped with a warning. Files are processed one after another, each
    /// with the configured worker count.
    pub async fn ingest_directory(&self, dir: &Path) -> Result<Vec<FileReport>, IngestError> {
        let mut reports = Vec::new();

        for registry in Registry::ALL {
            for file_name in registry.dump_files() {
                let path = dir.join(file_name);
                if !path.is_file() {
                    warn!(path = %path.display(), source = %registry, "Dump file not found, skipping");
                    continue;
                }

                let report = match self.run_ingest(&path, registry, self.config.worker_count).await {
                    Ok(report) => report,
                    Err(IngestError::EmptyFile(path)) => {
                        warn!(path = %path.display(), source = %registry, "Dump file is empty, skipping");
                        continue;
                    },
                    Err(e) => return Err(e),
                };
                reports.push(FileReport {
                    registry,
                    path,
                    report,
                });
            }
        }

        Ok(reports)
    }
}
