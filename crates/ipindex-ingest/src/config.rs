//! Ingestion configuration
//!
//! Runtime knobs for a dump ingestion run, loaded from `INGEST_*` environment
//! variables with defaults.

use ipindex_common::{IpIndexError, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::rpsl::{CidrMode, DEFAULT_PRIMARY_TYPES};

/// Main ingestion configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestConfig {
    /// Number of chunks (and concurrent worker tasks) per file
    pub worker_count: usize,
    /// Records buffered per worker before a bulk write
    pub batch_size: usize,
    /// Extra rounds for chunks that failed
    pub max_chunk_retries: u32,
    /// Per-chunk timeout; `None` waits indefinitely
    pub chunk_timeout_secs: Option<u64>,
    /// Records emitted for IPv4 ranges needing several CIDR blocks
    pub cidr_mode: CidrMode,
    /// Stanza head keys that are kept
    pub primary_types: Vec<String>,
    /// Marker lines, besides the registry's own, that never start a chunk
    pub extra_trailer_markers: Vec<String>,
}

fn default_worker_count() -> usize {
    4
}

fn default_batch_size() -> usize {
    5000
}

fn default_max_chunk_retries() -> u32 {
    3
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            worker_count: default_worker_count(),
            batch_size: default_batch_size(),
            max_chunk_retries: default_max_chunk_retries(),
            chunk_timeout_secs: None,
            cidr_mode: CidrMode::default(),
            primary_types: DEFAULT_PRIMARY_TYPES.iter().map(|t| t.to_string()).collect(),
            extra_trailer_markers: Vec::new(),
        }
    }
}

fn parse_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

impl IngestConfig {
    /// Load ingestion configuration from environment variables
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();

        let cidr_mode = match std::env::var("INGEST_CIDR_MODE") {
            Ok(mode) => mode
                .parse()
                .map_err(|e: String| IpIndexError::config(format!("INGEST_CIDR_MODE: {e}")))?,
            Err(_) => defaults.cidr_mode,
        };

        let config = Self {
            worker_count: std::env::var("INGEST_WORKERS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.worker_count),
            batch_size: std::env::var("INGEST_BATCH_SIZE")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.batch_size),
            max_chunk_retries: std::env::var("INGEST_MAX_CHUNK_RETRIES")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.max_chunk_retries),
            chunk_timeout_secs: std::env::var("INGEST_CHUNK_TIMEOUT_SECS")
                .ok()
                .and_then(|s| s.parse().ok()),
            cidr_mode,
            primary_types: std::env::var("INGEST_PRIMARY_TYPES")
                .map(|s| parse_list(&s))
                .unwrap_or(defaults.primary_types),
            extra_trailer_markers: std::env::var("INGEST_TRAILER_MARKERS")
                .map(|s| parse_list(&s))
                .unwrap_or_default(),
        };

        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.worker_count == 0 {
            return Err(IpIndexError::config("INGEST_WORKERS must be greater than 0"));
        }
        if self.batch_size == 0 {
            return Err(IpIndexError::config("INGEST_BATCH_SIZE must be greater than 0"));
        }
        if self.chunk_timeout_secs == Some(0) {
            return Err(IpIndexError::config(
                "INGEST_CHUNK_TIMEOUT_SECS must be greater than 0",
            ));
        }
        if self.primary_types.is_empty() {
            return Err(IpIndexError::config("INGEST_PRIMARY_TYPES cannot be empty"));
        }
        Ok(())
    }

    pub fn chunk_timeout(&self) -> Option<Duration> {
        self.chunk_timeout_secs.map(Duration::from_secs)
    }

    pub fn with_worker_count(mut self, worker_count: usize) -> Self {
        self.worker_count = worker_count;
        self
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    pub fn with_cidr_mode(mut self, cidr_mode: CidrMode) -> Self {
        self.cidr_mode = cidr_mode;
        self
    }

    pub fn with_chunk_timeout(mut self, timeout: Duration) -> Self {
        self.chunk_timeout_secs = Some(timeout.as_secs().max(1));
        self
    }

    pub fn with_max_chunk_retries(mut self, retries: u32) -> Self {
        self.max_chunk_retries = retries;
        self
    }
}
