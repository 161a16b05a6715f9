//! ipindex ingest
//!
//! Parallel ingestion of regional internet registry WHOIS dumps (RPSL text)
//! into a record store.
//!
//! A dump is split into line-aligned chunks ([`framework::planner`]), each
//! chunk is assembled into stanzas and parsed into
//! [`NetworkRecord`](ipindex_common::types::NetworkRecord)s ([`rpsl`]), and
//! records are written in batches to an idempotent [`LoadSink`]. Record ids are
//! derived from the registry and normalized network, so re-running an
//! ingestion never duplicates records.
//!
//! ```rust,ignore
//! use ipindex_ingest::{IngestConfig, IngestCoordinator, MemoryStore};
//! use ipindex_common::types::Registry;
//!
//! let coordinator = IngestCoordinator::new(MemoryStore::new(), IngestConfig::default());
//! let report = coordinator.run_ingest(path, Registry::Ripe, 8).await?;
//! ```

#![deny(clippy::unwrap_used, clippy::expect_used)]

pub mod common;
pub mod config;
pub mod db;
pub mod error;
pub mod framework;
pub mod rpsl;
pub mod storage;

pub use config::IngestConfig;
pub use error::{ChunkError, IngestError, SinkError};
pub use framework::{IngestCoordinator, IngestReport, LoadSink, SinkConnector};
pub use storage::{MemoryStore, PgConnector};
