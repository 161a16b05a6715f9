//! Chunked parallel ingestion framework
//!
//! - [`planner`]: splits a dump into line-aligned byte ranges
//! - [`worker`]: processes one chunk against its own sink connection
//! - [`coordinator`]: runs workers concurrently, retries and aggregates
//! - [`sink`]: the idempotent load sink interface

pub mod coordinator;
pub mod planner;
pub mod sink;
pub mod types;
pub mod worker;

pub use coordinator::{FileReport, IngestCoordinator};
pub use planner::plan_chunks;
pub use sink::{LoadSink, SinkConnector, WriteOutcome};
pub use types::{Chunk, ChunkFailure, ChunkOutcome, IngestReport};
pub use worker::{chunk_stanzas, ChunkWorker};
