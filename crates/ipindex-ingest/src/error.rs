//! Error types for dump ingestion

use std::path::PathBuf;
use thiserror::Error;

use crate::framework::types::ChunkFailure;

/// Failure reported by a load sink
#[derive(Error, Debug)]
pub enum SinkError {
    /// The store could not be reached or a connection could not be obtained
    #[error("Store connection failed: {0}")]
    Connection(String),

    /// A bulk write was rejected for a reason other than duplicate ids
    #[error("Bulk write failed: {0}")]
    Backend(String),
}

impl From<sqlx::Error> for SinkError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::Io(_)
            | sqlx::Error::Tls(_)
            | sqlx::Error::PoolTimedOut
            | sqlx::Error::PoolClosed
            | sqlx::Error::WorkerCrashed => SinkError::Connection(err.to_string()),
            other => SinkError::Backend(other.to_string()),
        }
    }
}

/// Why a single chunk did not complete
#[derive(Error, Debug)]
pub enum ChunkError {
    #[error(transparent)]
    Sink(#[from] SinkError),

    #[error("Failed to read chunk: {0}")]
    Read(#[from] std::io::Error),

    #[error("Chunk timed out after {0}s")]
    TimedOut(u64),

    #[error("Chunk parser task aborted: {0}")]
    Aborted(String),
}

/// Errors surfaced by a whole ingestion run
#[derive(Error, Debug)]
pub enum IngestError {
    #[error("Worker count must be at least 1")]
    InvalidWorkerCount,

    #[error("Dump file is empty: {0}")]
    EmptyFile(PathBuf),

    #[error("Failed to plan chunks for {path}: {source}")]
    Planning {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid parser configuration: {0}")]
    Parser(#[from] regex::Error),

    #[error("{} chunk(s) failed after retries", .failures.len())]
    ChunksFailed { failures: Vec<ChunkFailure> },
}
