//! Load sink interface
//!
//! A sink accepts batches of [`NetworkRecord`]s and inserts them without ever
//! overwriting an existing id. Duplicate ids are not errors: they are reported
//! back as conflicts and the rest of the batch is still written.
//!
//! Each worker task opens its own sink through a [`SinkConnector`], so no
//! connection is shared between concurrent tasks.

use async_trait::async_trait;
use ipindex_common::types::NetworkRecord;
use uuid::Uuid;

use crate::error::SinkError;

/// Result of one bulk write
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WriteOutcome {
    pub inserted: u64,
    /// Ids that were already present (or repeated within the batch)
    pub conflicts: Vec<Uuid>,
}

impl WriteOutcome {
    pub fn merge(&mut self, other: WriteOutcome) {
        self.inserted += other.inserted;
        self.conflicts.extend(other.conflicts);
    }
}

/// Idempotent destination for records
#[async_trait]
pub trait LoadSink: Send {
    /// Insert every record whose id is not yet present.
    ///
    /// Order within the batch does not matter. An `Err` means the batch as a
    /// whole could not be written (connectivity, backend failure).
    async fn bulk_write(&mut self, batch: &[NetworkRecord]) -> Result<WriteOutcome, SinkError>;
}

/// Opens one [`LoadSink`] per worker task
#[async_trait]
pub trait SinkConnector: Send + Sync + 'static {
    type Sink: LoadSink + 'static;

    async fn open_connection(&self) -> Result<Self::Sink, SinkError>;
}
