//! In-memory record store
//!
//! Backs `--dry-run` ingestion and the tests. Clones share the same map, so a
//! connector handed to the coordinator can still be inspected afterwards.

use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use ipindex_common::types::NetworkRecord;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::error::SinkError;
use crate::framework::sink::{LoadSink, SinkConnector, WriteOutcome};

#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    records: Arc<RwLock<HashMap<Uuid, NetworkRecord>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }

    pub async fn get(&self, id: &Uuid) -> Option<NetworkRecord> {
        self.records.read().await.get(id).cloned()
    }

    pub async fn records(&self) -> Vec<NetworkRecord> {
        self.records.read().await.values().cloned().collect()
    }
}

/// Per-task handle onto a [`MemoryStore`]
#[derive(Debug)]
pub struct MemorySink {
    records: Arc<RwLock<HashMap<Uuid, NetworkRecord>>>,
}

#[async_trait]
impl LoadSink for MemorySink {
    async fn bulk_write(&mut self, batch: &[NetworkRecord]) -> Result<WriteOutcome, SinkError> {
        let mut records = self.records.write().await;
        let mut outcome = WriteOutcome::default();

        for record in batch {
            match records.entry(record.id) {
                Entry::Vacant(slot) => {
                    slot.insert(record.clone());
                    outcome.inserted += 1;
                },
                Entry::Occupied(_) => outcome.conflicts.push(record.id),
            }
        }

        Ok(outcome)
    }
}

#[async_trait]
impl SinkConnector for MemoryStore {
    type Sink = MemorySink;

    async fn open_connection(&self) -> Result<MemorySink, SinkError> {
        Ok(MemorySink {
            records: self.records.clone(),
        })
    }
}
