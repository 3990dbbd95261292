//! Record store.
//!
//! The reconciler reads a record, works on a copy, and writes it back with
//! [`RecordStore::update`]. Updates are optimistic: the stored
//! `resource_version` must match the one that was read.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::debug;

use crate::types::AnalysisRecord;

/// Error type for record store operations
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    #[error("Record not found: {0}")]
    NotFound(String),

    #[error("Conflict updating {id}: expected version {expected}, found {actual}")]
    Conflict {
        id: String,
        expected: u64,
        actual: u64,
    },

    #[error("Record already exists: {0}")]
    AlreadyExists(String),
}

/// Result type for record store operations
pub type StoreResult<T> = Result<T, StoreError>;

/// Shared reference to a record store
pub type SharedRecordStore = Arc<dyn RecordStore>;

#[async_trait]
pub trait RecordStore: Send + Sync {
    async fn get(&self, id: &str) -> StoreResult<Option<AnalysisRecord>>;

    /// Persist `record`, returning it with its new `resource_version`.
    async fn update(&self, record: AnalysisRecord) -> StoreResult<AnalysisRecord>;
}

/// In-process store keyed by record id.
#[derive(Default)]
pub struct InMemoryRecordStore {
    records: RwLock<HashMap<String, AnalysisRecord>>,
}

impl InMemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn shared(self) -> Arc<Self> {
        Arc::new(self)
    }

    /// Create a record. Fails if the id is taken.
    pub async fn insert(&self, mut record: AnalysisRecord) -> StoreResult<AnalysisRecord> {
        let mut records = self.records.write().await;
        if records.contains_key(&record.id) {
            return Err(StoreError::AlreadyExists(record.id));
        }
        record.resource_version = 1;
        records.insert(record.id.clone(), record.clone());
        debug!(record = %record.id, "Record created");
        Ok(record)
    }

    pub async fn delete(&self, id: &str) -> StoreResult<AnalysisRecord> {
        self.records
            .write()
            .await
            .remove(id)
            .ok_or_else(|| StoreError::NotFound(id.to_string()))
    }

    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }
}

#[async_trait]
impl RecordStore for InMemoryRecordStore {
    async fn get(&self, id: &str) -> StoreResult<Option<AnalysisRecord>> {
        Ok(self.records.read().await.get(id).cloned())
    }

    async fn update(&self, mut record: AnalysisRecord) -> StoreResult<AnalysisRecord> {
        let mut records = self.records.write().await;
        let stored = records
            .get_mut(&record.id)
            .ok_or_else(|| StoreError::NotFound(record.id.clone()))?;

        if stored.resource_version != record.resource_version {
            return Err(StoreError::Conflict {
                id: record.id,
                expected: record.resource_version,
                actual: stored.resource_version,
            });
        }

        record.resource_version += 1;
        *stored = record.clone();
        Ok(record)
    }
}
