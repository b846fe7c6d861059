//! Document record access.
//!
//! The pipeline only needs three operations from its document store: create,
//! read by id, and a conditional update guarded by the expected current
//! status. The conditional update is what keeps a single writer per status
//! value; stages never write without it.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::document::{DocumentId, DocumentRecord, RecordUpdate, Status};
use crate::{DocifyError, Result};

/// Storage for document records.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Inserts a new record. Fails if the id already exists.
    async fn create(&self, record: DocumentRecord) -> Result<()>;

    /// Reads a record by id.
    async fn get(&self, id: &DocumentId) -> Result<Option<DocumentRecord>>;

    /// Applies `update` only if the record's current status equals `expected`.
    ///
    /// Returns `Ok(false)` when the precondition does not hold (the record is
    /// left untouched) and an error when the record is missing or the update
    /// would move the status backwards.
    async fn update_if(&self, id: &DocumentId, expected: Status, update: RecordUpdate) -> Result<bool>;
}

/// In-process [`DocumentStore`] backed by a `HashMap`.
#[derive(Debug, Default)]
pub struct MemoryDocumentStore {
    records: RwLock<HashMap<DocumentId, DocumentRecord>>,
}

impl MemoryDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored records.
    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }

    /// Removes a record, as an external retention policy would.
    pub async fn remove(&self, id: &DocumentId) -> Option<DocumentRecord> {
        self.records.write().await.remove(id)
    }
}

#[async_trait]
impl DocumentStore for MemoryDocumentStore {
    async fn create(&self, record: DocumentRecord) -> Result<()> {
        let mut records = self.records.write().await;
        if records.contains_key(&record.id) {
            return Err(DocifyError::Store(format!("document {} already exists", record.id)));
        }
        records.insert(record.id.clone(), record);
        Ok(())
    }

    async fn get(&self, id: &DocumentId) -> Result<Option<DocumentRecord>> {
        Ok(self.records.read().await.get(id).cloned())
    }

    async fn update_if(&self, id: &DocumentId, expected: Status, update: RecordUpdate) -> Result<bool> {
        let mut records = self.records.write().await;
        let record = records.get_mut(id).ok_or_else(|| DocifyError::DocumentNotFound(id.clone()))?;

        if record.status != expected {
            return Ok(false);
        }
        if !record.status.can_advance_to(update.status) {
            return Err(DocifyError::InvalidTransition { from: record.status, to: update.status });
        }

        record.apply(update);
        Ok(true)
    }
}
