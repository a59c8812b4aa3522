// # Memory Record Store
//
// In-memory implementation of RecordStore.
//
// ## Purpose
//
// Provides a store that doesn't persist across restarts. Useful for tests
// and for embedding the rotator where the caller keeps records itself.
//
// ## Crash Behavior
//
// - All records are lost when the process exits
// - A rotation made with this store cannot be cleaned by a later process

use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::Error;
use crate::ranges::ServiceRangeSet;
use crate::traits::record_store::{RecordStore, RotationRecord};

/// In-memory record store implementation
///
/// Clones share the same records.
#[derive(Debug, Clone, Default)]
pub struct MemoryRecordStore {
    inner: Arc<RwLock<Vec<RotationRecord>>>,
}

impl MemoryRecordStore {
    /// Create a new empty memory record store
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the number of records in the store
    pub async fn len(&self) -> usize {
        self.inner.read().await.len()
    }

    /// Check if the store is empty
    pub async fn is_empty(&self) -> bool {
        self.inner.read().await.is_empty()
    }
}

#[async_trait]
impl RecordStore for MemoryRecordStore {
    async fn find(&self, ranges: &ServiceRangeSet) -> Result<Option<RotationRecord>, Error> {
        let guard = self.inner.read().await;
        Ok(guard.iter().find(|record| &record.ranges == ranges).cloned())
    }

    async fn save(&self, record: &RotationRecord) -> Result<(), Error> {
        let mut guard = self.inner.write().await;
        guard.retain(|existing| existing.ranges != record.ranges);
        guard.push(record.clone());
        Ok(())
    }

    async fn remove(&self, ranges: &ServiceRangeSet) -> Result<bool, Error> {
        let mut guard = self.inner.write().await;
        let before = guard.len();
        guard.retain(|existing| &existing.ranges != ranges);
        Ok(guard.len() != before)
    }

    async fn list_all(&self) -> Result<Vec<RotationRecord>, Error> {
        Ok(self.inner.read().await.clone())
    }
}
