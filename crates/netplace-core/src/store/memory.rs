// # Memory Record Store
//
// In-memory implementation of IpRecordStore.
//
// ## Purpose
//
// A shared store that lives as long as the process. Several repos (one per
// deployment) can hold clones of the same store and race on it exactly as
// they would on a database, which makes it the store used by the
// concurrency tests and by embedders without a database.
//
// ## Crash Behavior
//
// - All records are lost on restart
// - Not suitable when several director processes share one address pool

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use ipnetwork::IpNetwork;
use tokio::sync::RwLock;

use crate::Error;
use crate::traits::record_store::{IpRecord, IpRecordStore, RecordKey, SaveOutcome};

/// In-memory record store
///
/// Records live in a HashMap keyed by the unique index and protected by a
/// RwLock; `insert` checks and writes under one write lock.
///
/// # Example
///
/// ```rust
/// use netplace_core::reservation::TaskContext;
/// use netplace_core::store::MemoryRecordStore;
/// use netplace_core::traits::{IpRecord, IpRecordStore, SaveOutcome};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let store = MemoryRecordStore::new();
///     let task = TaskContext::new("task-1");
///     let record = IpRecord::new("10.0.0.2/32".parse()?, "private", "vm-1", false, &task);
///
///     assert_eq!(store.insert(record.clone()).await?, SaveOutcome::Saved);
///     assert_eq!(store.insert(record).await?, SaveOutcome::Conflict);
///     Ok(())
/// }
/// ```
#[derive(Debug, Clone, Default)]
pub struct MemoryRecordStore {
    inner: Arc<RwLock<HashMap<RecordKey, IpRecord>>>,
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
impl IpRecordStore for MemoryRecordStore {
    async fn insert(&self, record: IpRecord) -> Result<SaveOutcome, Error> {
        let mut guard = self.inner.write().await;
        let key = record.key();
        if guard.contains_key(&key) {
            return Ok(SaveOutcome::Conflict);
        }
        guard.insert(key, record);
        Ok(SaveOutcome::Saved)
    }

    async fn find(&self, address: IpNetwork, network_name: &str) -> Result<Option<IpRecord>, Error> {
        let guard = self.inner.read().await;
        Ok(guard.get(&RecordKey::new(address, network_name)).cloned())
    }

    async fn update(&self, record: &IpRecord) -> Result<bool, Error> {
        let mut guard = self.inner.write().await;
        match guard.get_mut(&record.key()) {
            Some(existing) => {
                *existing = record.clone();
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn delete(&self, address: IpNetwork, network_name: &str) -> Result<bool, Error> {
        let mut guard = self.inner.write().await;
        Ok(guard.remove(&RecordKey::new(address, network_name)).is_some())
    }

    async fn list(&self) -> Result<Vec<IpRecord>, Error> {
        let guard = self.inner.read().await;
        Ok(guard.values().cloned().collect())
    }

    async fn flush(&self) -> Result<(), Error> {
        // Nothing buffered
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reservation::TaskContext;

    fn record(address: &str, network: &str, instance: &str) -> IpRecord {
        IpRecord::new(
            address.parse().unwrap(),
            network,
            instance,
            false,
            &TaskContext::new("task-1"),
        )
    }

    #[tokio::test]
    async fn test_memory_store_unique_index() {
        let store = MemoryRecordStore::new();
        assert!(store.is_empty().await);

        let outcome = store.insert(record("10.0.0.2/32", "a", "vm-1")).await.unwrap();
        assert_eq!(outcome, SaveOutcome::Saved);

        // Same address on another network is a different key
        let outcome = store.insert(record("10.0.0.2/32", "b", "vm-2")).await.unwrap();
        assert_eq!(outcome, SaveOutcome::Saved);

        let outcome = store.insert(record("10.0.0.2/32", "a", "vm-3")).await.unwrap();
        assert_eq!(outcome, SaveOutcome::Conflict);

        let kept = store
            .find("10.0.0.2/32".parse().unwrap(), "a")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(kept.instance_id, "vm-1");
        assert_eq!(store.len().await, 2);
    }

    #[tokio::test]
    async fn test_memory_store_update_and_delete() {
        let store = MemoryRecordStore::new();
        let mut rec = record("10.0.0.2/32", "a", "vm-1");
        store.insert(rec.clone()).await.unwrap();

        rec.static_ip = true;
        assert!(store.update(&rec).await.unwrap());
        let found = store.find(rec.address, "a").await.unwrap().unwrap();
        assert!(found.static_ip);

        assert!(store.delete(rec.address, "a").await.unwrap());
        assert!(!store.delete(rec.address, "a").await.unwrap());
        assert!(!store.update(&rec).await.unwrap());
    }

    #[tokio::test]
    async fn test_clones_share_records() {
        let store = MemoryRecordStore::new();
        let other = store.clone();
        store.insert(record("10.0.0.2/32", "a", "vm-1")).await.unwrap();
        assert_eq!(other.list().await.unwrap().len(), 1);
    }
}
