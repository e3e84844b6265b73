// # IP Record Store Trait
//
// The persistence handle behind the shared-pool IP repo.
//
// ## Purpose
//
// One row per in-use address. The unique `(address, network_name)` index is
// the single source of truth for "is this address taken": repos never trust
// an earlier read across a save and instead let `insert` decide.
//
// ## Implementations
//
// - Memory: process-local map, for tests and embedding
// - File: JSON file with atomic writes and backup recovery

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use ipnetwork::IpNetwork;
use serde::{Deserialize, Serialize};

use crate::reservation::TaskContext;

/// A persisted in-use address
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IpRecord {
    /// Canonical CIDR form (`/32`, `/128`, or the allocated block)
    pub address: IpNetwork,
    pub network_name: String,
    /// Owning instance id
    pub instance_id: String,
    /// Whether the address came from the static pool
    #[serde(rename = "static")]
    pub static_ip: bool,
    /// Task that wrote the record
    pub task_id: String,
    /// Distinguishes several NICs on one network
    pub nic_group: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl IpRecord {
    /// Create a record stamped with the current time
    pub fn new(
        address: IpNetwork,
        network_name: impl Into<String>,
        instance_id: impl Into<String>,
        static_ip: bool,
        task: &TaskContext,
    ) -> Self {
        Self {
            address,
            network_name: network_name.into(),
            instance_id: instance_id.into(),
            static_ip,
            task_id: task.task_id.clone(),
            nic_group: None,
            created_at: Utc::now(),
        }
    }

    pub fn with_nic_group(mut self, nic_group: Option<String>) -> Self {
        self.nic_group = nic_group;
        self
    }

    /// The unique index key
    pub fn key(&self) -> RecordKey {
        RecordKey::new(self.address, &self.network_name)
    }
}

/// Unique index key of a record
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RecordKey {
    pub address: IpNetwork,
    pub network_name: String,
}

impl RecordKey {
    pub fn new(address: IpNetwork, network_name: &str) -> Self {
        Self {
            address,
            network_name: network_name.to_string(),
        }
    }
}

/// Result of an insert against the unique index
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveOutcome {
    /// Row written
    Saved,
    /// A row with the same `(address, network_name)` already exists
    Conflict,
}

/// Trait for IP record store implementations
///
/// All methods must be safe to call concurrently from multiple tasks and,
/// for shared stores, from multiple deployments at once.
///
/// ## Implementation Guidelines
///
/// - **Atomic insert**: the uniqueness check and the write happen as one step
/// - **Async I/O only**: never block the runtime
/// - **No business logic**: allocation decisions belong to the repos
#[async_trait]
pub trait IpRecordStore: Send + Sync {
    /// Insert a record unless its key is taken
    ///
    /// # Returns
    ///
    /// - `Ok(SaveOutcome::Saved)`: Row written
    /// - `Ok(SaveOutcome::Conflict)`: Key already present, nothing written
    /// - `Err(Error)`: Storage error
    async fn insert(&self, record: IpRecord) -> Result<SaveOutcome, crate::Error>;

    /// Look up a record by key
    async fn find(
        &self,
        address: IpNetwork,
        network_name: &str,
    ) -> Result<Option<IpRecord>, crate::Error>;

    /// Replace the metadata of an existing record
    ///
    /// Returns `Ok(false)` when no row has the record's key.
    async fn update(&self, record: &IpRecord) -> Result<bool, crate::Error>;

    /// Delete a record
    ///
    /// Returns `Ok(false)` when it didn't exist.
    async fn delete(&self, address: IpNetwork, network_name: &str) -> Result<bool, crate::Error>;

    /// All records in the store
    async fn list(&self) -> Result<Vec<IpRecord>, crate::Error>;

    /// Persist any pending changes
    async fn flush(&self) -> Result<(), crate::Error>;
}
