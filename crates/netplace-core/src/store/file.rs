// # File Record Store
//
// File-based implementation of IpRecordStore.
//
// ## Purpose
//
// Keeps the in-use address table across director restarts so a redeploy
// sees the addresses earlier runs handed out.
//
// ## Crash Recovery
//
// - Atomic writes: every mutation writes a temp file, then renames it
// - Backup: the previous good file is kept as `.backup`
// - Corruption detection: JSON validation on load, falling back to backup
//
// ## Sharing
//
// The file is read once when the store opens; after that the in-memory map
// is authoritative and every write replaces the whole file. The unique
// index therefore only holds within one process. Two processes pointed at
// the same file overwrite each other's rows.
//
// ## File Format
//
// ```json
// {
//   "version": "1.0",
//   "records": [
//     {
//       "address": "10.0.0.2/32",
//       "network_name": "private",
//       "instance_id": "vm-1",
//       "static": false,
//       "task_id": "42",
//       "nic_group": null,
//       "created_at": "2026-01-09T12:00:00Z"
//     }
//   ]
// }
// ```

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use ipnetwork::IpNetwork;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::sync::RwLock;

use crate::Error;
use crate::traits::record_store::{IpRecord, IpRecordStore, RecordKey, SaveOutcome};

/// Record file format version
const RECORD_FILE_VERSION: &str = "1.0";

/// File-based record store with crash recovery
///
/// Every mutation is written through before the call returns, under the
/// same lock that guards the in-memory index, so the unique-index check
/// and the durable write form one step.
///
/// # Example
///
/// ```rust,no_run
/// use netplace_core::store::FileRecordStore;
/// use netplace_core::traits::IpRecordStore;
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let store = FileRecordStore::new("/var/lib/netplace/ips.json").await?;
///     println!("{} addresses in use", store.list().await?.len());
///     Ok(())
/// }
/// ```
#[derive(Debug)]
pub struct FileRecordStore {
    path: PathBuf,
    records: Arc<RwLock<HashMap<RecordKey, IpRecord>>>,
}

/// Serializable record file format
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
struct RecordFileFormat {
    version: String,
    records: Vec<IpRecord>,
}

impl FileRecordStore {
    /// Create or load a file record store
    ///
    /// Creates parent directories as needed. A corrupt file is replaced by
    /// its backup when one parses; otherwise the store starts empty.
    pub async fn new<P: AsRef<Path>>(path: P) -> Result<Self, Error> {
        let path = path.as_ref().to_path_buf();

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                fs::create_dir_all(parent).await.map_err(|e| {
                    Error::config(format!(
                        "Failed to create record directory {}: {}",
                        parent.display(),
                        e
                    ))
                })?;
            }
        }

        let records = Self::load_with_recovery(&path)
            .await?
            .into_iter()
            .map(|record| (record.key(), record))
            .collect();

        Ok(Self {
            path,
            records: Arc::new(RwLock::new(records)),
        })
    }

    async fn load_with_recovery(path: &Path) -> Result<Vec<IpRecord>, Error> {
        match Self::load(path).await {
            Ok(records) => {
                tracing::debug!(records = records.len(), "Loaded IP records from {}", path.display());
                Ok(records)
            }
            Err(Error::Json(e)) => {
                tracing::warn!(
                    "Record file {} appears corrupted: {}. Attempting recovery from backup.",
                    path.display(),
                    e
                );

                let backup_path = Self::backup_path(path);
                if !backup_path.exists() {
                    tracing::warn!("No backup file found. Starting with empty record table.");
                    return Ok(Vec::new());
                }

                match Self::load(&backup_path).await {
                    Ok(records) => {
                        tracing::info!(records = records.len(), "Recovered IP records from backup");
                        if let Err(restore_err) = fs::copy(&backup_path, path).await {
                            tracing::error!(
                                "Failed to restore record file from backup: {}",
                                restore_err
                            );
                        }
                        Ok(records)
                    }
                    Err(backup_err) => {
                        tracing::error!(
                            "Backup also unreadable: {}. Starting with empty record table.",
                            backup_err
                        );
                        Ok(Vec::new())
                    }
                }
            }
            Err(e) => Err(e),
        }
    }

    async fn load(path: &Path) -> Result<Vec<IpRecord>, Error> {
        if !path.exists() {
            tracing::debug!("Record file does not exist: {}", path.display());
            return Ok(Vec::new());
        }

        let content = fs::read_to_string(path).await.map_err(|e| {
            Error::record_store(format!(
                "Failed to read record file {}: {}",
                path.display(),
                e
            ))
        })?;

        let file: RecordFileFormat = serde_json::from_str(&content)?;
        if file.version != RECORD_FILE_VERSION {
            tracing::warn!(
                "Record file version mismatch: expected {}, got {}. Attempting to load anyway.",
                RECORD_FILE_VERSION,
                file.version
            );
        }

        Ok(file.records)
    }

    /// Write the table atomically. Callers hold the write lock.
    async fn write(&self, records: &HashMap<RecordKey, IpRecord>) -> Result<(), Error> {
        let mut rows: Vec<IpRecord> = records.values().cloned().collect();
        rows.sort_by(|a, b| {
            (a.network_name.as_str(), a.address.to_string())
                .cmp(&(b.network_name.as_str(), b.address.to_string()))
        });

        let json = serde_json::to_string_pretty(&RecordFileFormat {
            version: RECORD_FILE_VERSION.to_string(),
            records: rows,
        })?;

        let temp_path = self.temp_path();
        {
            let mut file = fs::File::create(&temp_path).await.map_err(|e| {
                Error::record_store(format!(
                    "Failed to create temp file {}: {}",
                    temp_path.display(),
                    e
                ))
            })?;
            file.write_all(json.as_bytes()).await.map_err(|e| {
                Error::record_store(format!(
                    "Failed to write temp file {}: {}",
                    temp_path.display(),
                    e
                ))
            })?;
            file.flush().await?;
        }

        if self.path.exists() {
            if let Err(e) = fs::copy(&self.path, Self::backup_path(&self.path)).await {
                tracing::warn!("Failed to create backup: {}", e);
            }
        }

        fs::rename(&temp_path, &self.path).await.map_err(|e| {
            Error::record_store(format!(
                "Failed to rename {} to {}: {}",
                temp_path.display(),
                self.path.display(),
                e
            ))
        })?;

        tracing::trace!("IP records written to {}", self.path.display());
        Ok(())
    }

    fn temp_path(&self) -> PathBuf {
        let mut temp = self.path.clone();
        temp.set_extension("tmp");
        temp
    }

    fn backup_path(path: &Path) -> PathBuf {
        let mut backup = path.to_path_buf();
        backup.set_extension("backup");
        backup
    }
}

#[async_trait]
impl IpRecordStore for FileRecordStore {
    async fn insert(&self, record: IpRecord) -> Result<SaveOutcome, Error> {
        let mut guard = self.records.write().await;
        let key = record.key();
        if guard.contains_key(&key) {
            return Ok(SaveOutcome::Conflict);
        }
        guard.insert(key.clone(), record);
        if let Err(e) = self.write(&guard).await {
            guard.remove(&key);
            return Err(e);
        }
        Ok(SaveOutcome::Saved)
    }

    async fn find(&self, address: IpNetwork, network_name: &str) -> Result<Option<IpRecord>, Error> {
        let guard = self.records.read().await;
        Ok(guard.get(&RecordKey::new(address, network_name)).cloned())
    }

    async fn update(&self, record: &IpRecord) -> Result<bool, Error> {
        let mut guard = self.records.write().await;
        let key = record.key();
        let previous = match guard.get_mut(&key) {
            Some(existing) => std::mem::replace(existing, record.clone()),
            None => return Ok(false),
        };
        if let Err(e) = self.write(&guard).await {
            guard.insert(key, previous);
            return Err(e);
        }
        Ok(true)
    }

    async fn delete(&self, address: IpNetwork, network_name: &str) -> Result<bool, Error> {
        let mut guard = self.records.write().await;
        let key = RecordKey::new(address, network_name);
        let Some(previous) = guard.remove(&key) else {
            return Ok(false);
        };
        if let Err(e) = self.write(&guard).await {
            guard.insert(key, previous);
            return Err(e);
        }
        Ok(true)
    }

    async fn list(&self) -> Result<Vec<IpRecord>, Error> {
        let guard = self.records.read().await;
        Ok(guard.values().cloned().collect())
    }

    async fn flush(&self) -> Result<(), Error> {
        let guard = self.records.write().await;
        self.write(&guard).await
    }
}
