// # Record Store Implementations
//
// This module provides implementations of the IpRecordStore trait for
// different persistence strategies.

pub mod file;
pub mod memory;

use std::sync::Arc;

pub use file::FileRecordStore;
pub use memory::MemoryRecordStore;

use crate::config::RecordStoreConfig;
use crate::error::Result;
use crate::traits::IpRecordStore;

/// Open the record store described by `config`
pub async fn open_record_store(config: &RecordStoreConfig) -> Result<Arc<dyn IpRecordStore>> {
    match config {
        RecordStoreConfig::Memory => {
            tracing::debug!("Opening in-memory record store");
            Ok(Arc::new(MemoryRecordStore::new()))
        }
        RecordStoreConfig::File { path } => {
            tracing::debug!("Opening file record store at {}", path);
            Ok(Arc::new(FileRecordStore::new(path).await?))
        }
    }
}
