//! Core traits for the placement engine
//!
//! - [`IpRepo`]: Reserve, allocate and release addresses
//! - [`IpRecordStore`]: Persistence handle with a unique address index

pub mod ip_repo;
pub mod record_store;

pub use ip_repo::IpRepo;
pub use record_store::{IpRecord, IpRecordStore, RecordKey, SaveOutcome};
