// # netplace-core
//
// IP reservation and availability-zone placement for cluster deployments.
//
// ## Architecture Overview
//
// - **IpRecordStore**: Trait for the persisted address table (unique per
//   address and network)
// - **IpRepo**: Trait for address bookkeeping, backed either by a shared
//   store (`DatabaseIpRepo`) or by process memory (`InMemoryIpRepo`)
// - **IpProvider**: Resolves and reserves addresses per network kind
// - **IpProviderFactory**: Picks the repo backend from the networking mode
// - **PlacementPlanner**: Places desired instances into AZs, reusing
//   existing instances and pinning static IPs to AZs
//
// ## Design Principles
//
// 1. **Store is the authority**: availability is decided by the unique
//    index at save time, never by an earlier read
// 2. **Races are values**: lost saves come back as conflicts and the repo
//    searches again
// 3. **Planning is pure**: placement holds no shared state and does no I/O

pub mod config;
pub mod error;
pub mod network;
pub mod placement;
pub mod provider;
pub mod repo;
pub mod reservation;
pub mod store;
pub mod traits;

pub use config::{NetworkingMode, PlannerConfig, RecordStoreConfig, TieStrategyConfig};
pub use error::{Error, Result};
pub use network::{AvailabilityZone, Network, NetworkKind, Subnet, VipSubnet};
pub use placement::{
    ExistingInstance, InstancePlan, JobNetwork, PlacementPlan, PlacementPlanner, PlacementRequest,
};
pub use provider::{IpProvider, IpProviderFactory};
pub use repo::{DatabaseIpRepo, InMemoryIpRepo};
pub use reservation::{InstanceRef, NetworkReservation, TaskContext};
pub use store::{FileRecordStore, MemoryRecordStore, open_record_store};
pub use traits::{IpRecord, IpRecordStore, IpRepo};
