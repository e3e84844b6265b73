//! IP repositories
//!
//! Two backends implement [`IpRepo`](crate::traits::IpRepo):
//!
//! - [`DatabaseIpRepo`]: shared pool behind an [`IpRecordStore`](crate::traits::IpRecordStore),
//!   safe against other deployments racing on the same store
//! - [`InMemoryIpRepo`]: process-local pool for one deployment
//!
//! Both run the same first-fit search from [`search`].

pub mod database;
pub mod in_memory;
pub(crate) mod search;

pub use database::DatabaseIpRepo;
pub use in_memory::InMemoryIpRepo;

use ipnetwork::IpNetwork;

use crate::error::Error;
use crate::reservation::NetworkReservation;

/// Outcome of one allocation attempt
///
/// `Conflict` carries the address another actor saved first; the caller
/// excludes it and searches again.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Allocation<T> {
    Allocated(T),
    Conflict(T),
    Exhausted,
}

pub(crate) fn already_in_use(ip: IpNetwork, reservation: &NetworkReservation, owner_id: &str) -> Error {
    Error::already_in_use(format!(
        "Failed to reserve IP '{}' for instance '{}': already reserved by instance '{}' on network '{}'",
        ip.network(),
        reservation.instance(),
        owner_id,
        reservation.network_name()
    ))
}

pub(crate) fn missing_ip(reservation: &NetworkReservation) -> Error {
    Error::ip_missing(format!(
        "Reservation for '{}' on network '{}' has no IP to record",
        reservation.instance(),
        reservation.network_name()
    ))
}
