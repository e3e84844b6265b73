// # IP Repo Trait
//
// The contract shared by the shared-pool (store-backed) and the
// process-local (in-memory) address repositories.
//
// ## Usage
//
// ```rust,ignore
// let ip = repo.allocate_dynamic_ip(&reservation, &subnet).await?;
// match ip {
//     Some(ip) => reservation.resolve_ip(ip)?,
//     None => { /* subnet exhausted, try the next one */ }
// }
// ```

use std::net::IpAddr;

use async_trait::async_trait;
use ipnetwork::IpNetwork;

use crate::network::{Subnet, VipSubnet};
use crate::reservation::NetworkReservation;

/// Trait for IP repository implementations
///
/// Both backends behave identically as seen through this trait; they only
/// differ in who they share state with.
#[async_trait]
pub trait IpRepo: Send + Sync {
    /// Record the reservation's explicit address
    ///
    /// Re-adding an address the same instance already holds is a no-op
    /// (its static flag is refreshed). An address held by another instance
    /// fails with `Error::AlreadyInUse`.
    async fn add(&self, reservation: &NetworkReservation) -> Result<(), crate::Error>;

    /// Find, record and return a free address (or `/prefix` block) in
    /// `subnet`, skipping static, restricted and recorded addresses
    ///
    /// # Returns
    ///
    /// - `Ok(Some(ip))`: Address reserved for the reservation's instance
    /// - `Ok(None)`: Subnet exhausted
    /// - `Err(Error)`: Storage error
    async fn allocate_dynamic_ip(
        &self,
        reservation: &NetworkReservation,
        subnet: &Subnet,
    ) -> Result<Option<IpNetwork>, crate::Error>;

    /// Same as [`IpRepo::allocate_dynamic_ip`] but searching the VIP pool
    async fn allocate_vip_ip(
        &self,
        reservation: &NetworkReservation,
        subnet: &VipSubnet,
    ) -> Result<Option<IpAddr>, crate::Error>;

    /// Release an address. Deleting an absent address is a no-op.
    async fn delete(&self, ip: IpNetwork, network_name: &str) -> Result<(), crate::Error>;
}
