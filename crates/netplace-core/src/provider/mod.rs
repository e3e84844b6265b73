//! IP provider
//!
//! The IpProvider turns reservations into recorded addresses:
//! - Dispatches on the network kind (dynamic, manual, vip)
//! - Filters subnets to the instance's AZ
//! - Validates explicit IPs against subnet ranges and pools
//! - Delegates the address search and bookkeeping to an [`IpRepo`]
//!
//! ## Reservation Flow
//!
//! ```text
//! NetworkReservation ──► IpProvider::reserve ──► NetworkKind?
//!                                                  │
//!       ┌──────────────────────────────────────────┼───────────────────┐
//!       ▼                                          ▼                   ▼
//!   Dynamic                                     Manual                Vip
//!   (type only)                  no IP: allocate_dynamic_ip    no IP: allocate_vip_ip
//!                                IP:    validate + add         IP:    add
//! ```

pub mod factory;

pub use factory::IpProviderFactory;

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::network::{Network, NetworkKind, Subnet, VipSubnet, host_network};
use crate::reservation::{NetworkReservation, ReservationType};
use crate::traits::IpRepo;

/// Reserves and releases addresses for one deployment
///
/// ## Threading
///
/// The provider is `Send + Sync`; concurrent calls are serialized by the
/// repo it wraps.
pub struct IpProvider {
    repo: Arc<dyn IpRepo>,
    networks: HashMap<String, Network>,
}

impl IpProvider {
    /// Create a provider over `networks`
    ///
    /// # Parameters
    ///
    /// - `repo`: Backend that records addresses
    /// - `networks`: Every network a reservation may name
    ///
    /// # Returns
    ///
    /// - `Err(Error::Config)`: A subnet fails validation
    pub fn new(repo: Arc<dyn IpRepo>, networks: impl IntoIterator<Item = Network>) -> Result<Self> {
        let mut by_name = HashMap::new();
        for network in networks {
            network.validate()?;
            by_name.insert(network.name.clone(), network);
        }
        Ok(Self {
            repo,
            networks: by_name,
        })
    }

    /// Look up a network by name
    pub fn network(&self, name: &str) -> Result<&Network> {
        self.networks
            .get(name)
            .ok_or_else(|| Error::invalid_input(format!("Unknown network '{}'", name)))
    }

    /// Reserve an address for `reservation`
    ///
    /// A reservation that is already reserved is left untouched.
    ///
    /// # Returns
    ///
    /// - `Ok(())`: Reservation is reserved
    /// - `Err(Error::NotEnoughCapacity)`: Every eligible subnet or pool is full
    /// - `Err(Error::AlreadyInUse)`: Explicit IP owned by another instance
    /// - `Err(Error::IpOutsideSubnet | IpReserved | WrongType | IpMissing)`:
    ///   Explicit IP rejected
    pub async fn reserve(&self, reservation: &mut NetworkReservation) -> Result<()> {
        if reservation.is_reserved() {
            return Ok(());
        }

        let network = self.network(reservation.network_name())?;
        match &network.kind {
            NetworkKind::Dynamic { .. } => {
                reservation.resolve_type(ReservationType::Dynamic);
                reservation.mark_reserved();
                debug!("Reserved dynamic network attachment {}", reservation);
                Ok(())
            }
            NetworkKind::Manual { subnets } => match reservation.ip() {
                None => self.reserve_from_subnets(reservation, subnets).await,
                Some(_) => self.reserve_explicit_manual(reservation, network).await,
            },
            NetworkKind::Vip { subnets } => self.reserve_vip(reservation, network, subnets).await,
        }
    }

    /// Re-affirm an address the instance held in a previous run
    ///
    /// Skips the allocation search. On a manual network whose containing
    /// subnet is gone, or now restricts the address, the reservation is
    /// left unreserved so the caller plans a fresh one.
    pub async fn reserve_existing_ips(&self, reservation: &mut NetworkReservation) -> Result<()> {
        if reservation.is_reserved() {
            return Ok(());
        }

        let network = self.network(reservation.network_name())?;
        match &network.kind {
            NetworkKind::Dynamic { .. } => {
                reservation.resolve_type(ReservationType::Dynamic);
                reservation.mark_reserved();
            }
            NetworkKind::Vip { subnets } => {
                let ip = reservation.ip_addr().ok_or_else(|| missing_existing(reservation))?;
                let from_pool = subnets.iter().any(|subnet| subnet.static_ips.contains(&ip));
                reservation.resolve_type(if from_pool {
                    ReservationType::Dynamic
                } else {
                    ReservationType::Static
                });
                self.repo.add(reservation).await?;
                reservation.mark_reserved();
            }
            NetworkKind::Manual { .. } => {
                let ip = reservation.ip_addr().ok_or_else(|| missing_existing(reservation))?;
                let Some(subnet) = network
                    .find_subnet_containing(ip)
                    .filter(|subnet| !subnet.is_restricted(ip))
                else {
                    debug!(
                        "Existing IP '{}' no longer fits network '{}', leaving {} unreserved",
                        ip,
                        network.name,
                        reservation.instance()
                    );
                    return Ok(());
                };
                reservation.resolve_type(pool_type(subnet, ip));
                self.repo.add(reservation).await?;
                reservation.mark_reserved();
            }
        }

        debug!("Reserved existing {}", reservation);
        Ok(())
    }

    /// Release the reservation's address
    pub async fn release(&self, reservation: &NetworkReservation) -> Result<()> {
        let network = self.network(reservation.network_name())?;
        match (reservation.ip(), &network.kind) {
            (None, NetworkKind::Dynamic { .. }) => Ok(()),
            (None, _) => Err(Error::ip_missing("Can't release reservation without an IP")),
            (Some(ip), _) => {
                self.repo.delete(ip, reservation.network_name()).await?;
                info!("Released {}", reservation);
                Ok(())
            }
        }
    }

    async fn reserve_from_subnets(
        &self,
        reservation: &mut NetworkReservation,
        subnets: &[Subnet],
    ) -> Result<()> {
        let az = reservation.instance().az.clone();
        for subnet in subnets.iter().filter(|subnet| subnet.serves_az(az.as_deref())) {
            if let Some(ip) = self.repo.allocate_dynamic_ip(reservation, subnet).await? {
                reservation.resolve_ip(ip)?;
                reservation.resolve_type(pool_type(subnet, ip.network()));
                reservation.mark_reserved();
                info!("Reserved {}", reservation);
                return Ok(());
            }
        }

        Err(Error::not_enough_capacity(format!(
            "Failed to reserve IP for '{}' for manual network '{}': no more available",
            reservation.instance(),
            reservation.network_name()
        )))
    }

    async fn reserve_explicit_manual(
        &self,
        reservation: &mut NetworkReservation,
        network: &Network,
    ) -> Result<()> {
        let ip = reservation
            .ip_addr()
            .ok_or_else(|| missing_existing(reservation))?;

        let subnet = network.find_subnet_containing(ip).ok_or_else(|| {
            Error::ip_outside_subnet(format!(
                "Provided IP '{}' does not belong to any subnet in network '{}'",
                ip, network.name
            ))
        })?;

        if subnet.is_restricted(ip) {
            return Err(Error::ip_reserved(format!(
                "Failed to reserve IP '{}' for network '{}': IP belongs to reserved range",
                ip, network.name
            )));
        }

        let actual = pool_type(subnet, ip);
        if let Some(requested) = reservation.reservation_type() {
            if requested != actual {
                return Err(Error::wrong_type(format!(
                    "IP '{}' on network '{}' does not belong to {} pool",
                    ip, network.name, requested
                )));
            }
        }

        reservation.resolve_type(actual);
        self.repo.add(reservation).await?;
        reservation.mark_reserved();
        info!("Reserved {}", reservation);
        Ok(())
    }

    async fn reserve_vip(
        &self,
        reservation: &mut NetworkReservation,
        network: &Network,
        subnets: &[VipSubnet],
    ) -> Result<()> {
        if reservation.ip().is_some() {
            reservation.resolve_type(ReservationType::Static);
            self.repo.add(reservation).await?;
            reservation.mark_reserved();
            info!("Reserved {}", reservation);
            return Ok(());
        }

        if !network.globally_allocates_vips() {
            return Err(Error::ip_missing(format!(
                "Failed to reserve IP for '{}' on vip network '{}': no IP given and the network has no VIP pools",
                reservation.instance(),
                network.name
            )));
        }

        let az = reservation.instance().az.clone();
        for subnet in subnets.iter().filter(|subnet| subnet.serves_az(az.as_deref())) {
            if let Some(ip) = self.repo.allocate_vip_ip(reservation, subnet).await? {
                reservation.resolve_ip(host_network(ip))?;
                reservation.resolve_type(ReservationType::Dynamic);
                reservation.mark_reserved();
                info!("Reserved {}", reservation);
                return Ok(());
            }
        }

        Err(Error::not_enough_capacity(format!(
            "Failed to reserve IP for '{}' for vip network '{}': no more available",
            reservation.instance(),
            network.name
        )))
    }
}

fn pool_type(subnet: &Subnet, ip: std::net::IpAddr) -> ReservationType {
    if subnet.is_static(ip) {
        ReservationType::Static
    } else {
        ReservationType::Dynamic
    }
}

fn missing_existing(reservation: &NetworkReservation) -> Error {
    Error::ip_missing(format!(
        "Reservation for '{}' on network '{}' has no IP",
        reservation.instance(),
        reservation.network_name()
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repo::InMemoryIpRepo;
    use crate::reservation::InstanceRef;

    fn provider() -> IpProvider {
        let subnet = Subnet::new("private", "10.0.0.0/29".parse().unwrap())
            .with_gateway("10.0.0.1".parse().unwrap())
            .with_static_ips(["10.0.0.5".parse().unwrap()])
            .with_restricted_ips(["10.0.0.6".parse().unwrap()])
            .with_azs(["z1"]);
        IpProvider::new(
            Arc::new(InMemoryIpRepo::new()),
            [
                Network::manual("private", vec![subnet]),
                Network::dynamic("cloud"),
                Network::vip("public", vec![VipSubnet::new("public", ["1.1.1.1".parse().unwrap()])]),
                Network::vip("floating", vec![]),
            ],
        )
        .unwrap()
    }

    fn web(index: u32) -> InstanceRef {
        InstanceRef::new(format!("vm-{}", index), "web", index).with_az("z1")
    }

    #[tokio::test]
    async fn test_dynamic_network_only_sets_type() {
        let provider = provider();
        let mut reservation = NetworkReservation::new_dynamic(web(0), "cloud");
        provider.reserve(&mut reservation).await.unwrap();
        assert!(reservation.is_reserved());
        assert!(reservation.is_dynamic());
        assert!(reservation.ip().is_none());

        // Releasing an address-less dynamic reservation is a no-op
        provider.release(&reservation).await.unwrap();
    }

    #[tokio::test]
    async fn test_manual_explicit_ip_validation() {
        let provider = provider();

        let mut restricted = NetworkReservation::new_static(web(0), "private", "10.0.0.6".parse().unwrap());
        let err = provider.reserve(&mut restricted).await.unwrap_err();
        assert!(err.to_string().contains(
            "Failed to reserve IP '10.0.0.6' for network 'private': IP belongs to reserved range"
        ));

        let mut outside = NetworkReservation::new_static(web(0), "private", "10.1.0.6".parse().unwrap());
        assert!(matches!(provider.reserve(&mut outside).await, Err(Error::IpOutsideSubnet(_))));

        let mut not_static = NetworkReservation::new_static(web(0), "private", "10.0.0.3".parse().unwrap());
        let err = provider.reserve(&mut not_static).await.unwrap_err();
        assert!(err.to_string().contains("does not belong to static pool"));

        let mut ok = NetworkReservation::new_static(web(0), "private", "10.0.0.5".parse().unwrap());
        provider.reserve(&mut ok).await.unwrap();
        assert!(ok.is_reserved() && ok.is_static());
    }

    #[tokio::test]
    async fn test_manual_dynamic_exhaustion() {
        let provider = provider();
        // .2 .3 .4 are the only dynamic addresses
        for index in 0..3 {
            let mut reservation = NetworkReservation::new_dynamic(web(index), "private");
            provider.reserve(&mut reservation).await.unwrap();
            assert!(reservation.is_dynamic());
        }

        let mut reservation = NetworkReservation::new_dynamic(web(3), "private");
        let err = provider.reserve(&mut reservation).await.unwrap_err();
        assert!(matches!(err, Error::NotEnoughCapacity(_)));
        assert!(err.to_string().contains(
            "Failed to reserve IP for 'web/3 (vm-3)' for manual network 'private': no more available"
        ));
    }

    #[tokio::test]
    async fn test_vip_networks() {
        let provider = provider();

        let mut pooled = NetworkReservation::new_dynamic(web(0), "public");
        provider.reserve(&mut pooled).await.unwrap();
        assert_eq!(pooled.ip_addr(), Some("1.1.1.1".parse().unwrap()));
        assert!(pooled.is_dynamic());

        let mut none_left = NetworkReservation::new_dynamic(web(1), "public");
        let err = provider.reserve(&mut none_left).await.unwrap_err();
        assert!(err.to_string().contains("for vip network 'public': no more available"));

        let mut missing = NetworkReservation::new_dynamic(web(1), "floating");
        assert!(matches!(provider.reserve(&mut missing).await, Err(Error::IpMissing(_))));

        let mut pinned = NetworkReservation::new_static(web(1), "floating", "2.2.2.2".parse().unwrap());
        provider.reserve(&mut pinned).await.unwrap();
        assert!(pinned.is_static());
    }

    #[tokio::test]
    async fn test_release_requires_ip() {
        let provider = provider();
        let reservation = NetworkReservation::new_dynamic(web(0), "private");
        let err = provider.release(&reservation).await.unwrap_err();
        assert_eq!(err.to_string(), "IP missing: Can't release reservation without an IP");
    }

    #[test]
    fn test_new_rejects_invalid_subnet_prefix() {
        let subnet = Subnet::new("private", "10.0.0.0/24".parse().unwrap()).with_prefix(33);
        let result = IpProvider::new(
            Arc::new(InMemoryIpRepo::new()),
            [Network::manual("private", vec![subnet])],
        );
        let Err(err) = result else {
            panic!("provider accepted a /33 allocation prefix");
        };
        assert!(matches!(err, Error::Config(_)));
        assert!(err.to_string().contains("prefix /33 outside /24../32"));
    }

    #[tokio::test]
    async fn test_reserve_existing_infers_type() {
        let provider = provider();

        let mut kept = NetworkReservation::existing(web(0), "private", "10.0.0.5/32".parse().unwrap());
        provider.reserve_existing_ips(&mut kept).await.unwrap();
        assert!(kept.is_reserved() && kept.is_static());

        let mut stale = NetworkReservation::existing(web(1), "private", "10.0.0.6/32".parse().unwrap());
        provider.reserve_existing_ips(&mut stale).await.unwrap();
        assert!(!stale.is_reserved());
    }
}
