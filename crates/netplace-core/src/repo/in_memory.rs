//! Process-local IP repo for deployments that own their network namespace.
//!
//! One mutex guards the address table and the recently-released list, so
//! every mutating call is a single critical section even when the update
//! pipeline runs per-instance work on several tasks.

use std::collections::{HashMap, HashSet};
use std::net::IpAddr;

use async_trait::async_trait;
use ipnetwork::IpNetwork;
use tokio::sync::Mutex;
use tracing::debug;

use super::{already_in_use, missing_ip, search};
use crate::error::Result;
use crate::network::{Subnet, VipSubnet, host_network};
use crate::reservation::NetworkReservation;
use crate::traits::{IpRepo, RecordKey};

/// Owner metadata of an address held by [`InMemoryIpRepo`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Owner {
    pub instance_id: String,
    pub static_ip: bool,
    pub nic_group: Option<String>,
}

#[derive(Debug, Default)]
struct State {
    ips: HashMap<RecordKey, Owner>,
    /// Released addresses per network, oldest first
    recently_released: HashMap<String, Vec<IpNetwork>>,
}

impl State {
    fn record(&mut self, reservation: &NetworkReservation, ip: IpNetwork, static_ip: bool) {
        let network = reservation.network_name();
        if let Some(released) = self.recently_released.get_mut(network) {
            released.retain(|candidate| *candidate != ip);
        }
        self.ips.insert(
            RecordKey::new(ip, network),
            Owner {
                instance_id: reservation.instance().id.clone(),
                static_ip,
                nic_group: reservation.nic_group().map(str::to_string),
            },
        );
    }

    fn released(&self, network: &str) -> &[IpNetwork] {
        self.recently_released
            .get(network)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }
}

/// In-memory IP repo
///
/// Addresses freed earlier in the same planning pass are kept out of the
/// search until nothing else is left, so replaced instances don't
/// immediately reuse the address they just gave up.
#[derive(Debug, Default)]
pub struct InMemoryIpRepo {
    state: Mutex<State>,
}

impl InMemoryIpRepo {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of recorded addresses across all networks
    pub async fn len(&self) -> usize {
        self.state.lock().await.ips.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.state.lock().await.ips.is_empty()
    }

    /// Current owner of `ip` on `network_name`
    pub async fn owner_of(&self, ip: IpNetwork, network_name: &str) -> Option<Owner> {
        self.state
            .lock()
            .await
            .ips
            .get(&RecordKey::new(ip, network_name))
            .cloned()
    }
}

#[async_trait]
impl IpRepo for InMemoryIpRepo {
    async fn add(&self, reservation: &NetworkReservation) -> Result<()> {
        let ip = reservation.ip().ok_or_else(|| missing_ip(reservation))?;
        let mut state = self.state.lock().await;
        let key = RecordKey::new(ip, reservation.network_name());

        if let Some(owner) = state.ips.get(&key) {
            if owner.instance_id != reservation.instance().id {
                return Err(already_in_use(ip, reservation, &owner.instance_id));
            }
        }

        // The same instance holding the address elsewhere moved networks
        let instance_id = &reservation.instance().id;
        state.ips.retain(|held, owner| {
            held.address != ip || held.network_name == key.network_name || owner.instance_id != *instance_id
        });

        state.record(reservation, ip, reservation.is_static());
        debug!(ip = %ip, network = reservation.network_name(), "Recorded explicit IP");
        Ok(())
    }

    async fn allocate_dynamic_ip(
        &self,
        reservation: &NetworkReservation,
        subnet: &Subnet,
    ) -> Result<Option<IpNetwork>> {
        let mut state = self.state.lock().await;
        let network = reservation.network_name();

        let recorded: Vec<IpNetwork> = state
            .ips
            .keys()
            .map(|key| key.address)
            .chain(state.released(network).iter().copied())
            .collect();
        let excluded = search::exclusions(subnet, &recorded);

        let ip = match search::first_free_block(subnet, &excluded) {
            Some(ip) => Some(ip),
            None => {
                let prefix = subnet.allocation_prefix();
                state.released(network).iter().copied().find(|candidate| {
                    candidate.prefix() == prefix
                        && subnet.contains(candidate.network())
                        && !subnet.is_restricted(candidate.network())
                        && !subnet.is_static(candidate.network())
                        && !state.ips.keys().any(|key| key.address == *candidate)
                })
            }
        };

        match ip {
            Some(ip) => {
                state.record(reservation, ip, false);
                debug!(ip = %ip, subnet = %subnet.range, "Allocated dynamic IP for {}", reservation.instance());
                Ok(Some(ip))
            }
            None => {
                debug!(subnet = %subnet.range, "No dynamic IPs left in subnet");
                Ok(None)
            }
        }
    }

    async fn allocate_vip_ip(
        &self,
        reservation: &NetworkReservation,
        subnet: &VipSubnet,
    ) -> Result<Option<IpAddr>> {
        let mut state = self.state.lock().await;
        let network = reservation.network_name();

        let in_use: HashSet<IpAddr> = state
            .ips
            .keys()
            .filter(|key| key.network_name == network)
            .map(|key| key.address.network())
            .collect();
        let mut taken = in_use.clone();
        taken.extend(state.released(network).iter().map(|ip| ip.network()));

        let ip = search::first_free_vip(&subnet.static_ips, &taken).or_else(|| {
            state
                .released(network)
                .iter()
                .map(|ip| ip.network())
                .find(|ip| subnet.static_ips.contains(ip) && !in_use.contains(ip))
        });

        if let Some(ip) = ip {
            state.record(reservation, host_network(ip), false);
            debug!(ip = %ip, network, "Allocated VIP");
        }
        Ok(ip)
    }

    async fn delete(&self, ip: IpNetwork, network_name: &str) -> Result<()> {
        let mut state = self.state.lock().await;
        if state.ips.remove(&RecordKey::new(ip, network_name)).is_some() {
            let released = state
                .recently_released
                .entry(network_name.to_string())
                .or_default();
            if !released.contains(&ip) {
                released.push(ip);
            }
            debug!(ip = %ip, network = network_name, "Released IP");
        }
        Ok(())
    }
}
