// # Database IP Repo
//
// Shared-pool repo backed by an IpRecordStore.
//
// ## Concurrency
//
// Many deployments may run against the same store at once. Nothing read
// from the store is trusted across a save: every allocation saves first
// and lets the unique `(address, network_name)` index decide. A lost race
// comes back as `SaveOutcome::Conflict` and the search runs again with the
// lost address excluded, until it wins or the subnet is exhausted.

use std::collections::HashSet;
use std::net::IpAddr;
use std::sync::Arc;

use async_trait::async_trait;
use ipnetwork::IpNetwork;
use tracing::{debug, info, warn};

use super::{Allocation, already_in_use, missing_ip, search};
use crate::error::Result;
use crate::network::{Subnet, VipSubnet, host_network};
use crate::reservation::{NetworkReservation, TaskContext};
use crate::traits::{IpRecord, IpRecordStore, IpRepo, SaveOutcome};

/// IP repo over a shared record store
pub struct DatabaseIpRepo {
    store: Arc<dyn IpRecordStore>,
    task: TaskContext,
}

impl DatabaseIpRepo {
    /// Create a repo writing records on behalf of `task`
    pub fn new(store: Arc<dyn IpRecordStore>, task: TaskContext) -> Self {
        Self { store, task }
    }

    fn record_for(&self, reservation: &NetworkReservation, ip: IpNetwork, static_ip: bool) -> IpRecord {
        IpRecord::new(
            ip,
            reservation.network_name(),
            &reservation.instance().id,
            static_ip,
            &self.task,
        )
        .with_nic_group(reservation.nic_group().map(str::to_string))
    }

    /// Drop rows of `ip` the same instance holds on other networks
    ///
    /// An instance whose NIC moved to another network keeps its address;
    /// the row follows it instead of being duplicated.
    async fn move_from_other_networks(&self, reservation: &NetworkReservation, ip: IpNetwork) -> Result<()> {
        let network_name = reservation.network_name();
        let stale: Vec<IpRecord> = self
            .store
            .list()
            .await?
            .into_iter()
            .filter(|record| {
                record.address == ip
                    && record.network_name != network_name
                    && record.instance_id == reservation.instance().id
            })
            .collect();

        for record in stale {
            if self.store.delete(record.address, &record.network_name).await? {
                info!(
                    ip = %ip,
                    from = %record.network_name,
                    to = network_name,
                    "Moving IP of {} to another network",
                    reservation.instance()
                );
            }
        }
        Ok(())
    }

    async fn try_allocate_dynamic(
        &self,
        reservation: &NetworkReservation,
        subnet: &Subnet,
        lost: &[IpNetwork],
    ) -> Result<Allocation<IpNetwork>> {
        let recorded: Vec<IpNetwork> = self
            .store
            .list()
            .await?
            .into_iter()
            .map(|record| record.address)
            .chain(lost.iter().copied())
            .collect();

        let excluded = search::exclusions(subnet, &recorded);
        let Some(ip) = search::first_free_block(subnet, &excluded) else {
            return Ok(Allocation::Exhausted);
        };

        let record = self.record_for(reservation, ip, false);
        match self.store.insert(record).await? {
            SaveOutcome::Saved => Ok(Allocation::Allocated(ip)),
            SaveOutcome::Conflict => Ok(Allocation::Conflict(ip)),
        }
    }

    async fn try_allocate_vip(
        &self,
        reservation: &NetworkReservation,
        subnet: &VipSubnet,
        lost: &HashSet<IpAddr>,
    ) -> Result<Allocation<IpAddr>> {
        let mut taken: HashSet<IpAddr> = self
            .store
            .list()
            .await?
            .into_iter()
            .filter(|record| record.network_name == reservation.network_name())
            .map(|record| record.address.network())
            .collect();
        taken.extend(lost.iter().copied());

        let Some(ip) = search::first_free_vip(&subnet.static_ips, &taken) else {
            return Ok(Allocation::Exhausted);
        };

        let record = self.record_for(reservation, host_network(ip), false);
        match self.store.insert(record).await? {
            SaveOutcome::Saved => Ok(Allocation::Allocated(ip)),
            SaveOutcome::Conflict => Ok(Allocation::Conflict(ip)),
        }
    }
}

#[async_trait]
impl IpRepo for DatabaseIpRepo {
    async fn add(&self, reservation: &NetworkReservation) -> Result<()> {
        let ip = reservation.ip().ok_or_else(|| missing_ip(reservation))?;
        let static_ip = reservation.is_static();
        let nic_group = reservation.nic_group().map(str::to_string);
        self.move_from_other_networks(reservation, ip).await?;

        loop {
            let record = self.record_for(reservation, ip, static_ip);
            if self.store.insert(record).await? == SaveOutcome::Saved {
                debug!(ip = %ip, network = reservation.network_name(), "Recorded explicit IP");
                return Ok(());
            }

            let Some(mut existing) = self.store.find(ip, reservation.network_name()).await? else {
                // Released between our insert and the lookup
                debug!(ip = %ip, "Conflicting record disappeared, retrying insert");
                continue;
            };

            if existing.instance_id != reservation.instance().id {
                return Err(already_in_use(ip, reservation, &existing.instance_id));
            }

            if existing.static_ip != static_ip || existing.nic_group != nic_group {
                info!(
                    ip = %ip,
                    network = reservation.network_name(),
                    static_ip,
                    "Updating metadata of IP already owned by {}",
                    reservation.instance()
                );
                existing.static_ip = static_ip;
                existing.nic_group = nic_group;
                self.store.update(&existing).await?;
            }
            return Ok(());
        }
    }

    async fn allocate_dynamic_ip(
        &self,
        reservation: &NetworkReservation,
        subnet: &Subnet,
    ) -> Result<Option<IpNetwork>> {
        let mut lost = Vec::new();
        loop {
            match self.try_allocate_dynamic(reservation, subnet, &lost).await? {
                Allocation::Allocated(ip) => {
                    debug!(
                        ip = %ip,
                        subnet = %subnet.range,
                        "Allocated dynamic IP for {}",
                        reservation.instance()
                    );
                    return Ok(Some(ip));
                }
                Allocation::Conflict(ip) => {
                    warn!(ip = %ip, subnet = %subnet.range, "Lost race for dynamic IP, searching again");
                    lost.push(ip);
                }
                Allocation::Exhausted => {
                    debug!(subnet = %subnet.range, "No dynamic IPs left in subnet");
                    return Ok(None);
                }
            }
        }
    }

    async fn allocate_vip_ip(
        &self,
        reservation: &NetworkReservation,
        subnet: &VipSubnet,
    ) -> Result<Option<IpAddr>> {
        let mut lost = HashSet::new();
        loop {
            match self.try_allocate_vip(reservation, subnet, &lost).await? {
                Allocation::Allocated(ip) => {
                    debug!(ip = %ip, network = reservation.network_name(), "Allocated VIP");
                    return Ok(Some(ip));
                }
                Allocation::Conflict(ip) => {
                    warn!(ip = %ip, "Lost race for VIP, searching again");
                    lost.insert(ip);
                }
                Allocation::Exhausted => return Ok(None),
            }
        }
    }

    async fn delete(&self, ip: IpNetwork, network_name: &str) -> Result<()> {
        if self.store.delete(ip, network_name).await? {
            debug!(ip = %ip, network = network_name, "Released IP");
        } else {
            debug!(ip = %ip, network = network_name, "Release of unrecorded IP ignored");
        }
        Ok(())
    }
}
