//! Fixtures and test doubles shared by the contract tests

#![allow(dead_code)]

use std::net::IpAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use ipnetwork::IpNetwork;
use netplace_core::error::Result;
use netplace_core::network::{Network, Subnet, VipSubnet};
use netplace_core::placement::ExistingInstance;
use netplace_core::reservation::{InstanceRef, TaskContext};
use netplace_core::store::MemoryRecordStore;
use netplace_core::traits::{IpRecord, IpRecordStore, SaveOutcome};
use netplace_core::{DatabaseIpRepo, InMemoryIpRepo, IpRepo};

pub fn ip(s: &str) -> IpAddr {
    s.parse().expect("valid IP literal")
}

pub fn cidr(s: &str) -> IpNetwork {
    s.parse().expect("valid CIDR literal")
}

pub fn task() -> TaskContext {
    TaskContext::new("task-contract")
}

pub fn instance(id: &str) -> InstanceRef {
    InstanceRef::new(id, "web", 0)
}

/// `10.0.0.0/24`, gateway `.1`, static `.5`
pub fn private_subnet() -> Subnet {
    Subnet::new("private", cidr("10.0.0.0/24"))
        .with_gateway(ip("10.0.0.1"))
        .with_static_ips([ip("10.0.0.5")])
}

/// Manual network with one subnet per AZ
pub fn zoned_network() -> Network {
    Network::manual(
        "private",
        vec![
            Subnet::new("private", cidr("10.0.1.0/29"))
                .with_gateway(ip("10.0.1.1"))
                .with_azs(["z1"]),
            Subnet::new("private", cidr("10.0.2.0/29"))
                .with_gateway(ip("10.0.2.1"))
                .with_azs(["z2"]),
        ],
    )
}

pub fn vip_network() -> Network {
    Network::vip(
        "public",
        vec![VipSubnet::new("public", [ip("203.0.113.10"), ip("203.0.113.11")])],
    )
}

pub fn existing(index: u32, az: &str) -> ExistingInstance {
    ExistingInstance::new(format!("vm-{}", index), index).with_az(az)
}

/// Both repo backends, for contracts that must hold for each
pub fn backends() -> Vec<(&'static str, Arc<dyn IpRepo>)> {
    vec![
        (
            "database",
            Arc::new(DatabaseIpRepo::new(Arc::new(MemoryRecordStore::new()), task())) as Arc<dyn IpRepo>,
        ),
        ("in_memory", Arc::new(InMemoryIpRepo::new()) as Arc<dyn IpRepo>),
    ]
}

/// A store that loses the first `races` inserts to another deployment
///
/// Before reporting the conflict it writes the contested address on behalf
/// of `foreign_instance`, as the winning deployment would have.
pub struct ConflictInjectingStore {
    inner: MemoryRecordStore,
    races: AtomicUsize,
    injected: AtomicUsize,
    foreign_instance: String,
}

impl ConflictInjectingStore {
    pub fn new(races: usize, foreign_instance: &str) -> Self {
        Self {
            inner: MemoryRecordStore::new(),
            races: AtomicUsize::new(races),
            injected: AtomicUsize::new(0),
            foreign_instance: foreign_instance.to_string(),
        }
    }

    /// Number of races lost so far
    pub fn injected(&self) -> usize {
        self.injected.load(Ordering::SeqCst)
    }

    fn lose_race(&self) -> bool {
        self.races
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| left.checked_sub(1))
            .is_ok()
    }
}

#[async_trait]
impl IpRecordStore for ConflictInjectingStore {
    async fn insert(&self, record: IpRecord) -> Result<SaveOutcome> {
        if record.instance_id != self.foreign_instance && self.lose_race() {
            let winner = IpRecord::new(
                record.address,
                record.network_name.clone(),
                self.foreign_instance.clone(),
                false,
                &TaskContext::new("task-other"),
            );
            self.inner.insert(winner).await?;
            self.injected.fetch_add(1, Ordering::SeqCst);
            return Ok(SaveOutcome::Conflict);
        }
        self.inner.insert(record).await
    }

    async fn find(&self, address: IpNetwork, network_name: &str) -> Result<Option<IpRecord>> {
        self.inner.find(address, network_name).await
    }

    async fn update(&self, record: &IpRecord) -> Result<bool> {
        self.inner.update(record).await
    }

    async fn delete(&self, address: IpNetwork, network_name: &str) -> Result<bool> {
        self.inner.delete(address, network_name).await
    }

    async fn list(&self) -> Result<Vec<IpRecord>> {
        self.inner.list().await
    }

    async fn flush(&self) -> Result<()> {
        self.inner.flush().await
    }
}
