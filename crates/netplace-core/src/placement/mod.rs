//! AZ placement planning
//!
//! Decides which AZ each desired instance lands in and which existing
//! instances are reused or become obsolete:
//!
//! - [`AvailabilityZonePicker`]: instance groups without static IPs
//! - [`StaticIpsAvailabilityZonePicker`]: instance groups with static IPs,
//!   where every IP's subnet limits the AZs it can live in
//! - [`PlacementPlanner`]: entry point choosing between the two
//!
//! Everything here runs on the planning thread of one deployment and holds
//! no shared state.

pub mod az_picker;
pub mod balancer;
pub mod brute_force;
pub mod counters;
pub mod planner;
pub mod static_ip_picker;
pub mod static_ips;

use std::collections::{BTreeMap, BTreeSet};
use std::net::IpAddr;

use serde::{Deserialize, Serialize};

use crate::network::Network;

pub use az_picker::AvailabilityZonePicker;
pub use balancer::{Balancer, MinWins, RandomWins, TieStrategy};
pub use brute_force::BruteForceIpAllocation;
pub use counters::{PlacedDesiredInstances, UnplacedExistingInstances};
pub use planner::{PlacementPlan, PlacementPlanner, PlacementRequest};
pub use static_ip_picker::StaticIpsAvailabilityZonePicker;
pub use static_ips::{NetworkStaticIps, NetworksToStaticIps, StaticIpToAzs};

/// An instance that exists from a previous deployment run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExistingInstance {
    pub id: String,
    pub index: u32,
    pub az: Option<String>,
    /// Instances with a disk are kept in their AZ whenever it is still desired
    #[serde(default)]
    pub has_persistent_disk: bool,
    /// Addresses held per network
    #[serde(default)]
    pub ips: BTreeMap<String, BTreeSet<IpAddr>>,
    /// Operator asked the orchestrator to leave this instance alone
    #[serde(default)]
    pub ignore: bool,
}

impl ExistingInstance {
    pub fn new(id: impl Into<String>, index: u32) -> Self {
        Self {
            id: id.into(),
            index,
            az: None,
            has_persistent_disk: false,
            ips: BTreeMap::new(),
            ignore: false,
        }
    }

    pub fn with_az(mut self, az: impl Into<String>) -> Self {
        self.az = Some(az.into());
        self
    }

    pub fn with_persistent_disk(mut self) -> Self {
        self.has_persistent_disk = true;
        self
    }

    pub fn with_ignore(mut self) -> Self {
        self.ignore = true;
        self
    }

    pub fn with_ip(mut self, network_name: impl Into<String>, ip: IpAddr) -> Self {
        self.ips.entry(network_name.into()).or_default().insert(ip);
        self
    }

    /// `group/index`, as used in messages
    pub fn name(&self, group: &str) -> String {
        format!("{}/{}", group, self.index)
    }
}

/// A slot the deployment wants filled
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DesiredInstance {
    pub az: Option<String>,
    /// Assigned once placement is complete
    pub index: Option<u32>,
    /// Static IP chosen per network
    pub static_ips: BTreeMap<String, IpAddr>,
}

impl DesiredInstance {
    pub fn new(az: Option<String>) -> Self {
        Self {
            az,
            index: None,
            static_ips: BTreeMap::new(),
        }
    }
}

/// Placement outcome for one instance
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum InstancePlan {
    /// Existing instance reused for a desired slot
    Existing {
        desired: DesiredInstance,
        existing: ExistingInstance,
    },
    /// Instance to create
    New { desired: DesiredInstance },
    /// Existing instance to delete
    Obsolete { existing: ExistingInstance },
}

impl InstancePlan {
    pub fn desired(&self) -> Option<&DesiredInstance> {
        match self {
            InstancePlan::Existing { desired, .. } | InstancePlan::New { desired } => Some(desired),
            InstancePlan::Obsolete { .. } => None,
        }
    }

    pub fn existing(&self) -> Option<&ExistingInstance> {
        match self {
            InstancePlan::Existing { existing, .. } | InstancePlan::Obsolete { existing } => {
                Some(existing)
            }
            InstancePlan::New { .. } => None,
        }
    }

    pub fn is_new(&self) -> bool {
        matches!(self, InstancePlan::New { .. })
    }

    pub fn is_obsolete(&self) -> bool {
        matches!(self, InstancePlan::Obsolete { .. })
    }

    pub fn is_existing(&self) -> bool {
        matches!(self, InstancePlan::Existing { .. })
    }

    /// AZ of the desired slot
    pub fn az(&self) -> Option<&str> {
        self.desired().and_then(|desired| desired.az.as_deref())
    }
}

/// A network attached to an instance group, with its static IPs if any
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobNetwork {
    pub network: Network,
    #[serde(default)]
    pub static_ips: Vec<IpAddr>,
}

impl JobNetwork {
    pub fn new(network: Network) -> Self {
        Self {
            network,
            static_ips: Vec::new(),
        }
    }

    pub fn with_static_ips(mut self, ips: impl IntoIterator<Item = IpAddr>) -> Self {
        self.static_ips.extend(ips);
        self
    }

    pub fn name(&self) -> &str {
        &self.network.name
    }

    pub fn is_static(&self) -> bool {
        !self.static_ips.is_empty()
    }
}

/// Give reused instances their own index and new ones the lowest indexes
/// no existing instance uses
pub(crate) fn assign_indexes(plans: &mut [InstancePlan]) {
    let taken: BTreeSet<u32> = plans
        .iter()
        .filter_map(|plan| plan.existing().map(|existing| existing.index))
        .collect();

    let mut free = (0u32..).filter(|index| !taken.contains(index));
    for plan in plans.iter_mut() {
        match plan {
            InstancePlan::Existing { desired, existing } => desired.index = Some(existing.index),
            InstancePlan::New { desired } => desired.index = free.next(),
            InstancePlan::Obsolete { .. } => {}
        }
    }
}
