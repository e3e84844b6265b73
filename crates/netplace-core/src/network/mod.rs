//! Network, subnet and availability-zone descriptors
//!
//! These are produced by the deployment plan and are immutable for the
//! duration of one planning pass.

pub mod addr;
pub mod subnet;

use std::cmp::Ordering;
use std::collections::BTreeSet;
use std::hash::{Hash, Hasher};
use std::net::IpAddr;

use serde::{Deserialize, Serialize};

use crate::error::Result;

pub use addr::{host_network, parse_ip_list};
pub use subnet::{Subnet, VipSubnet};

/// A named fault-isolation domain. Identity is the name alone.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AvailabilityZone {
    pub name: String,
    #[serde(default)]
    pub cloud_properties: serde_json::Value,
}

impl AvailabilityZone {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            cloud_properties: serde_json::Value::Null,
        }
    }

    pub fn with_cloud_properties(mut self, cloud_properties: serde_json::Value) -> Self {
        self.cloud_properties = cloud_properties;
        self
    }
}

impl PartialEq for AvailabilityZone {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
    }
}

impl Eq for AvailabilityZone {}

impl Hash for AvailabilityZone {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.name.hash(state);
    }
}

impl PartialOrd for AvailabilityZone {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for AvailabilityZone {
    fn cmp(&self, other: &Self) -> Ordering {
        self.name.cmp(&other.name)
    }
}

/// Kind of a network together with the data each kind needs
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum NetworkKind {
    /// Addresses are assigned by the infrastructure
    Dynamic {
        #[serde(default)]
        az_names: BTreeSet<String>,
    },

    /// Operator-defined subnets
    Manual { subnets: Vec<Subnet> },

    /// Director-managed virtual IPs
    Vip {
        #[serde(default)]
        subnets: Vec<VipSubnet>,
    },
}

/// A deployment network
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Network {
    pub name: String,
    #[serde(flatten)]
    pub kind: NetworkKind,
}

impl Network {
    /// Create a dynamic network
    pub fn dynamic(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: NetworkKind::Dynamic {
                az_names: BTreeSet::new(),
            },
        }
    }

    /// Create a manual network
    pub fn manual(name: impl Into<String>, subnets: Vec<Subnet>) -> Self {
        Self {
            name: name.into(),
            kind: NetworkKind::Manual { subnets },
        }
    }

    /// Create a vip network
    pub fn vip(name: impl Into<String>, subnets: Vec<VipSubnet>) -> Self {
        Self {
            name: name.into(),
            kind: NetworkKind::Vip { subnets },
        }
    }

    /// Short name of the network kind, used in messages
    pub fn kind_name(&self) -> &'static str {
        match self.kind {
            NetworkKind::Dynamic { .. } => "dynamic",
            NetworkKind::Manual { .. } => "manual",
            NetworkKind::Vip { .. } => "vip",
        }
    }

    /// Manual subnets; empty for other kinds
    pub fn subnets(&self) -> &[Subnet] {
        match &self.kind {
            NetworkKind::Manual { subnets } => subnets,
            _ => &[],
        }
    }

    /// The manual subnet whose range holds `ip`
    pub fn find_subnet_containing(&self, ip: IpAddr) -> Option<&Subnet> {
        self.subnets().iter().find(|subnet| subnet.contains(ip))
    }

    /// Whether the director hands out addresses from VIP pools
    pub fn globally_allocates_vips(&self) -> bool {
        matches!(&self.kind, NetworkKind::Vip { subnets } if !subnets.is_empty())
    }

    /// Validate every subnet of the network
    pub fn validate(&self) -> Result<()> {
        for subnet in self.subnets() {
            subnet.validate()?;
        }
        Ok(())
    }
}
