//! Subnet descriptors handed to the engine by the deployment plan.

use std::collections::BTreeSet;
use std::net::IpAddr;

use ipnetwork::IpNetwork;
use serde::{Deserialize, Serialize};

use super::addr::{self, AddrBlock};
use crate::error::{Error, Result};

/// A manual-network subnet
///
/// `static_ips` and `restricted_ips` are disjoint and both excluded from
/// dynamic allocation. Construction always restricts the gateway and, for
/// IPv4, the network and broadcast addresses.
///
/// # Example
///
/// ```rust
/// use netplace_core::network::Subnet;
///
/// let subnet = Subnet::new("private", "10.0.0.0/24".parse().unwrap())
///     .with_gateway("10.0.0.1".parse().unwrap())
///     .with_static_ips(["10.0.0.5".parse().unwrap()])
///     .with_azs(["z1"]);
/// assert!(subnet.validate().is_ok());
/// assert!(subnet.is_restricted("10.0.0.1".parse().unwrap()));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subnet {
    /// Name of the owning network
    pub network_name: String,
    /// CIDR range
    pub range: IpNetwork,
    /// Gateway address (always restricted)
    pub gateway: Option<IpAddr>,
    /// Allocation prefix for prefix-delegating subnets; `None` hands out
    /// single addresses
    pub prefix: Option<u8>,
    /// Operator-pinned addresses
    pub static_ips: BTreeSet<IpAddr>,
    /// Addresses never handed out
    pub restricted_ips: BTreeSet<IpAddr>,
    /// AZs this subnet is reachable from
    pub az_names: BTreeSet<String>,
}

impl Subnet {
    /// Create a subnet over `range`
    pub fn new(network_name: impl Into<String>, range: IpNetwork) -> Self {
        let range = IpNetwork::new(range.network(), range.prefix()).unwrap_or(range);
        let mut restricted_ips = BTreeSet::new();
        if range.is_ipv4() {
            restricted_ips.insert(range.network());
            restricted_ips.insert(range.broadcast());
        }
        Self {
            network_name: network_name.into(),
            range,
            gateway: None,
            prefix: None,
            static_ips: BTreeSet::new(),
            restricted_ips,
            az_names: BTreeSet::new(),
        }
    }

    /// Set the gateway
    pub fn with_gateway(mut self, gateway: IpAddr) -> Self {
        self.gateway = Some(gateway);
        self.restricted_ips.insert(gateway);
        self
    }

    /// Add addresses to the static pool
    pub fn with_static_ips(mut self, ips: impl IntoIterator<Item = IpAddr>) -> Self {
        self.static_ips.extend(ips);
        self
    }

    /// Add restricted addresses
    pub fn with_restricted_ips(mut self, ips: impl IntoIterator<Item = IpAddr>) -> Self {
        self.restricted_ips.extend(ips);
        self
    }

    /// Add availability zones
    pub fn with_azs<S: Into<String>>(mut self, azs: impl IntoIterator<Item = S>) -> Self {
        self.az_names.extend(azs.into_iter().map(Into::into));
        self
    }

    /// Hand out `/prefix` blocks instead of single addresses
    pub fn with_prefix(mut self, prefix: u8) -> Self {
        self.prefix = Some(prefix);
        self
    }

    /// Validate the subnet
    pub fn validate(&self) -> Result<()> {
        let max = addr::max_prefix(self.range.is_ipv4());
        if let Some(prefix) = self.prefix {
            if prefix < self.range.prefix() || prefix > max {
                return Err(Error::config(format!(
                    "Subnet '{}' on network '{}' has prefix /{} outside /{}../{}",
                    self.range,
                    self.network_name,
                    prefix,
                    self.range.prefix(),
                    max
                )));
            }
        }

        if let Some(gateway) = self.gateway {
            if !self.range.contains(gateway) {
                return Err(Error::config(format!(
                    "Gateway '{}' is outside subnet '{}' on network '{}'",
                    gateway, self.range, self.network_name
                )));
            }
        }

        for ip in &self.static_ips {
            if !self.range.contains(*ip) {
                return Err(Error::config(format!(
                    "Static IP '{}' is outside subnet '{}' on network '{}'",
                    ip, self.range, self.network_name
                )));
            }
            if self.restricted_ips.contains(ip) {
                return Err(Error::config(format!(
                    "Static IP '{}' is in the reserved range of subnet '{}' on network '{}'",
                    ip, self.range, self.network_name
                )));
            }
        }

        Ok(())
    }

    /// Whether `ip` lies inside the range
    pub fn contains(&self, ip: IpAddr) -> bool {
        self.range.contains(ip)
    }

    /// Whether `ip` is in the static pool
    pub fn is_static(&self, ip: IpAddr) -> bool {
        self.static_ips.contains(&ip)
    }

    /// Whether `ip` is restricted
    pub fn is_restricted(&self, ip: IpAddr) -> bool {
        self.restricted_ips.contains(&ip)
    }

    /// Whether an instance in `az` may use this subnet.
    /// Instances without an AZ may use any subnet.
    pub fn serves_az(&self, az: Option<&str>) -> bool {
        match az {
            Some(az) => self.az_names.contains(az),
            None => true,
        }
    }

    pub fn is_ipv4(&self) -> bool {
        self.range.is_ipv4()
    }

    /// Prefix of allocated blocks
    pub fn allocation_prefix(&self) -> u8 {
        self.prefix
            .unwrap_or_else(|| addr::max_prefix(self.range.is_ipv4()))
    }

    pub(crate) fn block(&self) -> AddrBlock {
        AddrBlock::of(&self.range)
    }
}

/// A vip-network subnet: a pool of director-managed virtual IPs
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VipSubnet {
    pub network_name: String,
    /// The VIP pool
    pub static_ips: BTreeSet<IpAddr>,
    pub az_names: BTreeSet<String>,
}

impl VipSubnet {
    pub fn new(network_name: impl Into<String>, ips: impl IntoIterator<Item = IpAddr>) -> Self {
        Self {
            network_name: network_name.into(),
            static_ips: ips.into_iter().collect(),
            az_names: BTreeSet::new(),
        }
    }

    pub fn with_azs<S: Into<String>>(mut self, azs: impl IntoIterator<Item = S>) -> Self {
        self.az_names.extend(azs.into_iter().map(Into::into));
        self
    }

    /// Same AZ rule as [`Subnet::serves_az`], except that a pool declaring
    /// no AZs serves every instance
    pub fn serves_az(&self, az: Option<&str>) -> bool {
        match az {
            Some(az) => self.az_names.is_empty() || self.az_names.contains(az),
            None => true,
        }
    }
}
