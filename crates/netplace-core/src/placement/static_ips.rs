//! Static IPs of one instance group, each paired with the AZs it can live in.
//!
//! An IP's candidate AZs are those of the subnet holding it. Placement
//! claims IPs one by one; a claimed IP is pinned to a single AZ so later
//! distribution counts it where it already is.

use std::collections::BTreeSet;
use std::net::IpAddr;

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::JobNetwork;
use super::brute_force::BruteForceIpAllocation;
use crate::error::{Error, Result};
use crate::network::NetworkKind;

/// One static IP and the AZs it may be placed in
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StaticIpToAzs {
    pub ip: IpAddr,
    pub az_names: BTreeSet<String>,
    /// Taken by an instance
    #[serde(default)]
    pub claimed: bool,
    /// False when no subnet of the network holds the IP
    #[serde(default = "default_true")]
    pub subnet_matched: bool,
}

fn default_true() -> bool {
    true
}

impl StaticIpToAzs {
    pub fn new<S: Into<String>>(ip: IpAddr, az_names: impl IntoIterator<Item = S>) -> Self {
        Self {
            ip,
            az_names: az_names.into_iter().map(Into::into).collect(),
            claimed: false,
            subnet_matched: true,
        }
    }

    /// An IP no subnet holds
    pub fn unmatched(ip: IpAddr) -> Self {
        Self {
            ip,
            az_names: BTreeSet::new(),
            claimed: false,
            subnet_matched: false,
        }
    }

    /// The AZ once the candidates are narrowed to exactly one
    pub fn az(&self) -> Option<&str> {
        match self.az_names.len() {
            1 => self.az_names.iter().next().map(String::as_str),
            _ => None,
        }
    }

    pub(crate) fn narrowed_to(&self, az: &str) -> Self {
        Self {
            az_names: BTreeSet::from([az.to_string()]),
            ..self.clone()
        }
    }

    fn narrowed_to_desired(&self, desired_azs: &[String]) -> Self {
        Self {
            az_names: self
                .az_names
                .iter()
                .filter(|az| desired_azs.contains(az))
                .cloned()
                .collect(),
            ..self.clone()
        }
    }

    fn serves(&self, az: Option<&str>) -> bool {
        match az {
            Some(az) => self.az_names.contains(az),
            None => self.az_names.is_empty(),
        }
    }
}

/// Static IPs declared on one network, in declaration order
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkStaticIps {
    pub network_name: String,
    pub ips: Vec<StaticIpToAzs>,
}

/// Network to static IP candidates for one instance group
#[derive(Debug, Clone)]
pub struct NetworksToStaticIps {
    instance_group: String,
    networks: Vec<NetworkStaticIps>,
}

impl NetworksToStaticIps {
    /// Pair every static IP of `job_networks` with its subnet's AZs
    ///
    /// # Parameters
    ///
    /// - `instance_group`: Name used in error messages
    /// - `job_networks`: The group's networks; those without static IPs are skipped
    /// - `desired_azs`: The group's AZs; VIPs from pools without AZs may go to any of them
    pub fn create(instance_group: impl Into<String>, job_networks: &[JobNetwork], desired_azs: &[String]) -> Self {
        let networks = job_networks
            .iter()
            .filter(|job_network| job_network.is_static())
            .map(|job_network| NetworkStaticIps {
                network_name: job_network.name().to_string(),
                ips: job_network
                    .static_ips
                    .iter()
                    .map(|ip| candidates_for(job_network, *ip, desired_azs))
                    .collect(),
            })
            .collect();

        Self {
            instance_group: instance_group.into(),
            networks,
        }
    }

    /// Build directly from candidate lists
    pub fn from_networks(instance_group: impl Into<String>, networks: Vec<NetworkStaticIps>) -> Self {
        Self {
            instance_group: instance_group.into(),
            networks,
        }
    }

    pub fn instance_group(&self) -> &str {
        &self.instance_group
    }

    /// Networks with static IPs, in declaration order
    pub fn networks(&self) -> &[NetworkStaticIps] {
        &self.networks
    }

    pub fn is_empty(&self) -> bool {
        self.networks.is_empty()
    }

    /// Subnets declaring AZs while the instance group declares none leaves
    /// no way to choose between them
    pub fn validate_azs_are_declared_in_job_and_subnets(&self, desired_azs: &[String]) -> Result<()> {
        if !desired_azs.is_empty() {
            return Ok(());
        }
        if self.all_ips().any(|ip| !ip.az_names.is_empty()) {
            return Err(Error::placement(format!(
                "Instance group '{}' subnets declare availability zones and the instance group does not",
                self.instance_group
            )));
        }
        Ok(())
    }

    /// Every static IP must be reachable from at least one desired AZ
    ///
    /// IPs held by no subnet are reported by [`Self::next_ip_for_network`]
    /// and [`Self::distribute_evenly_per_zone`] instead.
    pub fn validate_ips_are_in_desired_azs(&self, desired_azs: &[String]) -> Result<()> {
        if desired_azs.is_empty() {
            return Ok(());
        }
        for ip in self.all_ips().filter(|ip| ip.subnet_matched) {
            if !ip.az_names.iter().any(|az| desired_azs.contains(az)) {
                return Err(Error::placement(format!(
                    "Instance group '{}' declares static ip '{}' which belongs to no desired availability zone",
                    self.instance_group, ip.ip
                )));
            }
        }
        Ok(())
    }

    /// First unclaimed IP of `network_name`, its candidates narrowed to
    /// `desired_azs` (left as is when the group declares no AZs)
    pub fn next_ip_for_network(&self, network_name: &str, desired_azs: &[String]) -> Result<Option<StaticIpToAzs>> {
        let Some(ip) = self.ips_of(network_name).iter().find(|ip| !ip.claimed) else {
            return Ok(None);
        };
        if !ip.subnet_matched {
            return Err(self.no_subnet_error(network_name, ip.ip));
        }
        if desired_azs.is_empty() {
            return Ok(Some(ip.clone()));
        }
        Ok(Some(ip.narrowed_to_desired(desired_azs)))
    }

    /// First unclaimed IP of `network_name` placeable in `az`. Without an
    /// AZ only IPs whose subnet declares none qualify.
    pub fn find_by_network_and_az(&self, network_name: &str, az: Option<&str>) -> Option<&StaticIpToAzs> {
        self.ips_of(network_name)
            .iter()
            .find(|ip| !ip.claimed && ip.subnet_matched && ip.serves(az))
    }

    pub fn find_by_network_and_ip(&self, network_name: &str, ip: IpAddr) -> Option<&StaticIpToAzs> {
        self.ips_of(network_name).iter().find(|candidate| candidate.ip == ip)
    }

    /// Pin `ip` on `network_name` to `az` and take it out of circulation
    pub fn claim_in_az(&mut self, network_name: &str, ip: IpAddr, az: Option<&str>) {
        if let Some(entry) = self.ips_of_mut(network_name).iter_mut().find(|candidate| candidate.ip == ip) {
            entry.claimed = true;
            entry.az_names = az.map(|az| BTreeSet::from([az.to_string()])).unwrap_or_default();
            debug!(network = %network_name, ip = %ip, az = ?az, "Claimed static IP");
        }
    }

    /// Drop `ip` from `network_name`
    pub fn delete(&mut self, network_name: &str, ip: IpAddr) {
        if let Some(network) = self.networks.iter_mut().find(|n| n.network_name == network_name) {
            network.ips.retain(|candidate| candidate.ip != ip);
        }
    }

    /// Fix every IP to a single AZ so each network spreads evenly and per-AZ
    /// totals match across networks
    ///
    /// Does nothing when the group declares no AZs.
    pub fn distribute_evenly_per_zone(
        &mut self,
        desired_azs: &[String],
        search: &BruteForceIpAllocation,
    ) -> Result<()> {
        if desired_azs.is_empty() {
            return Ok(());
        }

        for network in &self.networks {
            if let Some(ip) = network.ips.iter().find(|ip| !ip.subnet_matched) {
                return Err(self.no_subnet_error(&network.network_name, ip.ip));
            }
        }

        let narrowed: Vec<NetworkStaticIps> = self
            .networks
            .iter()
            .map(|network| NetworkStaticIps {
                network_name: network.network_name.clone(),
                ips: network
                    .ips
                    .iter()
                    .map(|ip| ip.narrowed_to_desired(desired_azs))
                    .collect(),
            })
            .collect();

        match search.find_best_combination(&narrowed) {
            Some(best) => {
                debug!(instance_group = %self.instance_group, "Distributed static IPs across zones");
                self.networks = best;
                Ok(())
            }
            None => Err(Error::placement(format!(
                "Failed to evenly distribute static IPs between zones for instance group '{}'",
                self.instance_group
            ))),
        }
    }

    fn all_ips(&self) -> impl Iterator<Item = &StaticIpToAzs> {
        self.networks.iter().flat_map(|network| network.ips.iter())
    }

    fn ips_of(&self, network_name: &str) -> &[StaticIpToAzs] {
        self.networks
            .iter()
            .find(|network| network.network_name == network_name)
            .map(|network| network.ips.as_slice())
            .unwrap_or(&[])
    }

    fn ips_of_mut(&mut self, network_name: &str) -> &mut [StaticIpToAzs] {
        match self
            .networks
            .iter_mut()
            .find(|network| network.network_name == network_name)
        {
            Some(network) => network.ips.as_mut_slice(),
            None => &mut [],
        }
    }

    fn no_subnet_error(&self, network_name: &str, ip: IpAddr) -> Error {
        Error::placement(format!(
            "Instance group '{}' with network '{}' declares static ip '{}', which belongs to no subnet",
            self.instance_group, network_name, ip
        ))
    }
}

fn candidates_for(job_network: &JobNetwork, ip: IpAddr, desired_azs: &[String]) -> StaticIpToAzs {
    match &job_network.network.kind {
        NetworkKind::Manual { subnets } => match subnets.iter().find(|subnet| subnet.is_static(ip)) {
            Some(subnet) => StaticIpToAzs::new(ip, subnet.az_names.iter().cloned()),
            None => StaticIpToAzs::unmatched(ip),
        },
        NetworkKind::Vip { subnets } => {
            match subnets.iter().find(|pool| pool.static_ips.contains(&ip)) {
                Some(pool) if !pool.az_names.is_empty() => StaticIpToAzs::new(ip, pool.az_names.iter().cloned()),
                _ => StaticIpToAzs::new(ip, desired_azs.iter().cloned()),
            }
        }
        NetworkKind::Dynamic { .. } => StaticIpToAzs::unmatched(ip),
    }
}
