//! AZ placement for instance groups with static IPs.
//!
//! Each static IP can only live in the AZs of its subnet, so AZs follow
//! from the IPs rather than from balancing alone:
//!
//! 1. Existing instances holding declared static IPs keep them (and their AZ)
//! 2. Other existing instances are reused when their AZ still has a free IP
//!    on every static network
//! 3. Kept instances missing an IP on some network get one from their AZ
//! 4. The remaining IPs are pinned to AZs by [`BruteForceIpAllocation`]
//! 5. New instances take the remaining IPs
//!
//! Ignored instances must keep their networks and static IPs, and may not
//! become obsolete.

use std::net::IpAddr;

use tracing::debug;

use super::brute_force::BruteForceIpAllocation;
use super::counters::PlacedDesiredInstances;
use super::static_ips::NetworksToStaticIps;
use super::{DesiredInstance, ExistingInstance, InstancePlan, JobNetwork, assign_indexes};
use crate::error::{Error, Result};

/// Places an instance group whose networks pin static IPs
pub struct StaticIpsAvailabilityZonePicker {
    instance_group: String,
    job_networks: Vec<JobNetwork>,
    desired_azs: Vec<String>,
    statics: NetworksToStaticIps,
    search: BruteForceIpAllocation,
}

impl StaticIpsAvailabilityZonePicker {
    /// Create a picker for one instance group
    ///
    /// # Parameters
    ///
    /// - `instance_group`: Name used in messages
    /// - `job_networks`: Every network of the group; only static ones matter here
    /// - `desired_azs`: The group's AZs, empty when it declares none
    /// - `search`: Search used to pin IPs to AZs
    pub fn new(
        instance_group: impl Into<String>,
        job_networks: &[JobNetwork],
        desired_azs: Vec<String>,
        search: BruteForceIpAllocation,
    ) -> Self {
        let instance_group = instance_group.into();
        let statics = NetworksToStaticIps::create(instance_group.clone(), job_networks, &desired_azs);
        Self {
            instance_group,
            job_networks: job_networks.to_vec(),
            desired_azs,
            statics,
            search,
        }
    }

    /// Match `desired_count` desired instances against `existing`
    ///
    /// Every non-obsolete plan carries one static IP per static network in
    /// its desired instance.
    pub fn place_and_match_in(mut self, desired_count: usize, mut existing: Vec<ExistingInstance>) -> Result<Vec<InstancePlan>> {
        self.statics
            .validate_azs_are_declared_in_job_and_subnets(&self.desired_azs)?;
        self.statics.validate_ips_are_in_desired_azs(&self.desired_azs)?;
        self.validate_ignored_instances(&existing)?;

        existing.sort_by_key(|instance| instance.index);
        let networks = self.static_network_names();
        let mut remaining = desired_count;
        let mut placed = PlacedDesiredInstances::new(&self.desired_azs);
        let mut obsolete = Vec::new();
        let mut others = Vec::new();

        for instance in existing {
            let held = self.declared_ips_held_by(&instance, &networks);
            if held.is_empty() {
                others.push(instance);
                continue;
            }
            if remaining == 0 {
                debug!(instance = %instance.name(&self.instance_group), "Marking instance as obsolete");
                for (network, ip) in &held {
                    self.statics.delete(network, *ip);
                }
                obsolete.push(instance);
                continue;
            }

            let desired = self.keep_static_ips(&instance, &held)?;
            remaining -= 1;
            placed.record_with(desired, Some(instance));
        }
        let kept = placed.len();

        for instance in others {
            if remaining == 0 {
                debug!(instance = %instance.name(&self.instance_group), "Marking instance as obsolete");
                obsolete.push(instance);
                continue;
            }
            let Some(az) = self.reusable_az(&instance, &networks) else {
                debug!(
                    instance = %instance.name(&self.instance_group),
                    "Marking instance as obsolete, not enough IPs in instance az"
                );
                obsolete.push(instance);
                continue;
            };

            debug!(instance = %instance.name(&self.instance_group), "Reusing instance with new IPs");
            let mut desired = DesiredInstance::new(az);
            for network in &networks {
                self.claim_ip_in_az(&mut desired, network)?;
            }
            remaining -= 1;
            placed.record_with(desired, Some(instance));
        }

        for plan in placed.plans_mut().iter_mut().take(kept) {
            if let InstancePlan::Existing { desired, .. } = plan {
                for network in &networks {
                    if !desired.static_ips.contains_key(network) {
                        self.claim_ip_in_az(desired, network)?;
                    }
                }
            }
        }

        self.statics
            .distribute_evenly_per_zone(&self.desired_azs, &self.search)?;

        for _ in 0..remaining {
            let desired = self.place_new_instance(&placed, &networks)?;
            placed.record_with(desired, None);
        }

        let mut plans = placed.into_plans();
        if obsolete.iter().any(|instance| instance.ignore) {
            return Err(self.ignored_static_ip_removed());
        }
        plans.extend(obsolete.into_iter().map(|existing| InstancePlan::Obsolete { existing }));
        assign_indexes(&mut plans);
        Ok(plans)
    }

    /// Ignored instances keep exactly their networks and declared static IPs
    fn validate_ignored_instances(&self, existing: &[ExistingInstance]) -> Result<()> {
        let mut desired_networks: Vec<&str> = self.job_networks.iter().map(JobNetwork::name).collect();
        desired_networks.sort_unstable();
        desired_networks.dedup();

        for instance in existing.iter().filter(|instance| instance.ignore) {
            let held_networks: Vec<&str> = instance
                .ips
                .iter()
                .filter(|(_, ips)| !ips.is_empty())
                .map(|(network, _)| network.as_str())
                .collect();
            if held_networks != desired_networks {
                return Err(Error::placement(format!(
                    "In instance group '{}', which contains ignored vms, an attempt was made to modify the networks. \
                    This operation is not allowed.",
                    self.instance_group
                )));
            }

            for network in self.job_networks.iter().filter(|network| network.is_static()) {
                let held = instance.ips.get(network.name()).into_iter().flatten();
                if held.into_iter().any(|ip| !network.static_ips.contains(ip)) {
                    return Err(self.ignored_static_ip_removed());
                }
            }
        }
        Ok(())
    }

    fn static_network_names(&self) -> Vec<String> {
        self.statics
            .networks()
            .iter()
            .map(|network| network.network_name.clone())
            .collect()
    }

    /// Declared static IPs `instance` holds, in network order
    fn declared_ips_held_by(&self, instance: &ExistingInstance, networks: &[String]) -> Vec<(String, IpAddr)> {
        let mut held = Vec::new();
        for network in networks {
            for ip in instance.ips.get(network).into_iter().flatten() {
                if self.statics.find_by_network_and_ip(network, *ip).is_some() {
                    debug!(
                        instance = %instance.name(&self.instance_group),
                        network = %network,
                        ip = %ip,
                        "Existing instance is using static IP"
                    );
                    held.push((network.clone(), *ip));
                }
            }
        }
        held
    }

    /// Keep `instance` in its AZ with the static IPs it holds
    ///
    /// The AZ must be one the first held IP may live in. Further IPs outside
    /// that AZ, or a second IP on the same network, go back to the pool.
    fn keep_static_ips(&mut self, instance: &ExistingInstance, held: &[(String, IpAddr)]) -> Result<DesiredInstance> {
        let Some((first_network, first_ip)) = held.first() else {
            return Ok(DesiredInstance::new(instance.az.clone()));
        };

        let eligible = self
            .statics
            .find_by_network_and_ip(first_network, *first_ip)
            .map(|candidate| candidate.az_names.clone())
            .unwrap_or_default();
        let az = match instance.az.as_deref() {
            None if self.desired_azs.is_empty() => None,
            Some(az) if eligible.contains(az) && self.desired_azs.iter().any(|desired| desired == az) => {
                debug!(
                    instance = %instance.name(&self.instance_group),
                    az = %az,
                    "Instance belongs to az that is in subnet az list, reusing instance az"
                );
                Some(az.to_string())
            }
            _ => {
                return Err(Error::placement(format!(
                    "Existing instance '{}' is using IP '{}' in availability zone '{}'",
                    instance.name(&self.instance_group),
                    first_ip,
                    instance.az.as_deref().unwrap_or("none")
                )));
            }
        };

        let mut desired = DesiredInstance::new(az.clone());
        for (network, ip) in held {
            if desired.static_ips.contains_key(network) {
                continue;
            }
            let fits = self
                .statics
                .find_by_network_and_ip(network, *ip)
                .is_some_and(|candidate| {
                    !candidate.claimed
                        && match az.as_deref() {
                            Some(az) => candidate.az_names.contains(az),
                            None => candidate.az_names.is_empty(),
                        }
                });
            if fits {
                self.statics.claim_in_az(network, *ip, az.as_deref());
                desired.static_ips.insert(network.clone(), *ip);
            }
        }
        Ok(desired)
    }

    /// The AZ `instance` can be reused in, if every static network still
    /// has a free IP there
    fn reusable_az(&self, instance: &ExistingInstance, networks: &[String]) -> Option<Option<String>> {
        let az = if self.desired_azs.is_empty() {
            None
        } else {
            match instance.az.as_deref() {
                Some(az) if self.desired_azs.iter().any(|desired| desired == az) => Some(az.to_string()),
                _ => return None,
            }
        };

        networks
            .iter()
            .all(|network| {
                self.statics
                    .find_by_network_and_az(network, az.as_deref())
                    .is_some()
            })
            .then_some(az)
    }

    fn claim_ip_in_az(&mut self, desired: &mut DesiredInstance, network: &str) -> Result<()> {
        let ip = self
            .statics
            .find_by_network_and_az(network, desired.az.as_deref())
            .map(|candidate| candidate.ip)
            .ok_or_else(|| self.distribution_error())?;

        debug!(network = %network, ip = %ip, az = ?desired.az, "Claiming static IP");
        self.statics.claim_in_az(network, ip, desired.az.as_deref());
        desired.static_ips.insert(network.to_string(), ip);
        Ok(())
    }

    fn place_new_instance(&mut self, placed: &PlacedDesiredInstances, networks: &[String]) -> Result<DesiredInstance> {
        let Some((first, rest)) = networks.split_first() else {
            return Ok(DesiredInstance::new(None));
        };

        let candidate = self
            .statics
            .next_ip_for_network(first, &self.desired_azs)?
            .ok_or_else(|| self.distribution_error())?;
        let az = match candidate.az_names.len() {
            0 => None,
            1 => candidate.az().map(str::to_string),
            _ => placed
                .azs_with_fewest_instances(&candidate.az_names)
                .into_iter()
                .next(),
        };
        debug!(ip = %candidate.ip, az = ?az, "Assigning az to new instance");

        let mut desired = DesiredInstance::new(az);
        self.statics
            .claim_in_az(first, candidate.ip, desired.az.as_deref());
        desired.static_ips.insert(first.clone(), candidate.ip);
        for network in rest {
            self.claim_ip_in_az(&mut desired, network)?;
        }
        Ok(desired)
    }

    fn ignored_static_ip_removed(&self) -> Error {
        Error::placement(format!(
            "In instance group '{}', an attempt was made to remove a static ip that is used by an ignored instance. \
            This operation is not allowed.",
            self.instance_group
        ))
    }

    fn distribution_error(&self) -> Error {
        Error::placement(format!(
            "Failed to distribute static IPs to satisfy existing instance reservations in instance group '{}'",
            self.instance_group
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::{Network, Subnet, parse_ip_list};

    fn ip(s: &str) -> IpAddr {
        s.parse().unwrap()
    }

    fn subnet(network: &str, range: &str, statics: &str, azs: &[&str]) -> Subnet {
        Subnet::new(network, range.parse().unwrap())
            .with_static_ips(parse_ip_list(&[statics]).unwrap())
            .with_azs(azs.iter().copied())
    }

    fn two_zone_networks() -> (Network, Network) {
        (
            Network::manual(
                "a",
                vec![
                    subnet("a", "192.168.1.0/24", "192.168.1.10 - 192.168.1.14", &["zone1"]),
                    subnet("a", "192.168.2.0/24", "192.168.2.10 - 192.168.2.14", &["zone2"]),
                ],
            ),
            Network::manual(
                "b",
                vec![
                    subnet("b", "10.10.1.0/24", "10.10.1.10 - 10.10.1.14", &["zone1"]),
                    subnet("b", "10.10.2.0/24", "10.10.2.10 - 10.10.2.14", &["zone2"]),
                ],
            ),
        )
    }

    fn zones(names: &[&str]) -> Vec<String> {
        names.iter().map(|name| name.to_string()).collect()
    }

    fn picker(networks: &[JobNetwork], azs: &[&str]) -> StaticIpsAvailabilityZonePicker {
        StaticIpsAvailabilityZonePicker::new("web", networks, zones(azs), BruteForceIpAllocation::default())
    }

    fn existing(index: u32, az: Option<&str>, ips: &[(&str, &str)]) -> ExistingInstance {
        let mut instance = ExistingInstance::new(format!("vm-{}", index), index);
        instance.az = az.map(str::to_string);
        for (network, address) in ips {
            instance = instance.with_ip(*network, ip(address));
        }
        instance
    }

    #[test]
    fn test_new_instances_follow_their_ips() {
        let (a, _) = two_zone_networks();
        let networks = vec![JobNetwork::new(a).with_static_ips([ip("192.168.1.10"), ip("192.168.2.10"), ip("192.168.1.11")])];
        let plans = picker(&networks, &["zone1", "zone2"]).place_and_match_in(3, vec![]).unwrap();

        let mut placements: Vec<(Option<&str>, IpAddr)> = plans
            .iter()
            .map(|plan| (plan.az(), plan.desired().unwrap().static_ips["a"]))
            .collect();
        placements.sort();
        assert_eq!(
            placements,
            vec![
                (Some("zone1"), ip("192.168.1.10")),
                (Some("zone1"), ip("192.168.1.11")),
                (Some("zone2"), ip("192.168.2.10")),
            ]
        );
    }

    #[test]
    fn test_overlapping_zones_across_four_networks() {
        let networks = vec![
            JobNetwork::new(Network::manual(
                "a",
                vec![
                    subnet("a", "192.168.1.0/24", "192.168.1.10 - 192.168.1.14", &["z1", "z2", "z3"]),
                    subnet("a", "192.168.2.0/24", "192.168.2.10 - 192.168.2.14", &["z4"]),
                ],
            ))
            .with_static_ips(parse_ip_list(&["192.168.1.10 - 192.168.1.12", "192.168.2.10"]).unwrap()),
            JobNetwork::new(Network::manual(
                "b",
                vec![
                    subnet("b", "10.10.1.0/24", "10.10.1.10 - 10.10.1.14", &["z1", "z2"]),
                    subnet("b", "10.10.2.0/24", "10.10.2.10 - 10.10.2.14", &["z3", "z4"]),
                ],
            ))
            .with_static_ips(parse_ip_list(&["10.10.1.10 - 10.10.1.11", "10.10.2.10 - 10.10.2.11"]).unwrap()),
            JobNetwork::new(Network::manual(
                "c",
                vec![
                    subnet("c", "172.16.1.0/24", "172.16.1.10 - 172.16.1.14", &["z1"]),
                    subnet("c", "172.16.2.0/24", "172.16.2.10 - 172.16.2.14", &["z2", "z3", "z4"]),
                ],
            ))
            .with_static_ips(parse_ip_list(&["172.16.1.10", "172.16.2.10 - 172.16.2.12"]).unwrap()),
            JobNetwork::new(Network::manual(
                "d",
                vec![
                    subnet("d", "64.8.1.0/24", "64.8.1.10 - 64.8.1.14", &["z1"]),
                    subnet("d", "64.8.2.0/24", "64.8.2.10 - 64.8.2.14", &["z2"]),
                    subnet("d", "64.8.3.0/24", "64.8.3.10 - 64.8.3.14", &["z3", "z4"]),
                ],
            ))
            .with_static_ips(parse_ip_list(&["64.8.1.10", "64.8.2.10", "64.8.3.10 - 64.8.3.11"]).unwrap()),
        ];

        let plans = picker(&networks, &["z1", "z2", "z3", "z4"]).place_and_match_in(4, vec![]).unwrap();
        assert!(plans.iter().all(InstancePlan::is_new));

        let mut azs: Vec<&str> = plans.iter().filter_map(InstancePlan::az).collect();
        azs.sort();
        assert_eq!(azs, vec!["z1", "z2", "z3", "z4"]);

        for plan in &plans {
            let desired = plan.desired().unwrap();
            assert_eq!(desired.static_ips.len(), 4);
            for (network, address) in &desired.static_ips {
                let job_network = networks.iter().find(|n| n.name() == network).unwrap();
                let subnet = job_network.network.find_subnet_containing(*address).unwrap();
                assert!(subnet.az_names.contains(desired.az.as_deref().unwrap()));
            }
        }
    }

    #[test]
    fn test_mismatched_zone_counts_fail() {
        let (a, b) = two_zone_networks();
        let networks = vec![
            JobNetwork::new(a).with_static_ips([ip("192.168.1.10"), ip("192.168.2.10")]),
            JobNetwork::new(b).with_static_ips([ip("10.10.1.10"), ip("10.10.1.11")]),
        ];
        let err = picker(&networks, &["zone1", "zone2"]).place_and_match_in(2, vec![]).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Placement error: Failed to evenly distribute static IPs between zones for instance group 'web'"
        );
    }

    #[test]
    fn test_existing_instances_keep_their_ips() {
        let (a, _) = two_zone_networks();
        let networks = vec![JobNetwork::new(a).with_static_ips([ip("192.168.1.10"), ip("192.168.2.10")])];
        let plans = picker(&networks, &["zone1", "zone2"])
            .place_and_match_in(
                2,
                vec![
                    existing(0, Some("zone1"), &[("a", "192.168.1.10")]),
                    existing(1, Some("zone2"), &[("a", "192.168.2.10")]),
                ],
            )
            .unwrap();

        assert!(plans.iter().all(InstancePlan::is_existing));
        assert_eq!(plans[0].az(), Some("zone1"));
        assert_eq!(plans[0].desired().unwrap().static_ips["a"], ip("192.168.1.10"));
        assert_eq!(plans[1].az(), Some("zone2"));
        assert_eq!(plans[1].desired().unwrap().static_ips["a"], ip("192.168.2.10"));
    }

    #[test]
    fn test_ip_moved_to_another_zone_fails() {
        let a = Network::manual(
            "a",
            vec![
                subnet("a", "192.168.1.0/24", "192.168.1.10 - 192.168.1.14", &["zone1"]),
                subnet("a", "192.168.2.0/24", "192.168.2.10 - 192.168.2.14", &["zone1"]),
            ],
        );
        let networks = vec![JobNetwork::new(a).with_static_ips([ip("192.168.1.10"), ip("192.168.2.10")])];
        let err = picker(&networks, &["zone1"])
            .place_and_match_in(
                2,
                vec![
                    existing(0, Some("zone1"), &[("a", "192.168.1.10")]),
                    existing(1, Some("zone2"), &[("a", "192.168.2.10")]),
                ],
            )
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "Placement error: Existing instance 'web/1' is using IP '192.168.2.10' in availability zone 'zone2'"
        );
    }

    #[test]
    fn test_changed_ips_reuse_instances_in_same_zone() {
        let (a, _) = two_zone_networks();
        let networks = vec![JobNetwork::new(a).with_static_ips([ip("192.168.1.14"), ip("192.168.2.14")])];
        let plans = picker(&networks, &["zone1", "zone2"])
            .place_and_match_in(
                2,
                vec![
                    existing(0, Some("zone1"), &[("a", "192.168.1.10")]),
                    existing(1, Some("zone2"), &[("a", "192.168.2.10")]),
                ],
            )
            .unwrap();

        assert!(plans.iter().all(InstancePlan::is_existing));
        assert_eq!(plans[0].desired().unwrap().static_ips["a"], ip("192.168.1.14"));
        assert_eq!(plans[1].desired().unwrap().static_ips["a"], ip("192.168.2.14"));
    }

    #[test]
    fn test_changed_zone_recreates_instance() {
        let (a, _) = two_zone_networks();
        let networks = vec![JobNetwork::new(a).with_static_ips([ip("192.168.1.14"), ip("192.168.1.13")])];
        let plans = picker(&networks, &["zone1", "zone2"])
            .place_and_match_in(
                2,
                vec![
                    existing(0, Some("zone1"), &[("a", "192.168.1.10")]),
                    existing(1, Some("zone2"), &[("a", "192.168.2.10")]),
                ],
            )
            .unwrap();

        let obsolete: Vec<u32> = plans
            .iter()
            .filter(|plan| plan.is_obsolete())
            .map(|plan| plan.existing().unwrap().index)
            .collect();
        assert_eq!(obsolete, vec![1]);

        let new: Vec<&InstancePlan> = plans.iter().filter(|plan| plan.is_new()).collect();
        assert_eq!(new.len(), 1);
        assert_eq!(new[0].az(), Some("zone1"));
        assert_eq!(new[0].desired().unwrap().static_ips["a"], ip("192.168.1.13"));
        assert_eq!(new[0].desired().unwrap().index, Some(2));
    }

    #[test]
    fn test_scale_down_releases_static_ips() {
        let (a, b) = two_zone_networks();
        let networks = vec![
            JobNetwork::new(a).with_static_ips([ip("192.168.1.10")]),
            JobNetwork::new(b).with_static_ips([ip("10.10.1.10")]),
        ];
        let plans = picker(&networks, &["zone1", "zone2"])
            .place_and_match_in(
                1,
                vec![
                    existing(0, Some("zone1"), &[("a", "192.168.1.10"), ("b", "10.10.1.10")]),
                    existing(1, Some("zone2"), &[("a", "192.168.2.10"), ("b", "10.10.2.10")]),
                ],
            )
            .unwrap();

        assert_eq!(plans.len(), 2);
        assert!(plans[0].is_existing());
        assert_eq!(plans[0].desired().unwrap().static_ips.len(), 2);
        assert!(plans[1].is_obsolete());
    }

    #[test]
    fn test_no_zones_anywhere() {
        let a = Network::manual("a", vec![subnet("a", "192.168.1.0/24", "192.168.1.10 - 192.168.1.14", &[])]);
        let b = Network::manual("b", vec![subnet("b", "10.10.1.0/24", "10.10.1.10 - 10.10.1.14", &[])]);
        let networks = vec![
            JobNetwork::new(a).with_static_ips([ip("192.168.1.10"), ip("192.168.1.11")]),
            JobNetwork::new(b).with_static_ips([ip("10.10.1.10"), ip("10.10.1.11")]),
        ];
        let plans = picker(&networks, &[])
            .place_and_match_in(
                2,
                vec![existing(0, None, &[("a", "192.168.1.10"), ("b", "10.10.1.10")])],
            )
            .unwrap();

        assert!(plans.iter().all(|plan| plan.az().is_none()));
        assert!(plans[0].is_existing());
        assert_eq!(plans[1].desired().unwrap().static_ips["a"], ip("192.168.1.11"));
        assert_eq!(plans[1].desired().unwrap().static_ips["b"], ip("10.10.1.11"));
    }

    #[test]
    fn test_zoned_instance_in_zoneless_group_fails() {
        let a = Network::manual("a", vec![subnet("a", "192.168.1.0/24", "192.168.1.10 - 192.168.1.14", &[])]);
        let networks = vec![JobNetwork::new(a).with_static_ips([ip("192.168.1.10")])];
        let err = picker(&networks, &[])
            .place_and_match_in(1, vec![existing(0, Some("zone1"), &[("a", "192.168.1.10")])])
            .unwrap_err();
        assert!(err.to_string().contains("Existing instance 'web/0' is using IP '192.168.1.10' in availability zone 'zone1'"));
    }

    #[test]
    fn test_ip_without_subnet_fails() {
        let (a, _) = two_zone_networks();
        let networks = vec![JobNetwork::new(a).with_static_ips([ip("192.168.1.10"), ip("192.168.5.10")])];
        let err = picker(&networks, &["zone1", "zone2"]).place_and_match_in(2, vec![]).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Placement error: Instance group 'web' with network 'a' declares static ip '192.168.5.10', which belongs to no subnet"
        );
    }

    #[test]
    fn test_ignored_instance_networks_cannot_change() {
        let (a, b) = two_zone_networks();
        let networks = vec![
            JobNetwork::new(a).with_static_ips([ip("192.168.1.10")]),
            JobNetwork::new(b).with_static_ips([ip("10.10.1.10")]),
        ];
        let err = picker(&networks, &["zone1", "zone2"])
            .place_and_match_in(1, vec![existing(0, Some("zone1"), &[("a", "192.168.1.10")]).with_ignore()])
            .unwrap_err();
        assert!(matches!(err, Error::Placement(_)));
        assert_eq!(
            err.to_string(),
            "Placement error: In instance group 'web', which contains ignored vms, \
            an attempt was made to modify the networks. This operation is not allowed."
        );
    }

    #[test]
    fn test_ignored_instance_static_ip_cannot_be_removed() {
        let (a, _) = two_zone_networks();
        let networks = vec![JobNetwork::new(a).with_static_ips([ip("192.168.1.11")])];
        let err = picker(&networks, &["zone1", "zone2"])
            .place_and_match_in(1, vec![existing(0, Some("zone1"), &[("a", "192.168.1.10")]).with_ignore()])
            .unwrap_err();
        assert!(err.to_string().contains(
            "an attempt was made to remove a static ip that is used by an ignored instance"
        ));

        // Without the flag the instance is simply reused with the new IP
        let plans = picker(&networks, &["zone1", "zone2"])
            .place_and_match_in(1, vec![existing(0, Some("zone1"), &[("a", "192.168.1.10")])])
            .unwrap();
        assert_eq!(plans[0].desired().unwrap().static_ips["a"], ip("192.168.1.11"));
    }

    #[test]
    fn test_ignored_instance_cannot_become_obsolete() {
        let (a, _) = two_zone_networks();
        let networks = vec![JobNetwork::new(a).with_static_ips([ip("192.168.1.10"), ip("192.168.2.10")])];
        let instances = || {
            vec![
                existing(0, Some("zone1"), &[("a", "192.168.1.10")]),
                existing(1, Some("zone2"), &[("a", "192.168.2.10")]).with_ignore(),
            ]
        };

        let plans = picker(&networks, &["zone1", "zone2"])
            .place_and_match_in(2, instances())
            .unwrap();
        assert!(plans.iter().all(|plan| plan.is_existing()));

        let err = picker(&networks, &["zone1", "zone2"])
            .place_and_match_in(1, instances())
            .unwrap_err();
        assert!(err.to_string().contains("used by an ignored instance"));
    }
}
