// # Placement Planner
//
// Entry point orchestration calls once per instance group. Chooses the
// static-IP picker when any network pins static IPs and the plain AZ
// picker otherwise, then flattens the result into index and IP maps.
//
// ## Usage
//
// ```rust,ignore
// let planner = PlacementPlanner::new(&config);
// let plan = planner.plan(&PlacementRequest::new("web", 3).with_azs(azs))?;
// for (index, az) in &plan.instances {
//     info!("web/{} -> {:?}", index, az);
// }
// ```

use std::collections::BTreeMap;
use std::net::IpAddr;

use serde::{Deserialize, Serialize};
use tracing::info;

use super::az_picker::AvailabilityZonePicker;
use super::balancer::{MinWins, RandomWins, TieStrategy};
use super::brute_force::BruteForceIpAllocation;
use super::static_ip_picker::StaticIpsAvailabilityZonePicker;
use super::{ExistingInstance, InstancePlan, JobNetwork};
use crate::config::{PlannerConfig, TieStrategyConfig};
use crate::error::{Error, Result};
use crate::network::AvailabilityZone;

/// What one instance group needs placed
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlacementRequest {
    pub instance_group: String,
    pub desired_count: usize,
    #[serde(default)]
    pub desired_azs: Vec<AvailabilityZone>,
    #[serde(default)]
    pub existing: Vec<ExistingInstance>,
    #[serde(default)]
    pub networks: Vec<JobNetwork>,
}

impl PlacementRequest {
    pub fn new(instance_group: impl Into<String>, desired_count: usize) -> Self {
        Self {
            instance_group: instance_group.into(),
            desired_count,
            desired_azs: Vec::new(),
            existing: Vec::new(),
            networks: Vec::new(),
        }
    }

    pub fn with_azs(mut self, azs: impl IntoIterator<Item = AvailabilityZone>) -> Self {
        self.desired_azs.extend(azs);
        self
    }

    pub fn with_existing(mut self, existing: impl IntoIterator<Item = ExistingInstance>) -> Self {
        self.existing.extend(existing);
        self
    }

    pub fn with_network(mut self, network: JobNetwork) -> Self {
        self.networks.push(network);
        self
    }

    /// AZ names in declaration order, duplicates dropped
    fn az_names(&self) -> Vec<String> {
        let mut names: Vec<String> = Vec::new();
        for az in &self.desired_azs {
            if !names.contains(&az.name) {
                names.push(az.name.clone());
            }
        }
        names
    }
}

/// Placement decisions for one instance group
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlacementPlan {
    /// Instance index to AZ, for every desired instance
    pub instances: BTreeMap<u32, Option<String>>,
    /// Network to static IP to AZ
    pub static_ips: BTreeMap<String, BTreeMap<IpAddr, Option<String>>>,
    /// Existing instances to delete
    pub obsolete: Vec<ExistingInstance>,
    /// Per-instance detail
    pub plans: Vec<InstancePlan>,
}

impl PlacementPlan {
    fn from_plans(plans: Vec<InstancePlan>) -> Self {
        let mut plan = PlacementPlan::default();
        for instance in &plans {
            match instance {
                InstancePlan::Obsolete { existing } => plan.obsolete.push(existing.clone()),
                InstancePlan::Existing { desired, .. } | InstancePlan::New { desired } => {
                    if let Some(index) = desired.index {
                        plan.instances.insert(index, desired.az.clone());
                    }
                    for (network, ip) in &desired.static_ips {
                        plan.static_ips
                            .entry(network.clone())
                            .or_default()
                            .insert(*ip, desired.az.clone());
                    }
                }
            }
        }
        plan.plans = plans;
        plan
    }

    /// Plans for instances that must be created
    pub fn new_instances(&self) -> impl Iterator<Item = &InstancePlan> {
        self.plans.iter().filter(|plan| plan.is_new())
    }

    /// Plans for existing instances that stay
    pub fn reused_instances(&self) -> impl Iterator<Item = &InstancePlan> {
        self.plans.iter().filter(|plan| plan.is_existing())
    }
}

/// Plans AZ placement for instance groups
pub struct PlacementPlanner {
    tie_strategy: TieStrategyConfig,
    search: BruteForceIpAllocation,
}

impl PlacementPlanner {
    pub fn new(config: &PlannerConfig) -> Self {
        Self {
            tie_strategy: config.tie_strategy.clone(),
            search: BruteForceIpAllocation::new(config.max_search_steps),
        }
    }

    /// Fresh tie strategy per plan, so seeded plans repeat
    fn tie_strategy(&self) -> Box<dyn TieStrategy<String> + Send> {
        match &self.tie_strategy {
            TieStrategyConfig::MinWins => Box::new(MinWins),
            TieStrategyConfig::Random { seed: Some(seed) } => Box::new(RandomWins::seeded(*seed)),
            TieStrategyConfig::Random { seed: None } => Box::new(RandomWins::from_entropy()),
        }
    }

    /// Decide AZs, reuse and static IPs for one instance group
    ///
    /// # Errors
    ///
    /// `Error::Placement` when a static network declares a different number
    /// of IPs than instances, or when the static IPs cannot be placed in the
    /// desired AZs.
    pub fn plan(&self, request: &PlacementRequest) -> Result<PlacementPlan> {
        for network in request.networks.iter().filter(|network| network.is_static()) {
            if network.static_ips.len() != request.desired_count {
                return Err(Error::placement(format!(
                    "Instance group '{}' has {} instances but was allocated {} static IPs in network '{}'",
                    request.instance_group,
                    request.desired_count,
                    network.static_ips.len(),
                    network.name()
                )));
            }
        }

        let azs = request.az_names();
        let plans = if request.networks.iter().any(JobNetwork::is_static) {
            StaticIpsAvailabilityZonePicker::new(&request.instance_group, &request.networks, azs, self.search)
                .place_and_match_in(request.desired_count, request.existing.clone())?
        } else {
            AvailabilityZonePicker::new(azs)
                .with_tie_strategy(self.tie_strategy())
                .place_and_match_in(request.desired_count, request.existing.clone())
        };

        let plan = PlacementPlan::from_plans(plans);
        info!(
            instance_group = %request.instance_group,
            new = plan.new_instances().count(),
            reused = plan.reused_instances().count(),
            obsolete = plan.obsolete.len(),
            "Planned placement"
        );
        Ok(plan)
    }
}
