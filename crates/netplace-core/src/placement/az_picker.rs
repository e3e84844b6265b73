//! AZ placement for instance groups without static IPs.
//!
//! ## Matching order
//!
//! 1. Existing instances with a persistent disk stay where they are when
//!    their AZ is still desired
//! 2. Remaining desired instances are spread by a [`Balancer`] seeded with
//!    the counts from step 1; existing instances in the popped AZ are reused
//! 3. Whatever existing instances are left become obsolete

use std::cmp::Reverse;
use std::collections::BTreeMap;

use tracing::debug;

use super::balancer::{Balancer, MinWins, TieStrategy};
use super::counters::{PlacedDesiredInstances, UnplacedExistingInstances};
use super::{ExistingInstance, InstancePlan, assign_indexes};

/// Places desired instances into AZs and matches them with existing ones
pub struct AvailabilityZonePicker {
    desired_azs: Vec<String>,
    tie_strategy: Box<dyn TieStrategy<String> + Send>,
}

impl AvailabilityZonePicker {
    /// Create a picker over the instance group's AZs (empty when the group
    /// declares none)
    pub fn new<S: Into<String>>(desired_azs: impl IntoIterator<Item = S>) -> Self {
        Self {
            desired_azs: desired_azs.into_iter().map(Into::into).collect(),
            tie_strategy: Box::new(MinWins),
        }
    }

    /// Break ties between equally loaded AZs with `tie_strategy`
    pub fn with_tie_strategy(mut self, tie_strategy: Box<dyn TieStrategy<String> + Send>) -> Self {
        self.tie_strategy = tie_strategy;
        self
    }

    /// Match `desired_count` desired instances against `existing`
    ///
    /// # Returns
    ///
    /// One plan per desired instance (existing or new, in placement order)
    /// followed by one obsolete plan per unmatched existing instance.
    pub fn place_and_match_in(
        &mut self,
        desired_count: usize,
        existing: Vec<ExistingInstance>,
    ) -> Vec<InstancePlan> {
        let mut unplaced = UnplacedExistingInstances::new(existing);
        let mut placed = PlacedDesiredInstances::new(&self.desired_azs);

        let remaining = self.place_persistent_disk_instances(desired_count, &mut placed, &mut unplaced);
        self.balance_across_desired_azs(remaining, &mut placed, &mut unplaced);

        let mut plans = placed.into_plans();
        for existing in unplaced.unclaimed() {
            debug!(instance = %existing.id, index = existing.index, "Marking instance as obsolete");
            plans.push(InstancePlan::Obsolete { existing });
        }
        assign_indexes(&mut plans);
        plans
    }

    fn is_desired(&self, az: Option<&str>) -> bool {
        match az {
            Some(az) => self.desired_azs.iter().any(|desired| desired == az),
            None => false,
        }
    }

    fn place_persistent_disk_instances(
        &self,
        desired_count: usize,
        placed: &mut PlacedDesiredInstances,
        unplaced: &mut UnplacedExistingInstances,
    ) -> usize {
        let mut remaining = desired_count;
        for instance in unplaced.with_persistent_disk() {
            if remaining == 0 {
                break;
            }

            let az = if self.desired_azs.is_empty() {
                None
            } else if self.is_desired(instance.az.as_deref()) {
                instance.az.clone()
            } else {
                continue;
            };

            if let Some(claimed) = unplaced.claim_instance(&instance.id) {
                debug!(
                    instance = %claimed.id,
                    az = ?az,
                    "Keeping instance with persistent disk in its AZ"
                );
                placed.record_placement(az.as_deref(), Some(claimed));
                remaining -= 1;
            }
        }
        remaining
    }

    fn balance_across_desired_azs(
        &mut self,
        count: usize,
        placed: &mut PlacedDesiredInstances,
        unplaced: &mut UnplacedExistingInstances,
    ) {
        if self.desired_azs.is_empty() {
            for _ in 0..count {
                placed.record_placement(None, unplaced.claim_instance_for_az(None));
            }
            return;
        }

        let weights = placed.az_placement_count();
        let existing: BTreeMap<String, usize> = unplaced
            .az_counts()
            .into_iter()
            .filter(|(az, _)| weights.contains_key(az))
            .collect();
        let preferred = reuse_order(weights.clone(), existing, count);

        let mut balancer = Balancer::new(weights, self.tie_strategy.as_mut()).with_preferred(preferred);
        for _ in 0..count {
            let Some(az) = balancer.pop() else {
                break;
            };
            let existing = unplaced.claim_instance_for_az(Some(&az));
            debug!(
                az = %az,
                reused = existing.as_ref().map(|instance| instance.id.as_str()),
                "Placed desired instance"
            );
            placed.record_placement(Some(&az), existing);
        }
    }
}

/// AZs in which existing instances get reused, in pop order
///
/// Replays the balancing: each step takes a lightest AZ, and when some
/// lightest AZ still has unclaimed instances it takes the one with the
/// most of them and records a reuse.
fn reuse_order(
    mut weights: BTreeMap<String, usize>,
    mut existing: BTreeMap<String, usize>,
    count: usize,
) -> Vec<String> {
    let mut order = Vec::new();
    for _ in 0..count {
        let Some(min) = weights.values().min().copied() else {
            break;
        };
        let lightest: Vec<String> = weights
            .iter()
            .filter(|(_, weight)| **weight == min)
            .map(|(az, _)| az.clone())
            .collect();

        let reuse = lightest
            .iter()
            .filter(|az| existing.get(*az).copied().unwrap_or(0) > 0)
            .min_by_key(|az| Reverse(existing.get(*az).copied().unwrap_or(0)))
            .cloned();

        let chosen = match reuse {
            Some(az) => {
                if let Some(left) = existing.get_mut(&az) {
                    *left -= 1;
                }
                order.push(az.clone());
                az
            }
            None => match lightest.into_iter().next() {
                Some(az) => az,
                None => break,
            },
        };

        if let Some(weight) = weights.get_mut(&chosen) {
            *weight += 1;
        }
    }
    order
}
