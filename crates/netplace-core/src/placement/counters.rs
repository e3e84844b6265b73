//! AZ accumulators for one planning pass.

use std::collections::BTreeMap;

use super::{DesiredInstance, ExistingInstance, InstancePlan};

/// Desired instances placed so far, with per-AZ counts
///
/// Counts start at zero for every desired AZ so AZs that receive nothing
/// still take part in balancing.
#[derive(Debug, Default)]
pub struct PlacedDesiredInstances {
    counts: BTreeMap<String, usize>,
    plans: Vec<InstancePlan>,
}

impl PlacedDesiredInstances {
    pub fn new<S: AsRef<str>>(desired_azs: &[S]) -> Self {
        Self {
            counts: desired_azs
                .iter()
                .map(|az| (az.as_ref().to_string(), 0))
                .collect(),
            plans: Vec::new(),
        }
    }

    /// Record a desired instance in `az`, reusing `existing` when given
    pub fn record_placement(&mut self, az: Option<&str>, existing: Option<ExistingInstance>) {
        self.record_with(DesiredInstance::new(az.map(str::to_string)), existing);
    }

    /// Record an already-built desired instance
    pub fn record_with(&mut self, desired: DesiredInstance, existing: Option<ExistingInstance>) {
        if let Some(az) = &desired.az {
            *self.counts.entry(az.clone()).or_insert(0) += 1;
        }
        self.plans.push(match existing {
            Some(existing) => InstancePlan::Existing { desired, existing },
            None => InstancePlan::New { desired },
        });
    }

    /// AZ name to number of instances placed there
    pub fn az_placement_count(&self) -> BTreeMap<String, usize> {
        self.counts.clone()
    }

    /// Count for a single AZ
    pub fn count_in(&self, az: &str) -> usize {
        self.counts.get(az).copied().unwrap_or(0)
    }

    /// Among `candidates`, those with the fewest placed instances, sorted
    pub fn azs_with_fewest_instances<'a>(&self, candidates: impl IntoIterator<Item = &'a String>) -> Vec<String> {
        let mut fewest: Vec<String> = Vec::new();
        let mut min = usize::MAX;
        for az in candidates {
            let count = self.count_in(az);
            if count < min {
                min = count;
                fewest.clear();
            }
            if count == min && !fewest.contains(az) {
                fewest.push(az.clone());
            }
        }
        fewest.sort();
        fewest
    }

    pub fn len(&self) -> usize {
        self.plans.len()
    }

    pub fn is_empty(&self) -> bool {
        self.plans.is_empty()
    }

    pub fn plans_mut(&mut self) -> &mut [InstancePlan] {
        &mut self.plans
    }

    pub fn into_plans(self) -> Vec<InstancePlan> {
        self.plans
    }
}

/// Existing instances not yet matched to a desired instance
///
/// Kept sorted by index so claims prefer lower-indexed instances.
#[derive(Debug, Default)]
pub struct UnplacedExistingInstances {
    instances: Vec<ExistingInstance>,
}

impl UnplacedExistingInstances {
    pub fn new(mut instances: Vec<ExistingInstance>) -> Self {
        instances.sort_by_key(|instance| instance.index);
        Self { instances }
    }

    /// AZs of the unclaimed instances, one entry per instance. Instances
    /// without an AZ are left out.
    pub fn azs(&self) -> Vec<String> {
        self.instances
            .iter()
            .filter_map(|instance| instance.az.clone())
            .collect()
    }

    /// Unclaimed instance count per AZ
    pub fn az_counts(&self) -> BTreeMap<String, usize> {
        let mut counts = BTreeMap::new();
        for az in self.azs() {
            *counts.entry(az).or_insert(0) += 1;
        }
        counts
    }

    /// Unclaimed instances with a persistent disk, by index
    pub fn with_persistent_disk(&self) -> Vec<ExistingInstance> {
        self.instances
            .iter()
            .filter(|instance| instance.has_persistent_disk)
            .cloned()
            .collect()
    }

    /// Claim a specific instance
    pub fn claim_instance(&mut self, id: &str) -> Option<ExistingInstance> {
        let position = self.instances.iter().position(|instance| instance.id == id)?;
        Some(self.instances.remove(position))
    }

    /// Claim the lowest-indexed instance in `az`; with no AZ, the
    /// lowest-indexed instance overall
    pub fn claim_instance_for_az(&mut self, az: Option<&str>) -> Option<ExistingInstance> {
        let position = self
            .instances
            .iter()
            .position(|instance| az.is_none() || instance.az.as_deref() == az)?;
        Some(self.instances.remove(position))
    }

    pub fn iter(&self) -> impl Iterator<Item = &ExistingInstance> {
        self.instances.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.instances.is_empty()
    }

    /// Everything still unclaimed
    pub fn unclaimed(self) -> Vec<ExistingInstance> {
        self.instances
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn existing(index: u32, az: Option<&str>) -> ExistingInstance {
        let instance = ExistingInstance::new(format!("vm-{}", index), index);
        match az {
            Some(az) => instance.with_az(az),
            None => instance,
        }
    }

    #[test]
    fn test_unplaced_azs_is_a_multiset_without_none() {
        let unplaced = UnplacedExistingInstances::new(vec![
            existing(2, Some("z1")),
            existing(0, Some("z1")),
            existing(1, None),
            existing(3, Some("z2")),
        ]);
        assert_eq!(unplaced.azs(), vec!["z1", "z1", "z2"]);
        assert_eq!(unplaced.az_counts().get("z1"), Some(&2));
    }

    #[test]
    fn test_claim_prefers_lower_index() {
        let mut unplaced = UnplacedExistingInstances::new(vec![
            existing(2, Some("z1")),
            existing(0, Some("z1")),
            existing(1, Some("z2")),
        ]);
        assert_eq!(unplaced.claim_instance_for_az(Some("z1")).unwrap().index, 0);
        assert_eq!(unplaced.azs(), vec!["z2", "z1"]);
        assert!(unplaced.claim_instance_for_az(Some("z3")).is_none());
        assert_eq!(unplaced.claim_instance_for_az(None).unwrap().index, 1);
        assert_eq!(unplaced.unclaimed().len(), 1);
    }

    #[test]
    fn test_placed_counts() {
        let mut placed = PlacedDesiredInstances::new(&["z1", "z2", "z3"]);
        placed.record_placement(Some("z2"), None);
        placed.record_placement(Some("z2"), Some(existing(0, Some("z2"))));
        placed.record_placement(Some("z1"), None);
        placed.record_placement(None, None);

        let counts = placed.az_placement_count();
        assert_eq!(counts.get("z2"), Some(&2));
        assert_eq!(counts.get("z3"), Some(&0));

        let candidates = vec!["z1".to_string(), "z2".to_string(), "z3".to_string()];
        assert_eq!(placed.azs_with_fewest_instances(&candidates), vec!["z3"]);
        assert_eq!(placed.len(), 4);
    }
}
