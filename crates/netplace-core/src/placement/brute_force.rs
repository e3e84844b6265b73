//! Cross-network AZ assignment for static IPs.
//!
//! Every instance in an AZ takes one IP from each static network, so the
//! chosen per-AZ counts must agree across networks. Among the assignments
//! that agree, the search keeps the one with the smallest per-AZ maximum.
//!
//! ## Search
//!
//! Depth first over the IPs of the first network, then each following
//! network in turn, trying candidate AZs in name order. Branches are cut
//! when:
//!
//! - the first network's running maximum already matches the best found
//! - a later network exceeds the first network's count in some AZ
//! - the IPs left in a later network cannot make up an AZ's shortfall
//!
//! The search ends at the first assignment reaching `ceil(ips / azs)`, or
//! after `max_steps` candidate tries, returning the best seen.

use std::collections::BTreeSet;

use tracing::{debug, warn};

use super::static_ips::NetworkStaticIps;

/// Brute-force search narrowing every static IP to one AZ
#[derive(Debug, Clone, Copy)]
pub struct BruteForceIpAllocation {
    max_steps: usize,
}

impl Default for BruteForceIpAllocation {
    fn default() -> Self {
        Self::new(Self::DEFAULT_MAX_STEPS)
    }
}

impl BruteForceIpAllocation {
    pub const DEFAULT_MAX_STEPS: usize = 1_000_000;

    pub fn new(max_steps: usize) -> Self {
        Self { max_steps }
    }

    /// Narrow every IP's candidates to exactly one AZ
    ///
    /// # Returns
    ///
    /// `None` when some IP has no candidate, when networks declare different
    /// numbers of IPs, or when no assignment keeps per-AZ counts equal
    /// across networks.
    pub fn find_best_combination(&self, networks: &[NetworkStaticIps]) -> Option<Vec<NetworkStaticIps>> {
        if networks
            .iter()
            .flat_map(|network| network.ips.iter())
            .any(|ip| ip.az_names.is_empty())
        {
            return None;
        }

        let per_network = networks.first().map(|network| network.ips.len()).unwrap_or(0);
        if networks.iter().any(|network| network.ips.len() != per_network) {
            return None;
        }

        let azs: Vec<String> = networks
            .iter()
            .flat_map(|network| network.ips.iter())
            .flat_map(|ip| ip.az_names.iter().cloned())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        if per_network == 0 {
            return Some(networks.to_vec());
        }

        let candidates: Vec<Vec<Vec<usize>>> = networks
            .iter()
            .map(|network| {
                network
                    .ips
                    .iter()
                    .map(|ip| {
                        ip.az_names
                            .iter()
                            .filter_map(|az| azs.iter().position(|known| known == az))
                            .collect()
                    })
                    .collect()
            })
            .collect();

        let mut search = Search::new(candidates, azs.len(), self.max_steps);
        search.visit(0, 0);

        if search.steps > self.max_steps {
            warn!(
                max_steps = self.max_steps,
                found = search.best.is_some(),
                "Static IP distribution search hit its step limit"
            );
        }
        let (max, picks) = search.best?;
        debug!(steps = search.steps, max_per_az = max, "Found static IP distribution");

        Some(
            networks
                .iter()
                .zip(picks)
                .map(|(network, picks)| NetworkStaticIps {
                    network_name: network.network_name.clone(),
                    ips: network
                        .ips
                        .iter()
                        .zip(picks)
                        .map(|(ip, az)| ip.narrowed_to(&azs[az]))
                        .collect(),
                })
                .collect(),
        )
    }
}

struct Search {
    /// `[network][ip]` candidate AZ indexes
    candidates: Vec<Vec<Vec<usize>>>,
    /// `[network][position][az]` IPs at or after `position` that may go to `az`
    eligible_from: Vec<Vec<Vec<usize>>>,
    /// `[network][az]`
    counts: Vec<Vec<usize>>,
    picks: Vec<Vec<usize>>,
    ideal: usize,
    steps: usize,
    max_steps: usize,
    best: Option<(usize, Vec<Vec<usize>>)>,
}

impl Search {
    fn new(candidates: Vec<Vec<Vec<usize>>>, az_count: usize, max_steps: usize) -> Self {
        let eligible_from = candidates
            .iter()
            .map(|ips| {
                let mut suffix = vec![vec![0; az_count]; ips.len() + 1];
                for position in (0..ips.len()).rev() {
                    suffix[position] = suffix[position + 1].clone();
                    for az in &ips[position] {
                        suffix[position][*az] += 1;
                    }
                }
                suffix
            })
            .collect();

        let per_network = candidates.first().map(Vec::len).unwrap_or(0);
        Self {
            counts: vec![vec![0; az_count]; candidates.len()],
            picks: candidates.iter().map(|ips| vec![0; ips.len()]).collect(),
            eligible_from,
            candidates,
            ideal: per_network.div_ceil(az_count.max(1)),
            steps: 0,
            max_steps,
            best: None,
        }
    }

    /// Returns true once the search should stop
    fn visit(&mut self, network: usize, position: usize) -> bool {
        if network == self.candidates.len() {
            let max = self.counts[0].iter().copied().max().unwrap_or(0);
            if self.best.as_ref().is_none_or(|(best, _)| max < *best) {
                self.best = Some((max, self.picks.clone()));
            }
            return max <= self.ideal;
        }
        if position == self.candidates[network].len() {
            return self.visit(network + 1, 0);
        }

        for choice in 0..self.candidates[network][position].len() {
            let az = self.candidates[network][position][choice];
            self.steps += 1;
            if self.steps > self.max_steps {
                return true;
            }

            self.counts[network][az] += 1;
            self.picks[network][position] = az;
            if self.admissible(network, position + 1) && self.visit(network, position + 1) {
                return true;
            }
            self.counts[network][az] -= 1;
        }
        false
    }

    fn admissible(&self, network: usize, next: usize) -> bool {
        if network == 0 {
            let max = self.counts[0].iter().copied().max().unwrap_or(0);
            if let Some((best, _)) = &self.best {
                if max >= *best {
                    return false;
                }
            }
            if next < self.candidates[0].len() {
                return true;
            }
            return (1..self.candidates.len()).all(|other| self.can_match(other, 0));
        }

        let exceeds = self.counts[network]
            .iter()
            .zip(&self.counts[0])
            .any(|(count, target)| count > target);
        !exceeds && self.can_match(network, next)
    }

    fn can_match(&self, network: usize, position: usize) -> bool {
        let eligible = &self.eligible_from[network][position];
        self.counts[0]
            .iter()
            .zip(&self.counts[network])
            .zip(eligible)
            .all(|((target, count), left)| target.saturating_sub(*count) <= *left)
    }
}
