//! Weighted pick-and-rebalance selector.
//!
//! Each `pop` hands out the lightest entity and makes it one heavier, so
//! repeated pops against flat weights visit every entity round-robin.
//! Entries in the `preferred` list are handed out first, in order.

use std::collections::{BTreeMap, VecDeque};

use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::Rng;

/// Picks one entity out of several sharing the minimum weight
pub trait TieStrategy<T> {
    /// `candidates` is non-empty and sorted ascending
    fn choose<'c>(&mut self, candidates: &'c [T]) -> Option<&'c T>;
}

/// Smallest candidate wins
#[derive(Debug, Clone, Copy, Default)]
pub struct MinWins;

impl<T> TieStrategy<T> for MinWins {
    fn choose<'c>(&mut self, candidates: &'c [T]) -> Option<&'c T> {
        candidates.first()
    }
}

/// Uniformly random candidate wins
#[derive(Debug, Clone)]
pub struct RandomWins<R = StdRng> {
    rng: R,
}

impl<R: Rng> RandomWins<R> {
    /// Use an explicit random source
    pub fn new(rng: R) -> Self {
        Self { rng }
    }
}

impl RandomWins<StdRng> {
    /// Reproducible picks for a given seed
    pub fn seeded(seed: u64) -> Self {
        Self::new(StdRng::seed_from_u64(seed))
    }

    pub fn from_entropy() -> Self {
        Self::new(StdRng::from_entropy())
    }
}

impl<T, R: Rng> TieStrategy<T> for RandomWins<R> {
    fn choose<'c>(&mut self, candidates: &'c [T]) -> Option<&'c T> {
        candidates.choose(&mut self.rng)
    }
}

/// Weighted selector with a priority override list
pub struct Balancer<'s, T> {
    weights: BTreeMap<T, usize>,
    preferred: VecDeque<T>,
    tie_strategy: &'s mut dyn TieStrategy<T>,
}

impl<'s, T: Ord + Clone> Balancer<'s, T> {
    /// Create a balancer over `initial_weight`
    pub fn new(
        initial_weight: impl IntoIterator<Item = (T, usize)>,
        tie_strategy: &'s mut dyn TieStrategy<T>,
    ) -> Self {
        Self {
            weights: initial_weight.into_iter().collect(),
            preferred: VecDeque::new(),
            tie_strategy,
        }
    }

    /// Entities to hand out before consulting the weights, front first.
    /// Duplicates are allowed.
    pub fn with_preferred(mut self, preferred: impl IntoIterator<Item = T>) -> Self {
        self.preferred.extend(preferred);
        self
    }

    /// Current weight of `entity`
    pub fn weight(&self, entity: &T) -> Option<usize> {
        self.weights.get(entity).copied()
    }

    /// Next entity, or `None` when there is nothing to hand out
    pub fn pop(&mut self) -> Option<T> {
        if let Some(entity) = self.preferred.pop_front() {
            // Count the preferred pick so later weighted pops see it
            if let Some(weight) = self.weights.get_mut(&entity) {
                *weight += 1;
            }
            return Some(entity);
        }

        let min = *self.weights.values().min()?;
        let lightest: Vec<T> = self
            .weights
            .iter()
            .filter(|(_, weight)| **weight == min)
            .map(|(entity, _)| entity.clone())
            .collect();

        let chosen = if lightest.len() == 1 {
            lightest.into_iter().next()?
        } else {
            self.tie_strategy.choose(&lightest)?.clone()
        };

        if let Some(weight) = self.weights.get_mut(&chosen) {
            *weight += 1;
        }
        Some(chosen)
    }
}
