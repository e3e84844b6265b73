//! Configuration types for the placement engine
//!
//! The orchestrator builds one [`PlannerConfig`] per director process and
//! hands it to the factory and planner for each deployment.

use serde::{Deserialize, Serialize};

/// Main planner configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlannerConfig {
    /// Whether IP accounting is shared across deployments
    #[serde(default)]
    pub networking: NetworkingMode,

    /// Persistence handle for the shared address table
    #[serde(default)]
    pub record_store: RecordStoreConfig,

    /// How the balancer breaks ties between equally loaded AZs
    #[serde(default)]
    pub tie_strategy: TieStrategyConfig,

    /// Upper bound on nodes visited by the static-IP distribution search
    #[serde(default = "default_max_search_steps")]
    pub max_search_steps: usize,
}

impl PlannerConfig {
    /// Create a new configuration with defaults
    pub fn new() -> Self {
        Self {
            networking: NetworkingMode::default(),
            record_store: RecordStoreConfig::default(),
            tie_strategy: TieStrategyConfig::default(),
            max_search_steps: default_max_search_steps(),
        }
    }

    /// Use the given networking mode
    pub fn with_networking(mut self, networking: NetworkingMode) -> Self {
        self.networking = networking;
        self
    }

    /// Use the given record store
    pub fn with_record_store(mut self, record_store: RecordStoreConfig) -> Self {
        self.record_store = record_store;
        self
    }

    /// Use the given tie strategy
    pub fn with_tie_strategy(mut self, tie_strategy: TieStrategyConfig) -> Self {
        self.tie_strategy = tie_strategy;
        self
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), crate::Error> {
        if self.max_search_steps == 0 {
            return Err(crate::Error::config("max_search_steps must be > 0"));
        }

        if let RecordStoreConfig::File { path } = &self.record_store {
            if path.is_empty() {
                return Err(crate::Error::config("Record store path cannot be empty"));
            }
        }

        Ok(())
    }
}

impl Default for PlannerConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// IP accounting mode
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NetworkingMode {
    /// Addresses are tracked in the shared record store
    #[default]
    Global,
    /// Addresses are tracked in process memory for one deployment
    Local,
}

impl NetworkingMode {
    pub fn is_global(&self) -> bool {
        matches!(self, NetworkingMode::Global)
    }
}

impl std::str::FromStr for NetworkingMode {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "global" => Ok(NetworkingMode::Global),
            "local" => Ok(NetworkingMode::Local),
            other => Err(crate::Error::config(format!(
                "Networking mode '{}' is not supported. Supported modes: global, local",
                other
            ))),
        }
    }
}

/// Record store configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RecordStoreConfig {
    /// In-memory store shared within the process
    #[default]
    Memory,

    /// JSON file store
    File {
        /// Path to the record file
        path: String,
    },
}

/// Tie-break strategy configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TieStrategyConfig {
    /// Smallest name wins
    #[default]
    MinWins,

    /// Uniform random pick; a seed makes plans reproducible
    Random {
        #[serde(default)]
        seed: Option<u64>,
    },
}

fn default_max_search_steps() -> usize {
    1_000_000
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = PlannerConfig::default();
        assert!(config.networking.is_global());
        assert_eq!(config.record_store, RecordStoreConfig::Memory);
        assert_eq!(config.tie_strategy, TieStrategyConfig::MinWins);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_deserialize_with_defaults() {
        let config: PlannerConfig = serde_json::from_value(serde_json::json!({
            "networking": "local",
            "record_store": {"type": "file", "path": "/tmp/ips.json"},
            "tie_strategy": {"type": "random", "seed": 7}
        }))
        .unwrap();
        assert_eq!(config.networking, NetworkingMode::Local);
        assert_eq!(config.tie_strategy, TieStrategyConfig::Random { seed: Some(7) });
        assert_eq!(config.max_search_steps, 1_000_000);
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = PlannerConfig::default();
        config.max_search_steps = 0;
        assert!(config.validate().is_err());

        let config = PlannerConfig::default()
            .with_record_store(RecordStoreConfig::File { path: String::new() });
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_networking_mode_from_str() {
        assert_eq!("GLOBAL".parse::<NetworkingMode>().unwrap(), NetworkingMode::Global);
        assert_eq!("local".parse::<NetworkingMode>().unwrap(), NetworkingMode::Local);
        assert!("shared".parse::<NetworkingMode>().is_err());
    }
}
