//! Backend selection for IP providers
//!
//! Global networking shares one address table across every deployment, so
//! providers get a [`DatabaseIpRepo`] over the shared store. Local
//! networking gives each provider its own [`InMemoryIpRepo`].

use std::sync::Arc;

use tracing::debug;

use super::IpProvider;
use crate::config::{NetworkingMode, PlannerConfig};
use crate::error::Result;
use crate::network::Network;
use crate::repo::{DatabaseIpRepo, InMemoryIpRepo};
use crate::reservation::TaskContext;
use crate::store::open_record_store;
use crate::traits::{IpRecordStore, IpRepo};

/// Builds an [`IpProvider`] per deployment
pub struct IpProviderFactory {
    networking: NetworkingMode,
    store: Arc<dyn IpRecordStore>,
    task: TaskContext,
}

impl IpProviderFactory {
    /// Create a factory
    ///
    /// # Parameters
    ///
    /// - `networking`: Whether IP accounting is shared across deployments
    /// - `store`: Shared record store, used in global mode
    /// - `task`: Task stamped on every record written
    pub fn new(networking: NetworkingMode, store: Arc<dyn IpRecordStore>, task: TaskContext) -> Self {
        Self {
            networking,
            store,
            task,
        }
    }

    /// Create a factory from configuration, opening the configured store
    pub async fn from_config(config: &PlannerConfig, task: TaskContext) -> Result<Self> {
        config.validate()?;
        let store = open_record_store(&config.record_store).await?;
        Ok(Self::new(config.networking, store, task))
    }

    pub fn networking(&self) -> NetworkingMode {
        self.networking
    }

    /// Create a provider for one deployment's networks
    ///
    /// Fails with `Error::Config` when a subnet is invalid.
    pub fn new_ip_provider(&self, networks: impl IntoIterator<Item = Network>) -> Result<IpProvider> {
        let repo: Arc<dyn IpRepo> = match self.networking {
            NetworkingMode::Global => {
                debug!(task = %self.task.task_id, "Using shared IP repo");
                Arc::new(DatabaseIpRepo::new(self.store.clone(), self.task.clone()))
            }
            NetworkingMode::Local => {
                debug!(task = %self.task.task_id, "Using in-memory IP repo");
                Arc::new(InMemoryIpRepo::new())
            }
        };
        IpProvider::new(repo, networks)
    }
}
