//! Client-side resolution of a service name to one instance address

use crate::load_balancer::{strategy_for, RandomSelection, SelectionStrategy};
use registry_core::{Registry, RegistryConfig, RegistryError, Result};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Resolver turns a logical service name into one concrete address per call.
///
/// It holds no cache and no connections: every call re-queries the registry
/// and makes a fresh selection.
#[derive(Clone)]
pub struct Resolver {
    registry: Arc<dyn Registry>,
    strategy: Arc<dyn SelectionStrategy>,
}

impl Resolver {
    /// Create a resolver with uniform random selection
    pub fn new(registry: Arc<dyn Registry>) -> Self {
        Self::with_strategy(registry, Arc::new(RandomSelection))
    }

    pub fn with_strategy(registry: Arc<dyn Registry>, strategy: Arc<dyn SelectionStrategy>) -> Self {
        Self { registry, strategy }
    }

    pub fn from_config(registry: Arc<dyn Registry>, config: &RegistryConfig) -> Self {
        Self::with_strategy(registry, strategy_for(config.selection))
    }

    /// Resolve `service_name` to the address of one live instance.
    pub async fn resolve(&self, service_name: &str) -> Result<String> {
        let addresses = self.registry.discover(service_name).await?;
        let address = self
            .strategy
            .select(&addresses)
            .cloned()
            .ok_or_else(|| RegistryError::NotFound(service_name.to_string()))?;

        debug!(
            service = service_name,
            candidates = addresses.len(),
            address = %address,
            "Resolved service"
        );
        Ok(address)
    }

    /// Resolve, failing with `Timeout` if the registry does not answer within `deadline`.
    pub async fn resolve_with_deadline(&self, service_name: &str, deadline: Duration) -> Result<String> {
        match tokio::time::timeout(deadline, self.resolve(service_name)).await {
            Ok(result) => result,
            Err(_) => Err(RegistryError::Timeout(format!(
                "resolving {} took longer than {:?}",
                service_name, deadline
            ))),
        }
    }
}
