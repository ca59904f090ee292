//! Registry backend selection from configuration

use registry_core::{BackendKind, MemoryRegistry, Registry, RegistryConfig, Result};
use registry_remote::HttpRegistry;
use std::sync::Arc;
use tracing::info;

/// Build the registry backend named by `config.backend`
pub fn build_registry(config: &RegistryConfig) -> Result<Arc<dyn Registry>> {
    config.validate()?;
    match config.backend {
        BackendKind::Memory => {
            info!(
                "Using in-memory registry with liveness window {:?}",
                config.liveness_window()
            );
            Ok(Arc::new(MemoryRegistry::from_config(config)))
        }
        BackendKind::Remote => {
            info!("Using remote registry at {}", config.remote_url);
            Ok(Arc::new(HttpRegistry::from_config(config)?))
        }
    }
}
