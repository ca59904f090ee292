//! Registration lifecycle of a worker instance

use crate::heartbeat::{HeartbeatConfig, HeartbeatHandle, HeartbeatLoop};
use crate::{ClientError, Result};
use registry_core::{generate_instance_id, Registry};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// A live registration: the instance record plus the heartbeat keeping it
/// discoverable.
///
/// Dropping a registration without calling [`Registration::deregister`] leaves
/// the record to expire once heartbeats stop.
pub struct Registration {
    registry: Arc<dyn Registry>,
    instance_id: String,
    service_name: String,
    address: String,
    heartbeat: HeartbeatHandle,
}

impl Registration {
    /// Register under a freshly generated instance ID and start heartbeating.
    pub async fn register(
        registry: Arc<dyn Registry>,
        service_name: &str,
        address: &str,
        config: HeartbeatConfig,
        shutdown: &CancellationToken,
    ) -> Result<Self> {
        let instance_id = generate_instance_id(service_name);
        Self::register_with_id(registry, instance_id, service_name, address, config, shutdown).await
    }

    pub async fn register_with_id(
        registry: Arc<dyn Registry>,
        instance_id: String,
        service_name: &str,
        address: &str,
        config: HeartbeatConfig,
        shutdown: &CancellationToken,
    ) -> Result<Self> {
        registry.register(&instance_id, service_name, address).await?;
        info!(
            service = service_name,
            instance_id = %instance_id,
            address,
            "Registered instance"
        );

        let heartbeat = HeartbeatLoop::new(
            registry.clone(),
            instance_id.clone(),
            service_name.to_string(),
            config,
        )
        .spawn(shutdown);

        Ok(Self {
            registry,
            instance_id,
            service_name: service_name.to_string(),
            address: address.to_string(),
            heartbeat,
        })
    }

    pub fn instance_id(&self) -> &str {
        &self.instance_id
    }

    pub fn service_name(&self) -> &str {
        &self.service_name
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    /// Stop the heartbeat, then remove the instance record.
    ///
    /// The heartbeat is joined first so no health check can land after the
    /// record is gone. Returns the error the heartbeat ended with, if it gave
    /// up before being stopped.
    pub async fn deregister(self) -> Result<Option<ClientError>> {
        let heartbeat_error = self.heartbeat.stop().await.err();
        if let Some(e) = &heartbeat_error {
            warn!(
                service = %self.service_name,
                instance_id = %self.instance_id,
                "Heartbeat ended with error before deregistration: {}",
                e
            );
        }

        self.registry
            .deregister(&self.instance_id, &self.service_name)
            .await?;
        info!(
            service = %self.service_name,
            instance_id = %self.instance_id,
            "Deregistered instance"
        );
        Ok(heartbeat_error)
    }
}
