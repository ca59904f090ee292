//! In-memory registry backend

use crate::{InstanceRecord, Registry, RegistryConfig, RegistryError, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::time::Instant;
use tracing::{debug, error};

pub const DEFAULT_LIVENESS_WINDOW: Duration = Duration::from_secs(5);

type ServiceMap = HashMap<String, HashMap<String, InstanceRecord>>;

/// MemoryRegistry keeps every instance record of a single process in one
/// readers-writer locked map.
///
/// Mutations take the write lock, discovery takes the read lock. Expiry is
/// computed lazily when discovering; records are only removed by `deregister`.
#[derive(Clone)]
pub struct MemoryRegistry {
    // service name -> instance id -> record
    services: Arc<RwLock<ServiceMap>>,
    liveness_window: Duration,
}

impl MemoryRegistry {
    pub fn new() -> Self {
        Self::with_liveness_window(DEFAULT_LIVENESS_WINDOW)
    }

    pub fn with_liveness_window(liveness_window: Duration) -> Self {
        Self {
            services: Arc::new(RwLock::new(HashMap::new())),
            liveness_window,
        }
    }

    pub fn from_config(config: &RegistryConfig) -> Self {
        Self::with_liveness_window(config.liveness_window())
    }

    pub fn liveness_window(&self) -> Duration {
        self.liveness_window
    }

    /// Get count of known service names, including ones with no instances left
    pub async fn service_count(&self) -> usize {
        let services = self.services.read().await;
        services.len()
    }

    /// Get count of stored records, live or not
    pub async fn instance_count(&self) -> usize {
        let services = self.services.read().await;
        services.values().map(HashMap::len).sum()
    }
}

impl Default for MemoryRegistry {
    fn default() -> Self {
        Self::new()
    }
}

fn ensure_non_empty(field: &str, value: &str) -> Result<()> {
    if value.is_empty() {
        return Err(RegistryError::InvalidInstance(format!("{} must not be empty", field)));
    }
    Ok(())
}

#[async_trait]
impl Registry for MemoryRegistry {
    async fn register(&self, instance_id: &str, service_name: &str, address: &str) -> Result<()> {
        ensure_non_empty("instance id", instance_id)?;
        ensure_non_empty("service name", service_name)?;
        ensure_non_empty("address", address)?;

        let mut services = self.services.write().await;
        let record = InstanceRecord {
            instance_id: instance_id.to_string(),
            service_name: service_name.to_string(),
            address: address.to_string(),
            // Taken under the lock so timestamps never move backwards
            last_heartbeat_at: Instant::now(),
        };
        services
            .entry(service_name.to_string())
            .or_default()
            .insert(instance_id.to_string(), record);

        debug!(service = service_name, instance_id, address, "Registered instance");
        Ok(())
    }

    async fn deregister(&self, instance_id: &str, service_name: &str) -> Result<()> {
        let mut services = self.services.write().await;
        let Some(instances) = services.get_mut(service_name) else {
            error!(service = service_name, instance_id, "Deregister for unknown service");
            return Err(RegistryError::NotRegistered(service_name.to_string()));
        };

        if instances.remove(instance_id).is_some() {
            debug!(service = service_name, instance_id, "Deregistered instance");
        } else {
            debug!(service = service_name, instance_id, "Deregister of unknown instance ignored");
        }
        Ok(())
    }

    async fn health_check(&self, instance_id: &str, service_name: &str) -> Result<()> {
        let mut services = self.services.write().await;
        let Some(instances) = services.get_mut(service_name) else {
            error!(service = service_name, instance_id, "Health check for unknown service");
            return Err(RegistryError::ServiceNotRegistered(service_name.to_string()));
        };
        let Some(record) = instances.get_mut(instance_id) else {
            error!(service = service_name, instance_id, "Health check for unknown instance");
            return Err(RegistryError::InstanceNotRegistered {
                service_name: service_name.to_string(),
                instance_id: instance_id.to_string(),
            });
        };

        record.last_heartbeat_at = Instant::now();
        Ok(())
    }

    async fn discover(&self, service_name: &str) -> Result<Vec<String>> {
        let services = self.services.read().await;
        let now = Instant::now();

        let addresses: Vec<String> = services
            .get(service_name)
            .map(|instances| {
                instances
                    .values()
                    .filter(|record| record.is_live(now, self.liveness_window))
                    .map(|record| record.address.clone())
                    .collect()
            })
            .unwrap_or_default();

        if addresses.is_empty() {
            return Err(RegistryError::NotFound(service_name.to_string()));
        }
        Ok(addresses)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_register_then_discover() {
        let registry = MemoryRegistry::new();
        registry
            .register("orders-7", "orders", "10.0.0.1:9000")
            .await
            .unwrap();

        let addrs = registry.discover("orders").await.unwrap();
        assert_eq!(addrs, vec!["10.0.0.1:9000".to_string()]);
    }

    #[tokio::test]
    async fn test_reregister_overwrites_address() {
        let registry = MemoryRegistry::new();
        registry.register("orders-7", "orders", "10.0.0.1:9000").await.unwrap();
        registry.register("orders-7", "orders", "10.0.0.2:9000").await.unwrap();

        let addrs = registry.discover("orders").await.unwrap();
        assert_eq!(addrs, vec!["10.0.0.2:9000".to_string()]);
        assert_eq!(registry.instance_count().await, 1);
    }

    #[tokio::test]
    async fn test_register_rejects_empty_address() {
        let registry = MemoryRegistry::new();
        let err = registry.register("orders-7", "orders", "").await.unwrap_err();
        assert!(matches!(err, RegistryError::InvalidInstance(_)));
        assert_eq!(registry.service_count().await, 0);
    }

    #[tokio::test]
    async fn test_register_accepts_any_non_empty_address() {
        let registry = MemoryRegistry::new();
        registry.register(" ", "orders", " ").await.unwrap();
        assert_eq!(registry.discover("orders").await.unwrap(), vec![" ".to_string()]);
    }

    #[tokio::test]
    async fn test_discover_unknown_service() {
        let registry = MemoryRegistry::new();
        let err = registry.discover("payments").await.unwrap_err();
        assert_eq!(err, RegistryError::NotFound("payments".to_string()));
    }

    #[tokio::test]
    async fn test_deregister_sole_instance() {
        let registry = MemoryRegistry::new();
        registry.register("orders-7", "orders", "10.0.0.1:9000").await.unwrap();
        registry.deregister("orders-7", "orders").await.unwrap();

        let err = registry.discover("orders").await.unwrap_err();
        assert_eq!(err, RegistryError::NotFound("orders".to_string()));
    }

    #[tokio::test]
    async fn test_deregister_keeps_other_instances() {
        let registry = MemoryRegistry::new();
        registry.register("orders-1", "orders", "10.0.0.1:9000").await.unwrap();
        registry.register("orders-2", "orders", "10.0.0.2:9000").await.unwrap();
        registry.deregister("orders-1", "orders").await.unwrap();

        let addrs = registry.discover("orders").await.unwrap();
        assert_eq!(addrs, vec!["10.0.0.2:9000".to_string()]);
    }

    #[tokio::test]
    async fn test_deregister_unknown_service() {
        let registry = MemoryRegistry::new();
        let err = registry.deregister("orders-7", "orders").await.unwrap_err();
        assert_eq!(err, RegistryError::NotRegistered("orders".to_string()));
    }

    #[tokio::test]
    async fn test_double_deregister_is_harmless() {
        let registry = MemoryRegistry::new();
        registry.register("orders-7", "orders", "10.0.0.1:9000").await.unwrap();
        registry.deregister("orders-7", "orders").await.unwrap();
        registry.deregister("orders-7", "orders").await.unwrap();
        registry.deregister("orders-unknown", "orders").await.unwrap();
        assert_eq!(registry.service_count().await, 1);
    }

    #[tokio::test]
    async fn test_health_check_errors() {
        let registry = MemoryRegistry::new();
        let err = registry.health_check("orders-7", "orders").await.unwrap_err();
        assert_eq!(err, RegistryError::ServiceNotRegistered("orders".to_string()));

        registry.register("orders-7", "orders", "10.0.0.1:9000").await.unwrap();
        let err = registry.health_check("orders-8", "orders").await.unwrap_err();
        assert_eq!(
            err,
            RegistryError::InstanceNotRegistered {
                service_name: "orders".to_string(),
                instance_id: "orders-8".to_string(),
            }
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_stale_instance_is_filtered_not_removed() {
        let registry = MemoryRegistry::new();
        registry.register("orders-7", "orders", "10.0.0.1:9000").await.unwrap();

        tokio::time::advance(Duration::from_secs(6)).await;

        let err = registry.discover("orders").await.unwrap_err();
        assert_eq!(err, RegistryError::NotFound("orders".to_string()));
        assert_eq!(registry.instance_count().await, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_health_check_keeps_instance_live() {
        let registry = MemoryRegistry::new();
        registry.register("orders-7", "orders", "10.0.0.1:9000").await.unwrap();

        for _ in 0..10 {
            tokio::time::advance(Duration::from_secs(1)).await;
            registry.health_check("orders-7", "orders").await.unwrap();
            assert_eq!(registry.discover("orders").await.unwrap().len(), 1);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_only_live_instances_discovered() {
        let registry = MemoryRegistry::new();
        registry.register("orders-1", "orders", "10.0.0.1:9000").await.unwrap();
        tokio::time::advance(Duration::from_secs(3)).await;
        registry.register("orders-2", "orders", "10.0.0.2:9000").await.unwrap();
        tokio::time::advance(Duration::from_secs(3)).await;

        let addrs = registry.discover("orders").await.unwrap();
        assert_eq!(addrs, vec!["10.0.0.2:9000".to_string()]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_expiry_and_revival_scenario() {
        let registry = MemoryRegistry::new();
        registry.register("orders-7", "orders", "10.0.0.1:9000").await.unwrap();
        assert_eq!(
            registry.discover("orders").await.unwrap(),
            vec!["10.0.0.1:9000".to_string()]
        );

        tokio::time::advance(Duration::from_secs(6)).await;
        assert_eq!(
            registry.discover("orders").await.unwrap_err(),
            RegistryError::NotFound("orders".to_string())
        );

        registry.health_check("orders-7", "orders").await.unwrap();
        tokio::time::advance(Duration::from_millis(500)).await;
        assert_eq!(
            registry.discover("orders").await.unwrap(),
            vec!["10.0.0.1:9000".to_string()]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_custom_liveness_window() {
        let registry = MemoryRegistry::with_liveness_window(Duration::from_secs(30));
        registry.register("stock-1", "stock", "10.0.0.3:9000").await.unwrap();
        tokio::time::advance(Duration::from_secs(20)).await;
        assert!(registry.discover("stock").await.is_ok());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_registers_are_all_visible() {
        let registry = Arc::new(MemoryRegistry::new());
        let tasks = (0..64).map(|i| {
            let registry = registry.clone();
            tokio::spawn(async move {
                registry
                    .register(&format!("orders-{}", i), "orders", &format!("10.0.1.{}:9000", i))
                    .await
            })
        });

        for result in futures::future::join_all(tasks).await {
            result.expect("task panicked").expect("register failed");
        }

        let mut addrs = registry.discover("orders").await.unwrap();
        addrs.sort();
        addrs.dedup();
        assert_eq!(addrs.len(), 64);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_readers_and_writers() {
        let registry = Arc::new(MemoryRegistry::new());
        registry.register("stock-0", "stock", "10.0.2.0:9000").await.unwrap();

        let writers = (1..32).map(|i| {
            let registry = registry.clone();
            tokio::spawn(async move {
                let id = format!("stock-{}", i);
                registry.register(&id, "stock", "10.0.2.1:9000").await?;
                registry.health_check(&id, "stock").await?;
                registry.deregister(&id, "stock").await
            })
        });
        let readers = (0..32).map(|_| {
            let registry = registry.clone();
            tokio::spawn(async move { registry.discover("stock").await.map(|_| ()) })
        });

        for result in futures::future::join_all(writers.chain(readers)).await {
            result.expect("task panicked").expect("operation failed");
        }
        assert_eq!(registry.instance_count().await, 1);
    }
}
