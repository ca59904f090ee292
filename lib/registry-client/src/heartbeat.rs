//! Heartbeat loop keeping a registration alive

use crate::{ClientError, Result};
use registry_core::{Registry, RegistryConfig};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Heartbeat configuration
#[derive(Clone, Debug, PartialEq)]
pub struct HeartbeatConfig {
    /// Interval between health checks; must stay well under the liveness window
    pub interval: Duration,
    /// Number of consecutive failures before giving up
    pub max_consecutive_failures: u32,
}

impl Default for HeartbeatConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(1),
            max_consecutive_failures: 3,
        }
    }
}

impl HeartbeatConfig {
    pub fn from_config(config: &RegistryConfig) -> Self {
        Self {
            interval: config.heartbeat_interval(),
            max_consecutive_failures: config.heartbeat_max_failures.max(1),
        }
    }
}

/// Periodic health check for one registered instance, driven by the process
/// that registered it.
pub struct HeartbeatLoop {
    registry: Arc<dyn Registry>,
    instance_id: String,
    service_name: String,
    config: HeartbeatConfig,
}

impl HeartbeatLoop {
    pub fn new(
        registry: Arc<dyn Registry>,
        instance_id: String,
        service_name: String,
        config: HeartbeatConfig,
    ) -> Self {
        Self {
            registry,
            instance_id,
            service_name,
            config,
        }
    }

    /// Spawn the loop on a child of the process shutdown token.
    ///
    /// Cancelling `shutdown` stops the loop. If the loop gives up it cancels
    /// `shutdown` itself so the owning process winds down.
    pub fn spawn(self, shutdown: &CancellationToken) -> HeartbeatHandle {
        let cancel = shutdown.child_token();
        let join = tokio::spawn(self.run(cancel.clone(), shutdown.clone()));
        HeartbeatHandle { cancel, join }
    }

    /// Run until `cancel` fires or the failure budget is spent.
    pub async fn run(self, cancel: CancellationToken, shutdown: CancellationToken) -> Result<()> {
        let mut ticker = tokio::time::interval(self.config.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick is immediate; registration has just refreshed liveness.
        ticker.tick().await;

        let mut consecutive_failures: u32 = 0;
        debug!(
            service = %self.service_name,
            instance_id = %self.instance_id,
            "Heartbeat started with interval {:?}",
            self.config.interval
        );

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {}
            }

            let outcome = tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                outcome = self.registry.health_check(&self.instance_id, &self.service_name) => outcome,
            };

            match outcome {
                Ok(()) => {
                    if consecutive_failures > 0 {
                        info!(
                            service = %self.service_name,
                            instance_id = %self.instance_id,
                            "Heartbeat recovered after {} failures",
                            consecutive_failures
                        );
                    }
                    consecutive_failures = 0;
                }
                Err(e) => {
                    consecutive_failures += 1;
                    if consecutive_failures >= self.config.max_consecutive_failures {
                        error!(
                            service = %self.service_name,
                            instance_id = %self.instance_id,
                            failures = consecutive_failures,
                            "Heartbeat failed: {}, giving up",
                            e
                        );
                        shutdown.cancel();
                        return Err(ClientError::Heartbeat {
                            failures: consecutive_failures,
                            last: e,
                        });
                    }
                    if e.is_state_mismatch() {
                        error!(
                            service = %self.service_name,
                            instance_id = %self.instance_id,
                            failures = consecutive_failures,
                            "Registry lost this instance: {}, retrying",
                            e
                        );
                    } else {
                        warn!(
                            service = %self.service_name,
                            instance_id = %self.instance_id,
                            failures = consecutive_failures,
                            "Heartbeat failed: {}, retrying",
                            e
                        );
                    }
                }
            }
        }

        debug!(
            service = %self.service_name,
            instance_id = %self.instance_id,
            "Heartbeat shutting down"
        );
        Ok(())
    }
}

/// Handle to a spawned heartbeat loop
pub struct HeartbeatHandle {
    cancel: CancellationToken,
    join: JoinHandle<Result<()>>,
}

impl HeartbeatHandle {
    pub fn is_finished(&self) -> bool {
        self.join.is_finished()
    }

    /// Cancel the loop and wait for it to exit, returning how it ended.
    pub async fn stop(self) -> Result<()> {
        self.cancel.cancel();
        self.join
            .await
            .map_err(|e| ClientError::Task(e.to_string()))?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use registry_core::{MemoryRegistry, RegistryError};
    use std::sync::atomic::{AtomicU32, Ordering};

    /// Registry whose health checks fail on the listed call numbers
    struct FlakyRegistry {
        calls: AtomicU32,
        failing_calls: Vec<u32>,
    }

    impl FlakyRegistry {
        fn failing_on(failing_calls: Vec<u32>) -> Self {
            Self {
                calls: AtomicU32::new(0),
                failing_calls,
            }
        }

        fn always_failing() -> Self {
            Self::failing_on((0..1000).collect())
        }
    }

    #[async_trait]
    impl Registry for FlakyRegistry {
        async fn register(&self, _: &str, _: &str, _: &str) -> registry_core::Result<()> {
            Ok(())
        }
        async fn deregister(&self, _: &str, _: &str) -> registry_core::Result<()> {
            Ok(())
        }
        async fn health_check(&self, _: &str, _: &str) -> registry_core::Result<()> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if self.failing_calls.contains(&call) {
                Err(RegistryError::Unavailable("registry restarting".to_string()))
            } else {
                Ok(())
            }
        }
        async fn discover(&self, service_name: &str) -> registry_core::Result<Vec<String>> {
            Err(RegistryError::NotFound(service_name.to_string()))
        }
    }

    #[test]
    fn test_default_config() {
        let config = HeartbeatConfig::default();
        assert_eq!(config.interval, Duration::from_secs(1));
        assert_eq!(config.max_consecutive_failures, 3);
        assert_eq!(HeartbeatConfig::from_config(&RegistryConfig::default()), config);
    }

    #[tokio::test(start_paused = true)]
    async fn test_heartbeat_keeps_instance_discoverable() {
        let registry = Arc::new(MemoryRegistry::new());
        registry.register("orders-7", "orders", "10.0.0.1:9000").await.unwrap();

        let shutdown = CancellationToken::new();
        let handle = HeartbeatLoop::new(
            registry.clone(),
            "orders-7".to_string(),
            "orders".to_string(),
            HeartbeatConfig::default(),
        )
        .spawn(&shutdown);

        tokio::time::sleep(Duration::from_secs(20)).await;
        assert_eq!(registry.discover("orders").await.unwrap().len(), 1);

        handle.stop().await.unwrap();
        tokio::time::sleep(Duration::from_secs(6)).await;
        assert!(registry.discover("orders").await.is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_stops_heartbeat_within_a_tick() {
        let registry = Arc::new(MemoryRegistry::new());
        registry.register("orders-7", "orders", "10.0.0.1:9000").await.unwrap();

        let shutdown = CancellationToken::new();
        let handle = HeartbeatLoop::new(
            registry,
            "orders-7".to_string(),
            "orders".to_string(),
            HeartbeatConfig::default(),
        )
        .spawn(&shutdown);

        tokio::time::sleep(Duration::from_millis(2500)).await;
        shutdown.cancel();
        tokio::time::sleep(Duration::from_millis(1000)).await;
        assert!(handle.is_finished());
        assert!(handle.stop().await.is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn test_repeated_failures_escalate_to_shutdown() {
        let shutdown = CancellationToken::new();
        let handle = HeartbeatLoop::new(
            Arc::new(FlakyRegistry::always_failing()),
            "orders-7".to_string(),
            "orders".to_string(),
            HeartbeatConfig::default(),
        )
        .spawn(&shutdown);

        tokio::time::timeout(Duration::from_secs(10), shutdown.cancelled())
            .await
            .expect("heartbeat should cancel the shutdown token");

        match handle.stop().await {
            Err(ClientError::Heartbeat { failures, last }) => {
                assert_eq!(failures, 3);
                assert!(matches!(last, RegistryError::Unavailable(_)));
            }
            other => panic!("unexpected heartbeat outcome: {:?}", other),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_failures_are_tolerated() {
        let shutdown = CancellationToken::new();
        let handle = HeartbeatLoop::new(
            Arc::new(FlakyRegistry::failing_on(vec![0, 1, 3, 4, 6, 7])),
            "orders-7".to_string(),
            "orders".to_string(),
            HeartbeatConfig::default(),
        )
        .spawn(&shutdown);

        tokio::time::sleep(Duration::from_secs(15)).await;
        assert!(!shutdown.is_cancelled());
        assert!(!handle.is_finished());
        assert!(handle.stop().await.is_ok());
    }
}
