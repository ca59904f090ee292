//! Instance records

use rand::Rng;
use std::time::Duration;
use tokio::time::Instant;

/// One running copy of a named service
#[derive(Clone, Debug)]
pub struct InstanceRecord {
    pub instance_id: String,
    pub service_name: String,
    pub address: String,
    /// Monotonic time of the last register or health check, taken by the registry
    pub last_heartbeat_at: Instant,
}

impl InstanceRecord {
    pub fn new(instance_id: String, service_name: String, address: String) -> Self {
        Self {
            instance_id,
            service_name,
            address,
            last_heartbeat_at: Instant::now(),
        }
    }

    /// An instance is live while its last heartbeat is no older than the window.
    pub fn is_live(&self, now: Instant, liveness_window: Duration) -> bool {
        now.saturating_duration_since(self.last_heartbeat_at) <= liveness_window
    }
}

/// Generate an instance ID of the form `<service>-<random>`.
///
/// Unique enough to avoid collisions between instances started by the same
/// process, not globally unique.
pub fn generate_instance_id(service_name: &str) -> String {
    let suffix: u64 = rand::thread_rng().gen();
    format!("{}-{}", service_name, suffix)
}
