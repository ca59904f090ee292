//! The registry contract shared by every backend

use crate::Result;
use async_trait::async_trait;

/// Service registry: maps a service name to the addresses of its live instances.
///
/// Implementations must be safe to share across tasks. Reads hand back owned
/// copies of addresses; no caller ever holds a reference into registry state.
#[async_trait]
pub trait Registry: Send + Sync {
    /// Insert or overwrite the record for `(service_name, instance_id)` and
    /// mark it live. Re-registering refreshes both liveness and address.
    async fn register(&self, instance_id: &str, service_name: &str, address: &str) -> Result<()>;

    /// Remove the record for `(service_name, instance_id)`.
    ///
    /// Fails with `NotRegistered` when the service name is unknown. Removing an
    /// unknown instance under a known service name succeeds.
    async fn deregister(&self, instance_id: &str, service_name: &str) -> Result<()>;

    /// Mark an instance live as of now.
    async fn health_check(&self, instance_id: &str, service_name: &str) -> Result<()>;

    /// Addresses of every instance whose last heartbeat is within the liveness
    /// window. Fails with `NotFound` rather than returning an empty list.
    async fn discover(&self, service_name: &str) -> Result<Vec<String>>;
}
