use registry_core::RegistryError;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, ClientError>;

#[derive(Error, Debug)]
pub enum ClientError {
    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error("Failed to connect to {service} at {address}: {message}")]
    Connect {
        service: String,
        address: String,
        message: String,
    },

    #[error("Heartbeat gave up after {failures} consecutive failures: {last}")]
    Heartbeat { failures: u32, last: RegistryError },

    #[error("Heartbeat task failed: {0}")]
    Task(String),
}
