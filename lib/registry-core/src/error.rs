use thiserror::Error;

pub type Result<T> = std::result::Result<T, RegistryError>;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    #[error("No live instances found for service: {0}")]
    NotFound(String),

    #[error("Service not registered: {0}")]
    ServiceNotRegistered(String),

    #[error("Instance {instance_id} not registered for service: {service_name}")]
    InstanceNotRegistered {
        service_name: String,
        instance_id: String,
    },

    #[error("Nothing registered for service: {0}")]
    NotRegistered(String),

    #[error("Invalid instance: {0}")]
    InvalidInstance(String),

    #[error("Invalid registry configuration: {0}")]
    InvalidConfiguration(String),

    #[error("Registry deadline exceeded: {0}")]
    Timeout(String),

    #[error("Registry unavailable: {0}")]
    Unavailable(String),

    #[error("Registry protocol error: {0}")]
    Protocol(String),
}

impl From<serde_yaml::Error> for RegistryError {
    fn from(err: serde_yaml::Error) -> Self {
        RegistryError::InvalidConfiguration(err.to_string())
    }
}

impl RegistryError {
    /// True for errors that indicate registry state disagreeing with the caller
    /// (health check or deregister of something the registry never saw).
    pub fn is_state_mismatch(&self) -> bool {
        matches!(
            self,
            RegistryError::ServiceNotRegistered(_)
                | RegistryError::InstanceNotRegistered { .. }
                | RegistryError::NotRegistered(_)
        )
    }
}
