//! Wire types for the registry protocol
//!
//! Every operation is a JSON `POST`; errors come back as an [`ErrorBody`]
//! whose `code` maps one-to-one onto [`RegistryError`] variants.

use registry_core::RegistryError;
use serde::{Deserialize, Serialize};

pub const REGISTER_PATH: &str = "/v1/register";
pub const DEREGISTER_PATH: &str = "/v1/deregister";
pub const HEARTBEAT_PATH: &str = "/v1/heartbeat";
pub const DISCOVER_PATH: &str = "/v1/discover";

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RegisterRequest {
    pub instance_id: String,
    pub service_name: String,
    pub address: String,
}

/// Body of deregister and heartbeat requests
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct InstanceRequest {
    pub instance_id: String,
    pub service_name: String,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DiscoverRequest {
    pub service_name: String,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DiscoverResponse {
    pub service_name: String,
    pub addresses: Vec<String>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    NotFound,
    ServiceNotRegistered,
    InstanceNotRegistered,
    NotRegistered,
    InvalidInstance,
    BadRequest,
    Internal,
}

impl ErrorCode {
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorCode::NotFound => "not_found",
            ErrorCode::ServiceNotRegistered => "service_not_registered",
            ErrorCode::InstanceNotRegistered => "instance_not_registered",
            ErrorCode::NotRegistered => "not_registered",
            ErrorCode::InvalidInstance => "invalid_instance",
            ErrorCode::BadRequest => "bad_request",
            ErrorCode::Internal => "internal",
        }
    }

    pub fn status(self) -> u16 {
        match self {
            ErrorCode::NotFound
            | ErrorCode::ServiceNotRegistered
            | ErrorCode::InstanceNotRegistered
            | ErrorCode::NotRegistered => 404,
            ErrorCode::InvalidInstance | ErrorCode::BadRequest => 400,
            ErrorCode::Internal => 500,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub code: ErrorCode,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instance_id: Option<String>,
}

impl ErrorBody {
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self {
            code: ErrorCode::BadRequest,
            message: message.into(),
            service_name: None,
            instance_id: None,
        }
    }

    /// Rebuild the registry error the server reported.
    pub fn into_registry_error(self) -> RegistryError {
        let service_name = self.service_name.unwrap_or_default();
        match self.code {
            ErrorCode::NotFound => RegistryError::NotFound(service_name),
            ErrorCode::ServiceNotRegistered => RegistryError::ServiceNotRegistered(service_name),
            ErrorCode::InstanceNotRegistered => RegistryError::InstanceNotRegistered {
                service_name,
                instance_id: self.instance_id.unwrap_or_default(),
            },
            ErrorCode::NotRegistered => RegistryError::NotRegistered(service_name),
            ErrorCode::InvalidInstance => RegistryError::InvalidInstance(self.message),
            ErrorCode::BadRequest | ErrorCode::Internal => RegistryError::Protocol(self.message),
        }
    }
}

impl From<&RegistryError> for ErrorBody {
    fn from(err: &RegistryError) -> Self {
        let (code, service_name, instance_id) = match err {
            RegistryError::NotFound(s) => (ErrorCode::NotFound, Some(s.clone()), None),
            RegistryError::ServiceNotRegistered(s) => {
                (ErrorCode::ServiceNotRegistered, Some(s.clone()), None)
            }
            RegistryError::InstanceNotRegistered {
                service_name,
                instance_id,
            } => (
                ErrorCode::InstanceNotRegistered,
                Some(service_name.clone()),
                Some(instance_id.clone()),
            ),
            RegistryError::NotRegistered(s) => (ErrorCode::NotRegistered, Some(s.clone()), None),
            RegistryError::InvalidInstance(_) => (ErrorCode::InvalidInstance, None, None),
            _ => (ErrorCode::Internal, None, None),
        };
        let message = match err {
            RegistryError::InvalidInstance(reason) => reason.clone(),
            other => other.to_string(),
        };
        Self {
            code,
            message,
            service_name,
            instance_id,
        }
    }
}
