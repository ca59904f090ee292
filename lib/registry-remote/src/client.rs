//! HTTP client for a remote registry server

use crate::api::{
    self, DiscoverRequest, DiscoverResponse, ErrorBody, InstanceRequest, RegisterRequest,
};
use async_trait::async_trait;
use registry_core::{Registry, RegistryConfig, RegistryError, Result};
use serde::Serialize;
use std::time::Duration;
use tracing::debug;

/// HttpRegistry implements `Registry` against a `RegistryServer`.
///
/// Each call is an independent round trip bounded by the request timeout; no
/// local lock is held while a request is in flight.
#[derive(Clone)]
pub struct HttpRegistry {
    client: reqwest::Client,
    base_url: String,
}

impl HttpRegistry {
    pub fn new(base_url: &str, request_timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(request_timeout)
            .connect_timeout(request_timeout)
            .build()
            .map_err(|e| RegistryError::InvalidConfiguration(e.to_string()))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn from_config(config: &RegistryConfig) -> Result<Self> {
        Self::new(&config.remote_url, config.request_timeout())
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn post<B: Serialize + ?Sized>(&self, path: &str, body: &B) -> Result<reqwest::Response> {
        let url = format!("{}{}", self.base_url, path);
        let response = self
            .client
            .post(&url)
            .json(body)
            .send()
            .await
            .map_err(|e| transport_error(path, e))?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        match response.json::<ErrorBody>().await {
            Ok(body) => Err(body.into_registry_error()),
            Err(e) => Err(RegistryError::Protocol(format!(
                "{} returned {} without an error body: {}",
                path, status, e
            ))),
        }
    }
}

fn transport_error(path: &str, err: reqwest::Error) -> RegistryError {
    if err.is_timeout() {
        RegistryError::Timeout(format!("{} timed out", path))
    } else {
        RegistryError::Unavailable(format!("{}: {}", path, err))
    }
}

#[async_trait]
impl Registry for HttpRegistry {
    async fn register(&self, instance_id: &str, service_name: &str, address: &str) -> Result<()> {
        let body = RegisterRequest {
            instance_id: instance_id.to_string(),
            service_name: service_name.to_string(),
            address: address.to_string(),
        };
        self.post(api::REGISTER_PATH, &body).await?;
        debug!(service = service_name, instance_id, address, "Registered with remote registry");
        Ok(())
    }

    async fn deregister(&self, instance_id: &str, service_name: &str) -> Result<()> {
        let body = InstanceRequest {
            instance_id: instance_id.to_string(),
            service_name: service_name.to_string(),
        };
        self.post(api::DEREGISTER_PATH, &body).await?;
        Ok(())
    }

    async fn health_check(&self, instance_id: &str, service_name: &str) -> Result<()> {
        let body = InstanceRequest {
            instance_id: instance_id.to_string(),
            service_name: service_name.to_string(),
        };
        self.post(api::HEARTBEAT_PATH, &body).await?;
        Ok(())
    }

    async fn discover(&self, service_name: &str) -> Result<Vec<String>> {
        let body = DiscoverRequest {
            service_name: service_name.to_string(),
        };
        let response = self.post(api::DISCOVER_PATH, &body).await?;
        let discovered: DiscoverResponse = response
            .json()
            .await
            .map_err(|e| RegistryError::Protocol(format!("invalid discover response: {}", e)))?;

        if discovered.addresses.is_empty() {
            return Err(RegistryError::NotFound(service_name.to_string()));
        }
        Ok(discovered.addresses)
    }
}
