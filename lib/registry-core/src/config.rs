//! Registry configuration
//!
//! Loaded from an optional YAML file named by `REGISTRY_CONFIG`, then
//! overridden field by field from `REGISTRY_*` environment variables.

use crate::{RegistryError, Result};
use serde::Deserialize;
use std::time::Duration;

/// Environment variable naming an optional YAML config file
pub const CONFIG_PATH_ENV: &str = "REGISTRY_CONFIG";

/// Which registry backend a process talks to
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    /// Single-process, in-memory registry
    #[default]
    Memory,
    /// Registry server reached over HTTP
    Remote,
}

/// How the resolver picks one address out of the live candidates
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SelectionPolicy {
    #[default]
    Random,
    RoundRobin,
}

#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(default)]
pub struct RegistryConfig {
    pub backend: BackendKind,
    /// Maximum heartbeat age for an instance to be discoverable
    pub liveness_window_ms: u64,
    /// Period of the heartbeat loop
    pub heartbeat_interval_ms: u64,
    /// Consecutive heartbeat failures tolerated before escalating
    pub heartbeat_max_failures: u32,
    /// Base URL of the registry server (remote backend)
    pub remote_url: String,
    /// Per-request timeout for the remote backend
    pub request_timeout_ms: u64,
    pub selection: SelectionPolicy,
    /// Extra connection attempts, each against a freshly resolved address
    pub connect_retries: u32,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            backend: BackendKind::Memory,
            liveness_window_ms: 5_000,
            heartbeat_interval_ms: 1_000,
            heartbeat_max_failures: 3,
            remote_url: "http://127.0.0.1:8500".to_string(),
            request_timeout_ms: 2_000,
            selection: SelectionPolicy::Random,
            connect_retries: 2,
        }
    }
}

impl RegistryConfig {
    pub fn liveness_window(&self) -> Duration {
        Duration::from_millis(self.liveness_window_ms)
    }

    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_millis(self.heartbeat_interval_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    /// Parse a YAML document; missing fields keep their defaults.
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        let config: RegistryConfig = serde_yaml::from_str(yaml)?;
        Ok(config)
    }

    /// Load configuration from the process environment and validate it.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration through an arbitrary variable lookup and validate it.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = match lookup(CONFIG_PATH_ENV) {
            Some(path) => {
                let yaml = std::fs::read_to_string(&path).map_err(|e| {
                    RegistryError::InvalidConfiguration(format!("failed to read {}: {}", path, e))
                })?;
                Self::from_yaml_str(&yaml)?
            }
            None => Self::default(),
        };

        if let Some(value) = lookup("REGISTRY_BACKEND") {
            config.backend = parse_enum("REGISTRY_BACKEND", &value)?;
        }
        if let Some(value) = lookup("REGISTRY_URL") {
            config.remote_url = value;
        }
        if let Some(value) = lookup("REGISTRY_LIVENESS_WINDOW_MS") {
            config.liveness_window_ms = parse_number("REGISTRY_LIVENESS_WINDOW_MS", &value)?;
        }
        if let Some(value) = lookup("REGISTRY_HEARTBEAT_INTERVAL_MS") {
            config.heartbeat_interval_ms = parse_number("REGISTRY_HEARTBEAT_INTERVAL_MS", &value)?;
        }
        if let Some(value) = lookup("REGISTRY_HEARTBEAT_MAX_FAILURES") {
            config.heartbeat_max_failures =
                parse_number("REGISTRY_HEARTBEAT_MAX_FAILURES", &value)?;
        }
        if let Some(value) = lookup("REGISTRY_SELECTION") {
            config.selection = parse_enum("REGISTRY_SELECTION", &value)?;
        }

        config.validate()?;
        Ok(config)
    }

    /// Check the invariants the heartbeat and liveness settings depend on.
    pub fn validate(&self) -> Result<()> {
        if self.liveness_window_ms == 0
            || self.heartbeat_interval_ms == 0
            || self.request_timeout_ms == 0
        {
            return Err(RegistryError::InvalidConfiguration(
                "liveness window, heartbeat interval and request timeout must be non-zero"
                    .to_string(),
            ));
        }
        // A single missed tick must not expire an instance.
        if self.heartbeat_interval_ms.saturating_mul(2) > self.liveness_window_ms {
            return Err(RegistryError::InvalidConfiguration(format!(
                "heartbeat interval {}ms must be at most half the liveness window {}ms",
                self.heartbeat_interval_ms, self.liveness_window_ms
            )));
        }
        if self.heartbeat_max_failures == 0 {
            return Err(RegistryError::InvalidConfiguration(
                "heartbeat_max_failures must be at least 1".to_string(),
            ));
        }
        if self.backend == BackendKind::Remote && self.remote_url.trim().is_empty() {
            return Err(RegistryError::InvalidConfiguration(
                "remote backend requires remote_url".to_string(),
            ));
        }
        Ok(())
    }
}

fn parse_number<T: std::str::FromStr>(key: &str, value: &str) -> Result<T> {
    value.trim().parse().map_err(|_| {
        RegistryError::InvalidConfiguration(format!("{} is not a number: {}", key, value))
    })
}

fn parse_enum<T: serde::de::DeserializeOwned>(key: &str, value: &str) -> Result<T> {
    serde_yaml::from_str(value.trim()).map_err(|_| {
        RegistryError::InvalidConfiguration(format!("{} has unknown value: {}", key, value))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn test_default_config() {
        let config = RegistryConfig::default();
        assert_eq!(config.backend, BackendKind::Memory);
        assert_eq!(config.liveness_window(), Duration::from_secs(5));
        assert_eq!(config.heartbeat_interval(), Duration::from_secs(1));
        assert_eq!(config.selection, SelectionPolicy::Random);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_env_overrides() {
        let config = RegistryConfig::from_lookup(lookup_from(&[
            ("REGISTRY_BACKEND", "remote"),
            ("REGISTRY_URL", "http://registry:8500"),
            ("REGISTRY_LIVENESS_WINDOW_MS", "10000"),
            ("REGISTRY_HEARTBEAT_INTERVAL_MS", "2000"),
            ("REGISTRY_SELECTION", "round_robin"),
        ]))
        .expect("config should load");

        assert_eq!(config.backend, BackendKind::Remote);
        assert_eq!(config.remote_url, "http://registry:8500");
        assert_eq!(config.liveness_window_ms, 10_000);
        assert_eq!(config.heartbeat_interval_ms, 2_000);
        assert_eq!(config.selection, SelectionPolicy::RoundRobin);
    }

    #[test]
    fn test_yaml_partial_document() {
        let config = RegistryConfig::from_yaml_str(
            "backend: remote\nremote_url: http://10.0.0.5:8500\nheartbeat_max_failures: 5\n",
        )
        .expect("yaml should parse");
        assert_eq!(config.backend, BackendKind::Remote);
        assert_eq!(config.remote_url, "http://10.0.0.5:8500");
        assert_eq!(config.heartbeat_max_failures, 5);
        assert_eq!(config.liveness_window_ms, 5_000);
    }

    #[test]
    fn test_yaml_unknown_backend_rejected() {
        let err = RegistryConfig::from_yaml_str("backend: etcd\n").unwrap_err();
        assert!(matches!(err, RegistryError::InvalidConfiguration(_)));
    }

    #[test]
    fn test_heartbeat_must_fit_twice_in_window() {
        let err = RegistryConfig::from_lookup(lookup_from(&[
            ("REGISTRY_LIVENESS_WINDOW_MS", "3000"),
            ("REGISTRY_HEARTBEAT_INTERVAL_MS", "2000"),
        ]))
        .unwrap_err();
        assert!(matches!(err, RegistryError::InvalidConfiguration(_)));
    }

    #[test]
    fn test_bad_number_rejected() {
        let err = RegistryConfig::from_lookup(lookup_from(&[(
            "REGISTRY_HEARTBEAT_INTERVAL_MS",
            "soon",
        )]))
        .unwrap_err();
        assert!(matches!(err, RegistryError::InvalidConfiguration(_)));
    }

    #[test]
    fn test_zero_request_timeout_rejected() {
        let config = RegistryConfig {
            backend: BackendKind::Remote,
            request_timeout_ms: 0,
            ..RegistryConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(RegistryError::InvalidConfiguration(_))
        ));
    }

    #[test]
    fn test_remote_requires_url() {
        let config = RegistryConfig {
            backend: BackendKind::Remote,
            remote_url: " ".to_string(),
            ..RegistryConfig::default()
        };
        assert!(config.validate().is_err());
    }
}
