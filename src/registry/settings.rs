//! Typed settings consumed by the registration side.

use crate::error::{ConfigError, RegistryError};
use reqwest::Url;
use serde::Deserialize;
use std::time::Duration;

#[cfg(feature = "validation")]
use crate::core::Validate;
#[cfg(feature = "validation")]
use crate::error::ValidationError;

fn default_scheme() -> String {
    "http".to_string()
}

fn default_timeout_ms() -> u64 {
    5_000
}

/// Where the service registry is reached. Bound from the `registry` section.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct RegistryConnectionSettings {
    /// `http` or `https`.
    #[serde(default = "default_scheme")]
    pub scheme: String,
    /// Registry agent host name or address.
    pub host: String,
    /// Registry agent port.
    pub port: u16,
    /// ACL token sent with every call.
    #[serde(default)]
    pub token: Option<String>,
    /// Per-call timeout, also bounding each teardown step.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

impl RegistryConnectionSettings {
    /// Base URL of the registry API.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::BindError`] if scheme and host do not form a URL.
    pub fn base_url(&self) -> Result<Url, RegistryError> {
        let raw = format!("{}://{}:{}/", self.scheme, self.host, self.port);
        Url::parse(&raw).map_err(|e| {
            ConfigError::BindError(format!("invalid registry address '{}': {}", raw, e)).into()
        })
    }

    /// Per-call timeout.
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

fn default_check_path() -> String {
    "status".to_string()
}

fn default_check_interval() -> u64 {
    15
}

/// Health-check publication. Bound from `service.health_check`; off by default.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct HealthCheckSettings {
    /// Whether a health check is attached after registration.
    #[serde(default)]
    pub enabled: bool,
    /// Path, relative to the advertised base URI, that the registry probes.
    #[serde(default = "default_check_path")]
    pub path: String,
    /// Seconds between probes.
    #[serde(default = "default_check_interval")]
    pub interval_secs: u64,
}

impl Default for HealthCheckSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            path: default_check_path(),
            interval_secs: default_check_interval(),
        }
    }
}

/// What the node publishes about itself. Bound from the `service` section.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct ServiceSettings {
    /// Logical service name.
    pub name: String,
    /// Version tag.
    pub version: String,
    /// Port the node serves on.
    pub port: u16,
    /// Scheme of the advertised URI.
    #[serde(default = "default_scheme")]
    pub scheme: String,
    /// Free-form registry tags.
    #[serde(default)]
    pub tags: Vec<String>,
    /// Optional health check.
    #[serde(default)]
    pub health_check: HealthCheckSettings,
}

/// Everything the bootstrap needs from the resolved configuration.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct NodeSettings {
    /// The published service.
    pub service: ServiceSettings,
    /// The registry connection.
    pub registry: RegistryConnectionSettings,
}

#[cfg(feature = "validation")]
impl Validate for NodeSettings {
    fn validate(&self) -> Result<(), ValidationError> {
        let mut errors = Vec::new();
        if self.service.name.trim().is_empty() {
            errors.push(ValidationError::invalid_field("service.name", "must not be empty"));
        }
        if self.service.port == 0 {
            errors.push(ValidationError::invalid_field("service.port", "must not be 0"));
        }
        if self.registry.host.trim().is_empty() {
            errors.push(ValidationError::invalid_field("registry.host", "must not be empty"));
        }
        if self.service.health_check.enabled && self.service.health_check.interval_secs == 0 {
            errors.push(ValidationError::invalid_field(
                "service.health_check.interval_secs",
                "must be at least 1",
            ));
        }

        match errors.len() {
            0 => Ok(()),
            1 => Err(errors.remove(0)),
            _ => Err(ValidationError::Multiple(errors)),
        }
    }
}
