//! Environment variable configuration source.

use super::ConfigSource;
use crate::error::{ConfigError, Result};
use async_trait::async_trait;
use config::Environment;
use std::collections::HashMap;

/// Environment variable configuration source.
///
/// Loads configuration from environment variables with a specified prefix
/// and separator for nested keys. This layer is always present and never
/// optional: reading the process environment cannot fail in a way worth
/// tolerating.
///
/// # Examples
///
/// ```rust
/// use node_bootstrap::sources::EnvSource;
///
/// // NODE_REGISTRY__HOST=consul.local -> registry.host = "consul.local"
/// let source = EnvSource::new("NODE", "__");
/// ```
pub struct EnvSource {
    prefix: String,
    separator: String,
    priority: i32,
    vars: Option<HashMap<String, String>>,
}

impl EnvSource {
    /// Create a new environment variable source.
    ///
    /// # Arguments
    ///
    /// * `prefix` - Prefix for environment variables (e.g., "NODE")
    /// * `separator` - Separator for nested keys (e.g., "__" for NODE_REGISTRY__HOST)
    pub fn new(prefix: impl Into<String>, separator: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            separator: separator.into(),
            priority: 300,
            vars: None,
        }
    }

    /// Set the priority for this source.
    ///
    /// Higher priority sources override lower priority ones.
    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    /// Read from a fixed set of variables instead of the process environment.
    pub fn with_vars(mut self, vars: HashMap<String, String>) -> Self {
        self.vars = Some(vars);
        self
    }
}

#[async_trait]
impl ConfigSource for EnvSource {
    async fn load(&self) -> Result<HashMap<String, config::Value>> {
        let env_source = Environment::with_prefix(&self.prefix)
            .prefix_separator("_")
            .separator(&self.separator)
            .try_parsing(true)
            .source(self.vars.clone());

        let config = config::Config::builder()
            .add_source(env_source)
            .build()
            .map_err(|e| {
                ConfigError::LoadError(format!("Failed to load environment variables: {}", e))
            })?;

        config
            .try_deserialize::<HashMap<String, config::Value>>()
            .map_err(|e| {
                ConfigError::ParseError(format!("Failed to parse environment variables: {}", e))
            })
    }

    fn name(&self) -> String {
        format!("env:{}*", self.prefix)
    }

    fn priority(&self) -> i32 {
        self.priority
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vars(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_env_source_creation() {
        let source = EnvSource::new("NODE", "__");
        assert_eq!(source.prefix, "NODE");
        assert_eq!(source.separator, "__");
        assert_eq!(source.priority(), 300);
        assert!(!source.is_optional());
        assert!(!source.is_reloadable());
    }

    #[test]
    fn test_name() {
        let source = EnvSource::new("NODE", "__");
        assert_eq!(source.name(), "env:NODE*");
    }

    #[tokio::test]
    async fn test_load_nested_keys() {
        let source = EnvSource::new("NODE", "__").with_vars(vars(&[
            ("NODE_PORT", "8080"),
            ("NODE_REGISTRY__HOST", "consul.local"),
            ("OTHER_PORT", "1"),
        ]));

        let map = source.load().await.unwrap();
        assert_eq!(map.len(), 2);
        assert_eq!(map["port"].clone().into_int().unwrap(), 8080);

        let registry = map["registry"].clone().into_table().unwrap();
        assert_eq!(
            registry["host"].clone().into_string().unwrap(),
            "consul.local"
        );
    }

    #[tokio::test]
    async fn test_load_without_matches_is_empty() {
        let source = EnvSource::new("NODE", "__").with_vars(vars(&[("PATH", "/usr/bin")]));
        let map = source.load().await.unwrap();
        assert!(map.is_empty());
    }
}
