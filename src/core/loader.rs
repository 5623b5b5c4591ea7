//! Configuration loader that merges multiple sources.

use crate::core::ResolvedSettings;
use crate::core::settings::overlay;
use crate::error::{ConfigError, Result};
use crate::sources::ConfigSource;
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

type Payload = HashMap<String, config::Value>;

struct Layer {
    source: Arc<dyn ConfigSource>,
    last_good: Mutex<Option<Payload>>,
}

/// Loads and merges configuration from multiple sources.
///
/// Sources are kept sorted by priority (stable, so equal priorities keep their
/// insertion order) and merged lowest first, so higher priority sources
/// override values from lower priority sources.
pub struct ConfigLoader {
    layers: Vec<Layer>,
}

impl ConfigLoader {
    /// Create a new configuration loader.
    pub fn new() -> Self {
        Self { layers: Vec::new() }
    }

    /// Add a configuration source.
    pub fn add_source(&mut self, source: Arc<dyn ConfigSource>) {
        let priority = source.priority();
        let index = self
            .layers
            .partition_point(|layer| layer.source.priority() <= priority);
        self.layers.insert(
            index,
            Layer {
                source,
                last_good: Mutex::new(None),
            },
        );
    }

    /// Load every source and merge the results into one snapshot.
    ///
    /// An optional source that fails is logged and replaced by the payload it
    /// returned on its last successful load, or skipped if it never loaded.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - No sources were added
    /// - A non-optional source fails to load
    pub async fn load(&self) -> Result<ResolvedSettings> {
        if self.layers.is_empty() {
            return Err(ConfigError::LoadError(
                "No configuration sources specified".to_string(),
            ));
        }

        let mut merged = BTreeMap::new();
        let mut contributors = Vec::with_capacity(self.layers.len());
        let mut skipped = Vec::new();

        for layer in &self.layers {
            let name = layer.source.name();
            match layer.source.load().await {
                Ok(values) => {
                    *layer.last_good.lock() = Some(values.clone());
                    overlay(&mut merged, "", values);
                    contributors.push(name);
                }
                Err(e) if layer.source.is_optional() => {
                    let previous = layer.last_good.lock().clone();
                    match previous {
                        Some(values) => {
                            tracing::warn!(source = %name, error = %e, "optional source failed, keeping its last good values");
                            overlay(&mut merged, "", values);
                            contributors.push(name.clone());
                        }
                        None => {
                            tracing::warn!(source = %name, error = %e, "optional source failed, skipping it");
                        }
                    }
                    skipped.push(name);
                }
                Err(e) => {
                    return Err(ConfigError::LoadError(format!(
                        "Failed to load source '{}': {}",
                        name, e
                    )));
                }
            }
        }

        tracing::debug!(sources = ?contributors, keys = merged.len(), "configuration merged");
        ResolvedSettings::from_layers(merged, contributors, skipped)
    }

    /// Sources that can report changes.
    pub fn reloadable_sources(&self) -> Vec<Arc<dyn ConfigSource>> {
        self.layers
            .iter()
            .filter(|layer| layer.source.is_reloadable())
            .map(|layer| Arc::clone(&layer.source))
            .collect()
    }

    /// Get the list of source names in priority order.
    pub fn source_names(&self) -> Vec<String> {
        self.layers.iter().map(|layer| layer.source.name()).collect()
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sources::MemorySource;
    use serde::Deserialize;

    #[derive(Debug, Deserialize, PartialEq)]
    struct TestConfig {
        port: u16,
        host: String,
    }

    fn loader(sources: Vec<MemorySource>) -> ConfigLoader {
        let mut loader = ConfigLoader::new();
        for source in sources {
            loader.add_source(Arc::new(source));
        }
        loader
    }

    #[tokio::test]
    async fn test_empty_loader() {
        let loader = ConfigLoader::new();
        assert!(loader.load().await.is_err());
    }

    #[tokio::test]
    async fn test_precedence() {
        let defaults = MemorySource::new("default")
            .with_value("port", 8080i64)
            .with_value("host", "localhost");
        let overrides = MemorySource::new("override")
            .with_priority(200)
            .with_value("port", 9090i64);

        let settings = loader(vec![overrides, defaults]).load().await.unwrap();
        let config: TestConfig = settings.bind().unwrap();
        assert_eq!(config.port, 9090); // Overridden
        assert_eq!(config.host, "localhost"); // From default
        assert_eq!(
            settings.contributors(),
            &["memory:default".to_string(), "memory:override".to_string()]
        );
    }

    #[tokio::test]
    async fn test_required_source_failure_aborts() {
        let broken = MemorySource::new("broken");
        broken.fail_with("malformed payload");

        let err = loader(vec![broken]).load().await.unwrap_err();
        assert!(err.to_string().contains("memory:broken"));
    }

    #[tokio::test]
    async fn test_optional_source_failure_is_skipped_then_cached() {
        let base = MemorySource::new("base").with_value("port", 80i64);
        let remote = MemorySource::new("remote")
            .with_priority(250)
            .optional(true)
            .with_value("port", 9090i64);
        remote.fail_with("unreachable");

        let loader = loader(vec![base, remote.clone()]);

        let first = loader.load().await.unwrap();
        assert_eq!(first.get::<u16>("port").unwrap(), 80);
        assert_eq!(first.skipped(), &["memory:remote".to_string()]);

        remote.recover();
        let second = loader.load().await.unwrap();
        assert_eq!(second.get::<u16>("port").unwrap(), 9090);
        assert!(second.skipped().is_empty());

        // Fails again: the last good payload stays in effect.
        remote.fail_with("unreachable");
        let third = loader.load().await.unwrap();
        assert_eq!(third.get::<u16>("port").unwrap(), 9090);
        assert_eq!(third.skipped(), &["memory:remote".to_string()]);
    }

    #[test]
    fn test_source_names() {
        let loader = loader(vec![
            MemorySource::new("source1").with_priority(100),
            MemorySource::new("source2").with_priority(200),
            MemorySource::new("source3").with_priority(50),
            MemorySource::new("source4").with_priority(100),
        ]);

        assert_eq!(
            loader.source_names(),
            vec![
                "memory:source3",
                "memory:source1",
                "memory:source4",
                "memory:source2"
            ]
        );
    }

    #[test]
    fn test_reloadable_sources() {
        let loader = loader(vec![
            MemorySource::new("static"),
            MemorySource::new("remote").reloadable(true),
        ]);
        let names: Vec<String> = loader
            .reloadable_sources()
            .iter()
            .map(|s| s.name())
            .collect();
        assert_eq!(names, vec!["memory:remote"]);
    }

    #[tokio::test]
    async fn test_optional_payload_keys_with_separators_merge() {
        let levels = |level: &str| {
            HashMap::from([
                ("Microsoft/AspNetCore".to_string(), level.to_string()),
                ("System Net:Http".to_string(), "Error".to_string()),
            ])
        };
        let base = MemorySource::new("base").with_value("port", 80i64);
        let remote = MemorySource::new("remote")
            .with_priority(250)
            .optional(true)
            .with_value("logging", levels("Warning"));

        let loader = loader(vec![base, remote.clone()]);
        let settings = loader.load().await.unwrap();
        assert_eq!(settings.get::<u16>("port").unwrap(), 80);
        assert!(settings.skipped().is_empty());

        let logging: HashMap<String, String> = settings.bind_section("logging").unwrap();
        assert_eq!(logging, levels("Warning"));

        // Later loads keep merging instead of failing on the same keys.
        remote.set("logging", levels("Debug"));
        let reloaded = loader.load().await.unwrap();
        assert_eq!(
            reloaded.changed_keys(&settings),
            vec!["logging.Microsoft/AspNetCore".to_string()]
        );
    }
}
