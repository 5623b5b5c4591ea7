//! Builder for constructing ConfigResolver instances.

use crate::core::{ConfigLoader, ConfigResolver};
use crate::error::Result;
use crate::sources::{ConfigSource, EnvSource, FileSource};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

#[cfg(feature = "metrics")]
use crate::metrics::ResolverMetrics;

struct FileLayer {
    path: PathBuf,
    optional: bool,
    reloadable: bool,
}

/// Builder for constructing a [`ConfigResolver`].
///
/// Files get priorities 100, 110, 120... in the order they are added, custom
/// sources keep their own priority, and the environment layer sits on top.
///
/// # Examples
///
/// ```rust,no_run
/// use node_bootstrap::prelude::*;
///
/// # async fn example() -> Result<()> {
/// let resolver = ConfigResolver::builder()
///     .with_file("config/default.yaml")
///     .with_optional_file("config/local.yaml")
///     .with_env_overrides("NODE", "__")
///     .build()
///     .await?;
/// # Ok(())
/// # }
/// ```
pub struct ConfigResolverBuilder {
    files: Vec<FileLayer>,
    env_prefix: Option<String>,
    env_separator: Option<String>,
    custom_sources: Vec<Arc<dyn ConfigSource>>,
    retry_backoff: Duration,
    #[cfg(feature = "metrics")]
    metrics: Option<ResolverMetrics>,
}

impl ConfigResolverBuilder {
    /// Create a new builder with default settings.
    pub fn new() -> Self {
        Self {
            files: Vec::new(),
            env_prefix: None,
            env_separator: None,
            custom_sources: Vec::new(),
            retry_backoff: Duration::from_secs(5),
            #[cfg(feature = "metrics")]
            metrics: None,
        }
    }

    /// Add a required file source with automatic format detection.
    ///
    /// Supported formats: YAML (.yaml, .yml), TOML (.toml), JSON (.json)
    pub fn with_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.files.push(FileLayer {
            path: path.into(),
            optional: false,
            reloadable: false,
        });
        self
    }

    /// Add a file that may be absent or broken, reloaded on change.
    pub fn with_optional_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.files.push(FileLayer {
            path: path.into(),
            optional: true,
            reloadable: true,
        });
        self
    }

    /// Add environment variable source with custom prefix.
    ///
    /// # Arguments
    ///
    /// * `prefix` - Prefix for environment variables (e.g., "NODE")
    /// * `separator` - Separator for nested keys (e.g., "__" for NODE_REGISTRY__HOST)
    ///
    /// Environment variables have the highest priority by default (300).
    pub fn with_env_overrides(mut self, prefix: &str, separator: &str) -> Self {
        self.env_prefix = Some(prefix.to_string());
        self.env_separator = Some(separator.to_string());
        self
    }

    /// Add a custom configuration source.
    pub fn with_source<S: ConfigSource + 'static>(mut self, source: S) -> Self {
        self.custom_sources.push(Arc::new(source));
        self
    }

    /// Delay before a failed watch on a source is retried. Default is 5 seconds.
    pub fn with_watch_retry(mut self, backoff: Duration) -> Self {
        self.retry_backoff = backoff;
        self
    }

    /// Record reload metrics with the given OpenTelemetry meter.
    #[cfg(feature = "metrics")]
    pub fn with_metrics(mut self, meter: opentelemetry::metrics::Meter) -> Self {
        self.metrics = Some(ResolverMetrics::new(meter));
        self
    }

    /// Build the resolver.
    ///
    /// This performs the initial load from all sources.
    ///
    /// # Errors
    ///
    /// Returns an error if no source was configured or a non-optional source
    /// fails to load.
    pub async fn build(self) -> Result<ConfigResolver> {
        let mut loader = ConfigLoader::new();

        for (index, file) in self.files.into_iter().enumerate() {
            let priority = 100 + (index as i32 * 10); // 100, 110, 120, etc.
            let source = FileSource::new(file.path)
                .with_priority(priority)
                .optional(file.optional)
                .reloadable(file.reloadable);
            loader.add_source(Arc::new(source));
        }

        for source in self.custom_sources {
            loader.add_source(source);
        }

        if let (Some(prefix), Some(separator)) = (self.env_prefix, self.env_separator) {
            loader.add_source(Arc::new(EnvSource::new(prefix, separator)));
        }

        let initial = loader.load().await?;
        tracing::info!(
            sources = ?initial.contributors(),
            skipped = ?initial.skipped(),
            keys = initial.len(),
            "configuration resolved"
        );

        let resolver = ConfigResolver::with_loader(initial, loader, self.retry_backoff);

        #[cfg(feature = "metrics")]
        let resolver = match self.metrics {
            Some(metrics) => {
                metrics.record_update();
                resolver.with_metrics(metrics)
            }
            None => resolver,
        };

        Ok(resolver)
    }
}

impl Default for ConfigResolverBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigResolver {
    /// Create a new builder for constructing a resolver.
    pub fn builder() -> ConfigResolverBuilder {
        ConfigResolverBuilder::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sources::MemorySource;

    #[test]
    fn test_builder_accumulates_files() {
        let builder = ConfigResolverBuilder::new()
            .with_file("config1.yaml")
            .with_optional_file("config2.yaml")
            .with_file("config3.yaml");

        assert_eq!(builder.files.len(), 3);
        assert!(builder.files[1].optional && builder.files[1].reloadable);
        assert!(!builder.files[0].optional);
    }

    #[test]
    fn test_builder_env_overrides() {
        let builder = ConfigResolverBuilder::new().with_env_overrides("NODE", "__");

        assert_eq!(builder.env_prefix, Some("NODE".to_string()));
        assert_eq!(builder.env_separator, Some("__".to_string()));
    }

    #[tokio::test]
    async fn test_build_without_sources_fails() {
        assert!(ConfigResolverBuilder::new().build().await.is_err());
    }

    #[tokio::test]
    async fn test_missing_optional_file_is_tolerated() {
        let resolver = ConfigResolver::builder()
            .with_optional_file("/nonexistent/appsettings.json")
            .with_source(MemorySource::new("defaults").with_value("port", 80i64))
            .build()
            .await
            .unwrap();

        assert_eq!(resolver.snapshot().get::<u16>("port").unwrap(), 80);
        assert_eq!(
            resolver.source_names(),
            vec!["file:/nonexistent/appsettings.json", "memory:defaults"]
        );
    }

    #[tokio::test]
    async fn test_missing_required_file_fails() {
        let result = ConfigResolver::builder()
            .with_file("/nonexistent/appsettings.json")
            .build()
            .await;
        assert!(result.is_err());
    }
}
