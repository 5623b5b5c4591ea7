//! File-based configuration source.

use super::ConfigSource;
use crate::error::{ConfigError, Result};
use async_trait::async_trait;
use config::File;
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

#[cfg(feature = "file-watch")]
use crate::notify::ConfigWatcher;
#[cfg(feature = "file-watch")]
use tokio::sync::{Mutex, mpsc};

/// File-based configuration source.
///
/// Loads configuration from YAML, TOML, or JSON files with automatic format detection
/// based on file extension. A file may be marked optional (a missing or broken file
/// contributes nothing) and reloadable (edits trigger a rebuild while the resolver is
/// being watched).
///
/// # Examples
///
/// ```rust,no_run
/// use node_bootstrap::sources::FileSource;
///
/// let source = FileSource::new("appsettings.json")
///     .optional(true)
///     .reloadable(true);
/// ```
pub struct FileSource {
    path: PathBuf,
    priority: i32,
    optional: bool,
    reloadable: bool,
    debounce: Duration,
    #[cfg(feature = "file-watch")]
    watch: Mutex<Option<FileWatch>>,
}

#[cfg(feature = "file-watch")]
struct FileWatch {
    _watcher: ConfigWatcher,
    rx: mpsc::Receiver<()>,
}

impl FileSource {
    /// Create a new file source with automatic format detection.
    ///
    /// The format is detected from the file extension:
    /// - `.yaml`, `.yml` -> YAML
    /// - `.toml` -> TOML
    /// - `.json` -> JSON
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            priority: 100,
            optional: false,
            reloadable: false,
            debounce: Duration::from_millis(250),
            #[cfg(feature = "file-watch")]
            watch: Mutex::new(None),
        }
    }

    /// Set the priority for this source.
    ///
    /// Higher priority sources override lower priority ones.
    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    /// Tolerate a missing or unreadable file.
    pub fn optional(mut self, optional: bool) -> Self {
        self.optional = optional;
        self
    }

    /// Report edits to the file as configuration changes.
    ///
    /// Only effective with the `file-watch` feature.
    pub fn reloadable(mut self, reloadable: bool) -> Self {
        self.reloadable = reloadable;
        self
    }

    /// Minimum time between two change notifications.
    pub fn with_debounce(mut self, debounce: Duration) -> Self {
        self.debounce = debounce;
        self
    }

    /// Validate that the file extension is supported.
    fn validate_extension(&self) -> Result<()> {
        let extension = self
            .path
            .extension()
            .and_then(|ext| ext.to_str())
            .ok_or_else(|| {
                ConfigError::LoadError(format!(
                    "Unable to determine file format for: {}",
                    self.path.display()
                ))
            })?;

        match extension {
            "yaml" | "yml" | "toml" | "json" => Ok(()),
            _ => Err(ConfigError::LoadError(format!(
                "Unsupported file extension: {}. Supported: .yaml, .yml, .toml, .json",
                extension
            ))),
        }
    }
}

#[async_trait]
impl ConfigSource for FileSource {
    async fn load(&self) -> Result<HashMap<String, config::Value>> {
        self.validate_extension()?;

        if !self.path.exists() {
            return Err(ConfigError::LoadError(format!(
                "Configuration file not found: {}",
                self.path.display()
            )));
        }

        let config = config::Config::builder()
            .add_source(File::from(self.path.clone()).required(true))
            .build()
            .map_err(|e| ConfigError::LoadError(format!("Failed to load file: {}", e)))?;

        config
            .try_deserialize::<HashMap<String, config::Value>>()
            .map_err(|e| ConfigError::ParseError(format!("Failed to parse file: {}", e)))
    }

    fn name(&self) -> String {
        format!("file:{}", self.path.display())
    }

    fn priority(&self) -> i32 {
        self.priority
    }

    fn is_optional(&self) -> bool {
        self.optional
    }

    fn is_reloadable(&self) -> bool {
        self.reloadable && cfg!(feature = "file-watch")
    }

    #[cfg(feature = "file-watch")]
    async fn wait_for_change(&self) -> Result<()> {
        if !self.reloadable {
            return Err(ConfigError::WatchNotSupported);
        }

        // The watcher is created lazily so that a file which appears after
        // startup is picked up on a later retry.
        let mut guard = self.watch.lock().await;
        if guard.is_none() {
            let (watcher, rx) = ConfigWatcher::new(self.debounce)?;
            watcher.watch(&self.path).await?;
            *guard = Some(FileWatch {
                _watcher: watcher,
                rx,
            });
        }

        let state = guard
            .as_mut()
            .ok_or_else(|| ConfigError::WatchError("file watcher missing".to_string()))?;
        match state.rx.recv().await {
            Some(()) => Ok(()),
            None => {
                *guard = None;
                Err(ConfigError::WatchError(format!(
                    "watcher for {} stopped",
                    self.path.display()
                )))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_validate_extension() {
        for name in ["config.yaml", "config.yml", "config.toml", "config.json"] {
            assert!(FileSource::new(name).validate_extension().is_ok(), "{name}");
        }
        assert!(FileSource::new("config.txt").validate_extension().is_err());
        assert!(FileSource::new("config").validate_extension().is_err());
    }

    #[tokio::test]
    async fn test_load_json_file() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("appsettings.json");
        fs::write(
            &config_path,
            r#"{ "port": 80, "registry": { "host": "127.0.0.1", "port": 8500 } }"#,
        )
        .unwrap();

        let map = FileSource::new(&config_path).load().await.unwrap();
        assert_eq!(map["port"].clone().into_int().unwrap(), 80);
        assert!(map["registry"].clone().into_table().is_ok());
    }

    #[tokio::test]
    async fn test_load_nonexistent_file() {
        let source = FileSource::new("/nonexistent/config.yaml");
        let err = source.load().await.unwrap_err();
        assert!(matches!(err, ConfigError::LoadError(_)));
    }

    #[tokio::test]
    async fn test_load_malformed_file() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("broken.json");
        fs::write(&config_path, "{ not json").unwrap();

        assert!(FileSource::new(&config_path).load().await.is_err());
    }

    #[test]
    fn test_flags() {
        let source = FileSource::new("config.yaml")
            .with_priority(200)
            .optional(true);
        assert_eq!(source.priority(), 200);
        assert!(source.is_optional());
        assert!(!source.is_reloadable());
        assert!(source.name().contains("config.yaml"));
    }

    #[tokio::test]
    async fn test_non_reloadable_file_cannot_be_watched() {
        let source = FileSource::new("config.yaml");
        let err = source.wait_for_change().await.unwrap_err();
        assert!(matches!(err, ConfigError::WatchNotSupported));
    }

    #[cfg(feature = "file-watch")]
    #[tokio::test]
    async fn test_reloadable_file_reports_change() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("config.yaml");
        fs::write(&config_path, "port: 8080").unwrap();

        let source = std::sync::Arc::new(
            FileSource::new(&config_path)
                .reloadable(true)
                .with_debounce(Duration::from_millis(10)),
        );

        let waiter = {
            let source = std::sync::Arc::clone(&source);
            tokio::spawn(async move { source.wait_for_change().await })
        };

        // Give the watcher time to register before editing.
        tokio::time::sleep(Duration::from_millis(200)).await;
        fs::write(&config_path, "port: 9090").unwrap();

        let outcome = tokio::time::timeout(Duration::from_secs(5), waiter)
            .await
            .expect("change notification")
            .unwrap();
        assert!(outcome.is_ok());
    }
}
