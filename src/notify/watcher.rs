//! File watching for reloadable file sources.

use crate::error::{ConfigError, Result};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher as NotifyWatcher};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::sync::mpsc;

/// Watches configuration files and emits one signal per burst of edits.
///
/// Editors tend to write a file in several steps; events arriving within the
/// debounce window after the first one are folded into a single signal.
///
/// # Examples
///
/// ```rust,no_run
/// use node_bootstrap::notify::ConfigWatcher;
/// use std::time::Duration;
///
/// # async fn example() -> node_bootstrap::error::Result<()> {
/// let (watcher, mut rx) = ConfigWatcher::new(Duration::from_millis(250))?;
/// watcher.watch("appsettings.json").await?;
///
/// while let Some(()) = rx.recv().await {
///     println!("appsettings.json changed");
/// }
/// # Ok(())
/// # }
/// ```
pub struct ConfigWatcher {
    watcher: tokio::sync::Mutex<RecommendedWatcher>,
    debounce_duration: Duration,
    watched_paths: tokio::sync::Mutex<Vec<PathBuf>>,
}

impl ConfigWatcher {
    /// Create a new configuration watcher.
    ///
    /// Returns the watcher and the receiver that gets a `()` per debounced
    /// change. Dropping the watcher ends the stream.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying file watcher cannot be created.
    pub fn new(debounce_duration: Duration) -> Result<(Self, mpsc::Receiver<()>)> {
        let (tx, rx) = mpsc::channel(1);
        let (event_tx, mut event_rx) = mpsc::unbounded_channel::<Event>();

        let watcher = notify::recommended_watcher(move |res: notify::Result<Event>| match res {
            Ok(event) if matches!(event.kind, EventKind::Modify(_) | EventKind::Create(_)) => {
                let _ = event_tx.send(event);
            }
            Ok(_) => {}
            Err(e) => tracing::warn!(error = %e, "file watcher reported an error"),
        })
        .map_err(|e| ConfigError::WatchError(format!("Failed to create file watcher: {}", e)))?;

        tokio::spawn(async move {
            while let Some(event) = event_rx.recv().await {
                tokio::time::sleep(debounce_duration).await;
                let mut folded = 1;
                while event_rx.try_recv().is_ok() {
                    folded += 1;
                }
                tracing::debug!(paths = ?event.paths, events = folded, "configuration file changed");

                // A full channel already carries a pending signal.
                if let Err(mpsc::error::TrySendError::Closed(())) = tx.try_send(()) {
                    break;
                }
            }
        });

        Ok((
            Self {
                watcher: tokio::sync::Mutex::new(watcher),
                debounce_duration,
                watched_paths: tokio::sync::Mutex::new(Vec::new()),
            },
            rx,
        ))
    }

    /// Add a path to watch for changes.
    ///
    /// # Errors
    ///
    /// Returns an error if the path cannot be watched (e.g., doesn't exist).
    pub async fn watch(&self, path: impl AsRef<Path>) -> Result<()> {
        let canonical_path = path
            .as_ref()
            .canonicalize()
            .map_err(|e| ConfigError::WatchError(format!("Failed to resolve path: {}", e)))?;

        self.watcher
            .lock()
            .await
            .watch(&canonical_path, RecursiveMode::NonRecursive)
            .map_err(|e| ConfigError::WatchError(format!("Failed to watch path: {}", e)))?;

        let mut paths = self.watched_paths.lock().await;
        if !paths.contains(&canonical_path) {
            paths.push(canonical_path);
        }

        Ok(())
    }

    /// Get the debounce duration for this watcher.
    pub fn debounce_duration(&self) -> Duration {
        self.debounce_duration
    }

    /// Get a list of currently watched paths.
    pub async fn watched_paths(&self) -> Vec<PathBuf> {
        self.watched_paths.lock().await.clone()
    }
}
