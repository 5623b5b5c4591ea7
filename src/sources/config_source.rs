//! Configuration source trait.

use crate::error::{ConfigError, Result};
use async_trait::async_trait;
use std::collections::HashMap;

/// Trait for configuration sources.
///
/// Implement this trait to plug additional layers (remote APIs, databases,
/// key-value stores) into the resolver. Sources are merged in ascending
/// [`priority`](ConfigSource::priority) order.
#[async_trait]
pub trait ConfigSource: Send + Sync {
    /// Load configuration as a raw string key-value map.
    ///
    /// Nested tables are merged key by key with the other layers; a key missing
    /// here keeps whatever a lower-priority layer provided.
    ///
    /// # Errors
    ///
    /// Returns an error if the source cannot be reached, read or parsed.
    async fn load(&self) -> Result<HashMap<String, config::Value>>;

    /// Get a human-readable name for this source (for logging/debugging).
    fn name(&self) -> String;

    /// Get the priority of this source (higher = takes precedence).
    ///
    /// Default priorities:
    /// - Environment variables: 300
    /// - Remote key/value store: 250
    /// - Local files: 100 and up
    fn priority(&self) -> i32 {
        100
    }

    /// Whether a load failure is tolerated.
    ///
    /// An optional source that fails contributes nothing on the first build and
    /// its last good payload on later reloads.
    fn is_optional(&self) -> bool {
        false
    }

    /// Whether this source can report changes through [`wait_for_change`](ConfigSource::wait_for_change).
    fn is_reloadable(&self) -> bool {
        false
    }

    /// Suspend until the source's content has changed.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::WatchNotSupported`] for sources that cannot be
    /// watched, or another error when the wait itself failed.
    async fn wait_for_change(&self) -> Result<()> {
        Err(ConfigError::WatchNotSupported)
    }
}
