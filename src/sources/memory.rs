//! In-memory configuration source.

use super::ConfigSource;
use crate::error::{ConfigError, Result};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Notify;

/// A programmatically populated configuration layer.
///
/// Useful for embedding defaults and for driving the resolver in tests: every
/// mutation wakes a pending [`wait_for_change`](ConfigSource::wait_for_change),
/// and [`fail_with`](MemorySource::fail_with) makes subsequent loads fail until
/// [`recover`](MemorySource::recover) is called. Clones share the same state.
///
/// # Examples
///
/// ```rust
/// use node_bootstrap::sources::MemorySource;
///
/// let defaults = MemorySource::new("defaults")
///     .with_value("service.port", 5000i64)
///     .with_priority(10);
/// ```
#[derive(Clone)]
pub struct MemorySource {
    name: String,
    priority: i32,
    optional: bool,
    reloadable: bool,
    inner: Arc<Inner>,
}

struct Inner {
    state: Mutex<State>,
    changed: Notify,
}

#[derive(Default)]
struct State {
    values: HashMap<String, config::Value>,
    failure: Option<String>,
    loads: usize,
}

impl MemorySource {
    /// Create an empty source with priority 100.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            priority: 100,
            optional: false,
            reloadable: false,
            inner: Arc::new(Inner {
                state: Mutex::new(State::default()),
                changed: Notify::new(),
            }),
        }
    }

    /// Set the priority for this source.
    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    /// Tolerate load failures.
    pub fn optional(mut self, optional: bool) -> Self {
        self.optional = optional;
        self
    }

    /// Report mutations as configuration changes.
    pub fn reloadable(mut self, reloadable: bool) -> Self {
        self.reloadable = reloadable;
        self
    }

    /// Seed a value without signalling a change.
    pub fn with_value(self, key: impl Into<String>, value: impl Into<config::Value>) -> Self {
        self.inner
            .state
            .lock()
            .values
            .insert(key.into(), value.into());
        self
    }

    /// Set a value and signal a change.
    pub fn set(&self, key: impl Into<String>, value: impl Into<config::Value>) {
        self.inner
            .state
            .lock()
            .values
            .insert(key.into(), value.into());
        self.inner.changed.notify_one();
    }

    /// Remove a value and signal a change.
    pub fn remove(&self, key: &str) {
        self.inner.state.lock().values.remove(key);
        self.inner.changed.notify_one();
    }

    /// Replace all values at once and signal a single change.
    pub fn replace(&self, values: HashMap<String, config::Value>) {
        self.inner.state.lock().values = values;
        self.inner.changed.notify_one();
    }

    /// Make subsequent loads fail with the given message.
    pub fn fail_with(&self, message: impl Into<String>) {
        self.inner.state.lock().failure = Some(message.into());
    }

    /// Undo [`fail_with`](MemorySource::fail_with).
    pub fn recover(&self) {
        self.inner.state.lock().failure = None;
    }

    /// Signal a change without touching the values.
    pub fn touch(&self) {
        self.inner.changed.notify_one();
    }

    /// Number of load attempts so far.
    pub fn load_count(&self) -> usize {
        self.inner.state.lock().loads
    }
}

#[async_trait]
impl ConfigSource for MemorySource {
    async fn load(&self) -> Result<HashMap<String, config::Value>> {
        let mut state = self.inner.state.lock();
        state.loads += 1;
        match &state.failure {
            Some(message) => Err(ConfigError::LoadError(message.clone())),
            None => Ok(state.values.clone()),
        }
    }

    fn name(&self) -> String {
        format!("memory:{}", self.name)
    }

    fn priority(&self) -> i32 {
        self.priority
    }

    fn is_optional(&self) -> bool {
        self.optional
    }

    fn is_reloadable(&self) -> bool {
        self.reloadable
    }

    async fn wait_for_change(&self) -> Result<()> {
        if !self.reloadable {
            return Err(ConfigError::WatchNotSupported);
        }
        self.inner.changed.notified().await;
        Ok(())
    }
}
