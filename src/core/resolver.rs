//! The configuration resolver handle providing lock-free snapshot reads.

use crate::core::watch::{self, WatchHandle};
use crate::core::{ConfigLoader, LiveSettings, ResolvedSettings};
use crate::error::{ConfigError, Result, ValidationError};
use crate::notify::{SubscriberRegistry, SubscriptionHandle};
use arc_swap::ArcSwap;
use serde::de::DeserializeOwned;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

#[cfg(feature = "metrics")]
use crate::metrics::ResolverMetrics;

#[cfg(feature = "validation")]
use crate::core::Validate;

/// Layered configuration resolver with hot reload.
///
/// Holds the current [`ResolvedSettings`] in an `ArcSwap`: readers get the
/// prior snapshot or the new one in full, never a partial merge, and never
/// take a lock. Clones share the same snapshot, sources and subscribers.
///
/// # Examples
///
/// ```rust,no_run
/// use node_bootstrap::prelude::*;
/// use node_bootstrap::sources::ConsulKvSource;
///
/// # async fn example() -> node_bootstrap::error::Result<()> {
/// let resolver = ConfigResolver::builder()
///     .with_optional_file("appsettings.json")
///     .with_source(
///         ConsulKvSource::builder()
///             .with_address("http://127.0.0.1:8500")
///             .with_key("sampleservicesettings.json")
///             .build()?,
///     )
///     .with_env_overrides("NODE", "__")
///     .build()
///     .await?;
///
/// let port: u16 = resolver.snapshot().get("service.port")?;
/// let _watch = resolver.watch(|snapshot| println!("reloaded {} keys", snapshot.len()))?;
/// # Ok(())
/// # }
/// ```
pub struct ConfigResolver {
    current: Arc<ArcSwap<ResolvedSettings>>,
    loader: Arc<ConfigLoader>,
    subscribers: SubscriberRegistry,
    reload_lock: Arc<tokio::sync::Mutex<()>>,
    watching: Arc<AtomicBool>,
    retry_backoff: Duration,
    #[cfg(feature = "metrics")]
    metrics: Option<ResolverMetrics>,
}

impl ConfigResolver {
    pub(crate) fn with_loader(
        initial: ResolvedSettings,
        loader: ConfigLoader,
        retry_backoff: Duration,
    ) -> Self {
        Self {
            current: Arc::new(ArcSwap::from_pointee(initial)),
            loader: Arc::new(loader),
            subscribers: SubscriberRegistry::new(),
            reload_lock: Arc::new(tokio::sync::Mutex::new(())),
            watching: Arc::new(AtomicBool::new(false)),
            retry_backoff,
            #[cfg(feature = "metrics")]
            metrics: None,
        }
    }

    #[cfg(feature = "metrics")]
    pub(crate) fn with_metrics(mut self, metrics: ResolverMetrics) -> Self {
        let gauge = metrics.clone();
        self.subscribers
            .observe_count(move |count| gauge.update_subscriber_count(count as i64));
        self.metrics = Some(metrics);
        self
    }

    /// The current snapshot. Lock-free.
    pub fn snapshot(&self) -> Arc<ResolvedSettings> {
        self.current.load_full()
    }

    /// Bind the current snapshot onto `T`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::BindError`] when required fields are missing.
    pub fn bind<T: DeserializeOwned>(&self) -> Result<T> {
        self.current.load().bind()
    }

    /// Rebuild the merged snapshot from every source and publish it.
    ///
    /// Reloads are serialized, so snapshots are published in the order they
    /// were built. On error the previous snapshot stays in effect.
    ///
    /// # Errors
    ///
    /// Returns an error when a non-optional source fails.
    pub async fn reload(&self) -> Result<Arc<ResolvedSettings>> {
        let _guard = self.reload_lock.lock().await;

        #[cfg(feature = "metrics")]
        let timer = self.metrics.as_ref().map(|m| m.start_reload());

        let outcome = self.loader.load().await;

        #[cfg(feature = "metrics")]
        if let (Some(metrics), Some(timer)) = (&self.metrics, timer) {
            match &outcome {
                Ok(_) => metrics.record_reload_success(timer),
                Err(_) => metrics.record_reload_failure(timer),
            }
        }

        let snapshot = Arc::new(outcome?);
        let previous = self.current.swap(Arc::clone(&snapshot));
        let changed = snapshot.changed_keys(&previous);
        tracing::debug!(changed = ?changed, "published configuration snapshot");

        self.subscribers.notify_all(&snapshot);
        Ok(snapshot)
    }

    /// Subscribe to newly published snapshots.
    ///
    /// Returns a handle that can be dropped to unsubscribe.
    pub fn subscribe<F>(&self, callback: F) -> SubscriptionHandle
    where
        F: Fn(&Arc<ResolvedSettings>) + Send + Sync + 'static,
    {
        self.subscribers.subscribe(callback)
    }

    /// Start the background watch over every reloadable source.
    ///
    /// Each change triggers a full rebuild; `on_change` receives the new
    /// snapshot. Only one watch may exist per resolver.
    ///
    /// Must be called from within a Tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::WatchError`] if this resolver is already watched.
    pub fn watch<F>(&self, on_change: F) -> Result<WatchHandle>
    where
        F: Fn(Arc<ResolvedSettings>) + Send + Sync + 'static,
    {
        if self.watching.swap(true, Ordering::AcqRel) {
            return Err(ConfigError::WatchError(
                "resolver is already being watched".to_string(),
            ));
        }

        let sources = self.loader.reloadable_sources();
        tracing::info!(
            sources = ?sources.iter().map(|s| s.name()).collect::<Vec<_>>(),
            "watching configuration sources"
        );
        Ok(watch::spawn(
            self.clone(),
            sources,
            self.retry_backoff,
            on_change,
        ))
    }

    /// A typed view that is rebound on every reload.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::BindError`] if the current snapshot does not bind.
    pub fn live<T>(&self) -> Result<LiveSettings<T>>
    where
        T: DeserializeOwned + Send + Sync + 'static,
    {
        self.live_with(|_: &T| Ok(()))
    }

    /// A typed view rebound on every reload, accepting only values that pass `validator`.
    ///
    /// A reload whose typed value fails to bind or validate is logged and the
    /// previous typed value is kept.
    ///
    /// # Errors
    ///
    /// Returns an error if the current snapshot does not bind or validate.
    pub fn live_with<T, F>(&self, validator: F) -> Result<LiveSettings<T>>
    where
        T: DeserializeOwned + Send + Sync + 'static,
        F: Fn(&T) -> std::result::Result<(), ValidationError> + Send + Sync + 'static,
    {
        let initial: T = self.bind()?;
        validator(&initial)?;

        Ok(LiveSettings::attach(self, initial, validator))
    }

    /// A typed view validated through its [`Validate`] implementation.
    ///
    /// # Errors
    ///
    /// Returns an error if the current snapshot does not bind or validate.
    #[cfg(feature = "validation")]
    pub fn live_validated<T>(&self) -> Result<LiveSettings<T>>
    where
        T: DeserializeOwned + Validate + Send + Sync + 'static,
    {
        self.live_with(|value: &T| value.validate())
    }

    #[cfg(feature = "metrics")]
    pub(crate) fn metrics(&self) -> Option<&ResolverMetrics> {
        self.metrics.as_ref()
    }

    /// Names of the configured sources, lowest precedence first.
    pub fn source_names(&self) -> Vec<String> {
        self.loader.source_names()
    }
}

impl Clone for ConfigResolver {
    fn clone(&self) -> Self {
        Self {
            current: Arc::clone(&self.current),
            loader: Arc::clone(&self.loader),
            subscribers: self.subscribers.clone(),
            reload_lock: Arc::clone(&self.reload_lock),
            watching: Arc::clone(&self.watching),
            retry_backoff: self.retry_backoff,
            #[cfg(feature = "metrics")]
            metrics: self.metrics.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sources::MemorySource;
    use std::sync::atomic::AtomicUsize;

    async fn resolver(source: &MemorySource) -> ConfigResolver {
        ConfigResolver::builder()
            .with_source(source.clone())
            .build()
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_reload_publishes_and_notifies() {
        let source = MemorySource::new("remote").with_value("port", 80i64);
        let resolver = resolver(&source).await;

        let seen = Arc::new(AtomicUsize::new(0));
        let seen_clone = Arc::clone(&seen);
        let _handle = resolver.subscribe(move |snapshot| {
            seen_clone.store(snapshot.get::<usize>("port").unwrap(), Ordering::SeqCst);
        });

        source.set("port", 9090i64);
        let snapshot = resolver.reload().await.unwrap();
        assert_eq!(snapshot.get::<u16>("port").unwrap(), 9090);
        assert_eq!(seen.load(Ordering::SeqCst), 9090);
        assert!(Arc::ptr_eq(&snapshot, &resolver.snapshot()));
    }

    #[tokio::test]
    async fn test_failed_reload_keeps_snapshot() {
        let source = MemorySource::new("local").with_value("port", 80i64);
        let resolver = resolver(&source).await;
        let before = resolver.snapshot();

        source.fail_with("disk error");
        assert!(resolver.reload().await.is_err());
        assert!(Arc::ptr_eq(&before, &resolver.snapshot()));
    }

    #[tokio::test]
    async fn test_single_watch_per_resolver() {
        let source = MemorySource::new("remote").reloadable(true);
        let resolver = resolver(&source).await;

        let handle = resolver.watch(|_| {}).unwrap();
        assert!(matches!(
            resolver.clone().watch(|_| {}),
            Err(ConfigError::WatchError(_))
        ));
        handle.cancel();
    }

    #[tokio::test]
    async fn test_live_with_rejects_invalid_initial_value() {
        let source = MemorySource::new("local").with_value("port", 80i64);
        let resolver = resolver(&source).await;

        #[derive(serde::Deserialize)]
        struct Server {
            port: u16,
        }

        let result = resolver.live_with(|server: &Server| {
            if server.port < 1024 {
                return Err(ValidationError::invalid_field("port", "must be >= 1024"));
            }
            Ok(())
        });
        assert!(matches!(result, Err(ConfigError::ValidationError(_))));
    }
}
