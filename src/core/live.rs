//! Typed settings kept in sync with the resolver.

use crate::core::ConfigResolver;
use crate::error::ValidationError;
use crate::notify::SubscriptionHandle;
use arc_swap::ArcSwap;
use serde::de::DeserializeOwned;
use std::sync::Arc;

/// A strongly typed view of the resolver's settings that follows reloads.
///
/// Every published snapshot is rebound onto `T`. If binding or validation
/// fails, the previous value is kept and the failure is logged. Reads are
/// lock-free.
pub struct LiveSettings<T> {
    current: Arc<ArcSwap<T>>,
    _subscription: Arc<SubscriptionHandle>,
}

impl<T> LiveSettings<T>
where
    T: DeserializeOwned + Send + Sync + 'static,
{
    pub(crate) fn attach<F>(resolver: &ConfigResolver, initial: T, validator: F) -> Self
    where
        F: Fn(&T) -> std::result::Result<(), ValidationError> + Send + Sync + 'static,
    {
        let current = Arc::new(ArcSwap::from_pointee(initial));

        #[cfg(feature = "metrics")]
        let metrics = resolver.metrics().cloned();

        let target = Arc::clone(&current);
        let subscription = resolver.subscribe(move |snapshot| {
            let rebound = snapshot
                .bind::<T>()
                .and_then(|value| validator(&value).map(|_| value).map_err(Into::into));
            match rebound {
                Ok(value) => target.store(Arc::new(value)),
                Err(e) => {
                    #[cfg(feature = "metrics")]
                    if let Some(metrics) = &metrics {
                        metrics.record_validation_failure();
                    }
                    tracing::warn!(
                        settings = std::any::type_name::<T>(),
                        error = %e,
                        "rejected reloaded settings, keeping previous value"
                    );
                }
            }
        });

        Self {
            current,
            _subscription: Arc::new(subscription),
        }
    }
}

impl<T> LiveSettings<T> {
    /// The current typed value.
    pub fn get(&self) -> Arc<T> {
        self.current.load_full()
    }
}

impl<T> Clone for LiveSettings<T> {
    fn clone(&self) -> Self {
        Self {
            current: Arc::clone(&self.current),
            _subscription: Arc::clone(&self._subscription),
        }
    }
}
