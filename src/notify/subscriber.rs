//! Subscriber-based notifications for configuration changes.

use crate::core::ResolvedSettings;
use parking_lot::Mutex;
use std::sync::{Arc, Weak};

type Callback = Arc<dyn Fn(&Arc<ResolvedSettings>) + Send + Sync>;
type CountObserver = Arc<dyn Fn(usize) + Send + Sync>;

/// Handle for a subscription that can be dropped to unsubscribe.
///
/// When the handle is dropped, the subscription is removed immediately.
pub struct SubscriptionHandle {
    id: usize,
    registry: Weak<Mutex<SubscriberRegistryInner>>,
}

impl SubscriptionHandle {
    /// Identifier of this subscription within its registry.
    pub fn id(&self) -> usize {
        self.id
    }
}

impl Drop for SubscriptionHandle {
    fn drop(&mut self) {
        if let Some(registry) = self.registry.upgrade() {
            let (count, observer) = {
                let mut inner = registry.lock();
                inner.subscribers.retain(|(sub_id, _)| *sub_id != self.id);
                (inner.subscribers.len(), inner.count_observer.clone())
            };
            if let Some(observer) = observer {
                observer(count);
            }
        }
    }
}

/// Internal subscriber registry state.
struct SubscriberRegistryInner {
    subscribers: Vec<(usize, Callback)>,
    next_id: usize,
    count_observer: Option<CountObserver>,
}

/// Registry for managing configuration change subscribers.
///
/// Callbacks receive every newly published snapshot. They are invoked outside
/// the registry lock, so a callback may itself subscribe or drop handles.
///
/// # Examples
///
/// ```rust
/// use node_bootstrap::core::ResolvedSettings;
/// use node_bootstrap::notify::SubscriberRegistry;
/// use std::sync::Arc;
///
/// let registry = SubscriberRegistry::new();
/// let handle = registry.subscribe(|snapshot| {
///     println!("{} keys", snapshot.len());
/// });
///
/// registry.notify_all(&Arc::new(ResolvedSettings::empty()));
/// drop(handle);
/// assert_eq!(registry.subscriber_count(), 0);
/// ```
pub struct SubscriberRegistry {
    inner: Arc<Mutex<SubscriberRegistryInner>>,
}

impl SubscriberRegistry {
    /// Create a new subscriber registry.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(SubscriberRegistryInner {
                subscribers: Vec::new(),
                next_id: 0,
                count_observer: None,
            })),
        }
    }

    /// Subscribe to configuration changes.
    ///
    /// Returns a handle that can be dropped to unsubscribe.
    pub fn subscribe<F>(&self, callback: F) -> SubscriptionHandle
    where
        F: Fn(&Arc<ResolvedSettings>) + Send + Sync + 'static,
    {
        let (id, count, observer) = {
            let mut inner = self.inner.lock();
            let id = inner.next_id;
            inner.next_id += 1;
            inner.subscribers.push((id, Arc::new(callback)));
            (id, inner.subscribers.len(), inner.count_observer.clone())
        };
        if let Some(observer) = observer {
            observer(count);
        }

        SubscriptionHandle {
            id,
            registry: Arc::downgrade(&self.inner),
        }
    }

    /// Notify all subscribers of a new snapshot, in subscription order.
    pub fn notify_all(&self, snapshot: &Arc<ResolvedSettings>) {
        let callbacks: Vec<Callback> = self
            .inner
            .lock()
            .subscribers
            .iter()
            .map(|(_, callback)| Arc::clone(callback))
            .collect();

        for callback in callbacks {
            callback(snapshot);
        }
    }

    /// Report the subscriber count after every subscribe and unsubscribe.
    pub(crate) fn observe_count<F>(&self, observer: F)
    where
        F: Fn(usize) + Send + Sync + 'static,
    {
        let observer: CountObserver = Arc::new(observer);
        let count = {
            let mut inner = self.inner.lock();
            inner.count_observer = Some(Arc::clone(&observer));
            inner.subscribers.len()
        };
        observer(count);
    }

    /// Get the number of active subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.inner.lock().subscribers.len()
    }
}

impl Default for SubscriberRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl Clone for SubscriberRegistry {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn snapshot() -> Arc<ResolvedSettings> {
        Arc::new(ResolvedSettings::empty())
    }

    #[test]
    fn test_subscribe_and_notify() {
        let registry = SubscriberRegistry::new();
        let counter = Arc::new(AtomicUsize::new(0));

        let counter_clone = Arc::clone(&counter);
        let _handle = registry.subscribe(move |_| {
            counter_clone.fetch_add(1, Ordering::SeqCst);
        });

        registry.notify_all(&snapshot());
        registry.notify_all(&snapshot());
        assert_eq!(counter.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_unsubscribe_on_drop() {
        let registry = SubscriberRegistry::new();
        let counter = Arc::new(AtomicUsize::new(0));

        let counter_clone = Arc::clone(&counter);
        let handle = registry.subscribe(move |_| {
            counter_clone.fetch_add(1, Ordering::SeqCst);
        });
        let _other = registry.subscribe(|_| {});
        assert_eq!(registry.subscriber_count(), 2);

        registry.notify_all(&snapshot());
        drop(handle);
        registry.notify_all(&snapshot());

        assert_eq!(counter.load(Ordering::SeqCst), 1);
        assert_eq!(registry.subscriber_count(), 1);
    }

    #[test]
    fn test_callback_may_subscribe() {
        let registry = SubscriberRegistry::new();
        let nested = Arc::new(Mutex::new(Vec::new()));

        let registry_clone = registry.clone();
        let nested_clone = Arc::clone(&nested);
        let _handle = registry.subscribe(move |_| {
            nested_clone.lock().push(registry_clone.subscribe(|_| {}));
        });

        registry.notify_all(&snapshot());
        assert_eq!(registry.subscriber_count(), 2);
    }

    #[test]
    fn test_count_observer_follows_subscriptions() {
        let registry = SubscriberRegistry::new();
        let _early = registry.subscribe(|_| {});

        let counts = Arc::new(Mutex::new(Vec::new()));
        let counts_clone = Arc::clone(&counts);
        registry.observe_count(move |count| counts_clone.lock().push(count));

        let first = registry.subscribe(|_| {});
        let second = registry.subscribe(|_| {});
        drop(first);
        drop(second);

        assert_eq!(*counts.lock(), vec![1, 2, 3, 2, 1]);
    }

    #[test]
    fn test_handle_outlives_registry() {
        let registry = SubscriberRegistry::new();
        let handle = registry.subscribe(|_| {});
        drop(registry);
        drop(handle);
    }
}
