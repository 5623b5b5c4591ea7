//! Single-fire shutdown signal.

use crate::error::RegistryError;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio_util::sync::CancellationToken;

struct Inner {
    token: CancellationToken,
    fired: AtomicBool,
    subscribed: AtomicBool,
}

/// A signal that fires once and has at most one subscriber.
///
/// Clones refer to the same signal; any clone may fire it.
#[derive(Clone)]
pub struct ShutdownSignal {
    inner: Arc<Inner>,
}

impl ShutdownSignal {
    /// A signal that has not fired yet.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Inner {
                token: CancellationToken::new(),
                fired: AtomicBool::new(false),
                subscribed: AtomicBool::new(false),
            }),
        }
    }

    /// Fire the signal. Returns `false` if it had already fired.
    pub fn fire(&self) -> bool {
        if self.inner.fired.swap(true, Ordering::AcqRel) {
            return false;
        }
        self.inner.token.cancel();
        true
    }

    /// Whether the signal has fired.
    pub fn is_fired(&self) -> bool {
        self.inner.token.is_cancelled()
    }

    /// Take the only subscription.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::InvalidState`] if someone already subscribed.
    pub fn subscribe(&self) -> Result<ShutdownSubscription, RegistryError> {
        if self.inner.subscribed.swap(true, Ordering::AcqRel) {
            return Err(RegistryError::InvalidState(
                "shutdown signal already has a subscriber".into(),
            ));
        }
        Ok(ShutdownSubscription {
            token: self.inner.token.clone(),
        })
    }

    /// Fire on Ctrl-C, or SIGTERM on unix.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn fire_on_ctrl_c(&self) {
        let signal = self.clone();
        tokio::spawn(async move {
            wait_for_termination().await;
            tracing::info!("termination requested");
            signal.fire();
        });
    }
}

impl Default for ShutdownSignal {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(unix)]
async fn wait_for_termination() {
    use tokio::signal::unix::{SignalKind, signal};

    match signal(SignalKind::terminate()) {
        Ok(mut terminate) => {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {}
                _ = terminate.recv() => {}
            }
        }
        Err(e) => {
            tracing::warn!(error = %e, "SIGTERM handler unavailable, waiting for Ctrl-C only");
            let _ = tokio::signal::ctrl_c().await;
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_termination() {
    let _ = tokio::signal::ctrl_c().await;
}

/// The receiving side of a [`ShutdownSignal`].
pub struct ShutdownSubscription {
    token: CancellationToken,
}

impl ShutdownSubscription {
    /// Wait until the signal fires. Returns immediately if it already has.
    pub async fn recv(self) {
        self.token.cancelled().await;
    }
}
