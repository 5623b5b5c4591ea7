//! Background watch over reloadable sources.

use crate::core::{ConfigResolver, ResolvedSettings};
use crate::error::ConfigError;
use crate::sources::ConfigSource;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Owned cancellation capability for a resolver's background watch.
///
/// Cancelling is idempotent and never fails. A reload that is already running
/// when cancellation is observed completes and its callback is delivered; no
/// further reload is started afterwards. Dropping the handle cancels the watch.
pub struct WatchHandle {
    token: CancellationToken,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl WatchHandle {
    /// Stop future reloads.
    pub fn cancel(&self) {
        if !self.token.is_cancelled() {
            tracing::debug!("cancelling configuration watch");
            self.token.cancel();
        }
    }

    /// Whether [`cancel`](WatchHandle::cancel) has been called.
    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Wait until the watch task has exited.
    ///
    /// Only meaningful after [`cancel`](WatchHandle::cancel); returns
    /// immediately when called a second time.
    pub async fn stopped(&self) {
        let task = self.task.lock().take();
        if let Some(task) = task {
            if let Err(e) = task.await {
                tracing::warn!(error = %e, "configuration watch task ended abnormally");
            }
        }
    }
}

impl Drop for WatchHandle {
    fn drop(&mut self) {
        self.token.cancel();
    }
}

impl std::fmt::Debug for WatchHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WatchHandle")
            .field("cancelled", &self.token.is_cancelled())
            .finish()
    }
}

pub(crate) fn spawn<F>(
    resolver: ConfigResolver,
    sources: Vec<Arc<dyn ConfigSource>>,
    retry_backoff: Duration,
    on_change: F,
) -> WatchHandle
where
    F: Fn(Arc<ResolvedSettings>) + Send + Sync + 'static,
{
    let token = CancellationToken::new();
    let (tx, mut rx) = mpsc::channel::<String>(16);

    if sources.is_empty() {
        tracing::info!("no reloadable configuration sources, watch is idle");
    }
    for source in sources {
        tokio::spawn(listen(source, tx.clone(), token.child_token(), retry_backoff));
    }
    drop(tx);

    let loop_token = token.clone();
    let task = tokio::spawn(async move {
        loop {
            let changed = tokio::select! {
                biased;
                _ = loop_token.cancelled() => break,
                next = rx.recv() => match next {
                    Some(name) => name,
                    None => break,
                },
            };

            // Several sources may have fired together; one rebuild covers them all.
            while let Ok(other) = rx.try_recv() {
                tracing::trace!(source = %other, "coalescing change notification");
            }

            match resolver.reload().await {
                Ok(snapshot) => {
                    tracing::info!(source = %changed, keys = snapshot.len(), "configuration reloaded");
                    on_change(snapshot);
                }
                Err(e) => {
                    tracing::error!(source = %changed, error = %e, "reload failed, keeping previous configuration");
                }
            }
        }
        tracing::debug!("configuration watch stopped");
    });

    WatchHandle {
        token,
        task: Mutex::new(Some(task)),
    }
}

async fn listen(
    source: Arc<dyn ConfigSource>,
    tx: mpsc::Sender<String>,
    token: CancellationToken,
    retry_backoff: Duration,
) {
    let name = source.name();
    loop {
        let outcome = tokio::select! {
            biased;
            _ = token.cancelled() => return,
            outcome = source.wait_for_change() => outcome,
        };

        match outcome {
            Ok(()) => {
                if tx.send(name.clone()).await.is_err() {
                    return;
                }
            }
            Err(ConfigError::WatchNotSupported) => {
                tracing::warn!(source = %name, "source does not support watching");
                return;
            }
            Err(e) => {
                if source.is_optional() {
                    tracing::warn!(source = %name, error = %e, "watch failed, retrying");
                } else {
                    tracing::error!(source = %name, error = %e, "watch failed, retrying");
                }
                tokio::select! {
                    _ = token.cancelled() => return,
                    _ = tokio::time::sleep(retry_backoff) => {}
                }
            }
        }
    }
}
