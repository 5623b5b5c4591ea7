//! Configuration change notification.
//!
//! Subscribers are told about every newly published snapshot; the file watcher
//! turns edits of reloadable files into change signals.

pub mod subscriber;
#[cfg(feature = "file-watch")]
pub mod watcher;

pub use subscriber::{SubscriberRegistry, SubscriptionHandle};
#[cfg(feature = "file-watch")]
pub use watcher::ConfigWatcher;
