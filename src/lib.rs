//! # node-bootstrap
//!
//! Startup plumbing for a service node that must be discoverable.
//!
//! ## Overview
//!
//! `node-bootstrap` covers two concerns:
//! - A layered configuration resolver: local files, a remote Consul KV
//!   document and environment variables are merged by precedence into one
//!   immutable snapshot, published lock-free through `arc-swap` and rebuilt
//!   in the background whenever a reloadable source changes.
//! - A registration lifecycle: the node discovers its reachable address,
//!   publishes itself into a service registry (optionally with a health
//!   check), and withdraws everything in reverse order on shutdown.
//!
//! Optional sources may be absent or fail at any time without affecting
//! startup or reload; required sources fail the build.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use node_bootstrap::prelude::*;
//! use node_bootstrap::sources::ConsulKvSource;
//! use serde::Deserialize;
//!
//! #[derive(Debug, Deserialize)]
//! struct Limits {
//!     max_connections: u32,
//! }
//!
//! # async fn example() -> std::result::Result<(), Box<dyn std::error::Error>> {
//! let resolver = ConfigResolver::builder()
//!     .with_optional_file("appsettings.json")
//!     .with_source(
//!         ConsulKvSource::builder()
//!             .with_address("http://127.0.0.1:8500")
//!             .with_key("sampleservicesettings.json")
//!             .build()?,
//!     )
//!     .with_env_overrides("NODE", "__")
//!     .build()
//!     .await?;
//!
//! // Lock-free reads of the merged snapshot
//! let limits: Limits = resolver.snapshot().bind_section("limits")?;
//! println!("max connections: {}", limits.max_connections);
//!
//! // Register, serve, withdraw on Ctrl-C
//! let node = NodeBootstrap::new(resolver).start().await?;
//! let shutdown = ShutdownSignal::new();
//! shutdown.fire_on_ctrl_c();
//! node.run_until(&shutdown).await?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Feature Flags
//!
//! - `file-watch` (default): reload local files on change via `notify`
//! - `validation` (default): [`Validate`](core::Validate) for typed settings
//! - `metrics`: OpenTelemetry reload metrics

#![warn(missing_docs, rust_2024_compatibility)]
#![deny(unsafe_code)]

pub mod bootstrap;
pub mod core;
pub mod error;
pub mod notify;
pub mod registry;
pub mod sources;

#[cfg(feature = "metrics")]
pub mod metrics;

/// Convenient re-exports for common usage patterns.
pub mod prelude {
    pub use crate::bootstrap::{NodeBootstrap, RunningNode};
    pub use crate::core::{ConfigResolver, ConfigResolverBuilder, ResolvedSettings, WatchHandle};
    pub use crate::error::{BootstrapError, ConfigError, RegistryError, Result, ValidationError};
    pub use crate::registry::{
        LifecycleState, RegistrationCoordinator, RegistryClient, ServiceEntry, ShutdownSignal,
    };

    #[cfg(feature = "validation")]
    pub use crate::core::Validate;
}
