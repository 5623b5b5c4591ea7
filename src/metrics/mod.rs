//! OpenTelemetry metrics for configuration reloads.
//!
//! Tracks reload attempts, successes, failures and durations, the age of the
//! published snapshot, subscriber counts and rejected typed rebinds.
//!
//! ```rust,no_run
//! use node_bootstrap::prelude::*;
//! use opentelemetry::global;
//!
//! # async fn example() -> Result<()> {
//! let resolver = ConfigResolver::builder()
//!     .with_optional_file("appsettings.json")
//!     .with_metrics(global::meter("node-bootstrap"))
//!     .build()
//!     .await?;
//! # Ok(())
//! # }
//! ```

mod resolver_metrics;

pub use resolver_metrics::ResolverMetrics;
