//! Resolver metrics tracking using OpenTelemetry.

use opentelemetry::metrics::{Counter, Gauge, Histogram, Meter};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Metrics collector for configuration reloads.
#[derive(Clone)]
pub struct ResolverMetrics {
    reload_attempts: Counter<u64>,
    reload_success: Counter<u64>,
    reload_failures: Counter<u64>,
    reload_duration: Histogram<f64>,
    snapshot_age_seconds: Gauge<i64>,
    active_subscribers: Gauge<i64>,
    validation_failures: Counter<u64>,
    last_update: Arc<Mutex<Instant>>,
}

impl ResolverMetrics {
    /// Create a new metrics collector with the provided meter.
    pub fn new(meter: Meter) -> Self {
        Self {
            reload_attempts: meter
                .u64_counter("node_bootstrap.config.reload.attempts")
                .with_description("Total number of reload attempts")
                .build(),
            reload_success: meter
                .u64_counter("node_bootstrap.config.reload.success")
                .with_description("Number of successful reloads")
                .build(),
            reload_failures: meter
                .u64_counter("node_bootstrap.config.reload.failures")
                .with_description("Number of reloads that kept the previous snapshot")
                .build(),
            reload_duration: meter
                .f64_histogram("node_bootstrap.config.reload.duration")
                .with_description("Duration of reload operations in seconds")
                .with_unit("s")
                .build(),
            snapshot_age_seconds: meter
                .i64_gauge("node_bootstrap.config.age")
                .with_description("Time since the last published snapshot in seconds")
                .with_unit("s")
                .build(),
            active_subscribers: meter
                .i64_gauge("node_bootstrap.config.subscribers.active")
                .with_description("Number of active snapshot subscribers")
                .build(),
            validation_failures: meter
                .u64_counter("node_bootstrap.config.validation.failures")
                .with_description("Number of reloaded typed settings rejected by validation")
                .build(),
            last_update: Arc::new(Mutex::new(Instant::now())),
        }
    }

    /// Count a reload attempt and return its start time.
    pub fn start_reload(&self) -> Instant {
        self.reload_attempts.add(1, &[]);
        Instant::now()
    }

    /// Record a reload that published a new snapshot.
    ///
    /// The age gauge reports how long the replaced snapshot was in effect.
    pub fn record_reload_success(&self, start: Instant) {
        self.reload_success.add(1, &[]);
        self.reload_duration.record(start.elapsed().as_secs_f64(), &[]);
        self.update_snapshot_age();
        self.record_update();
    }

    /// Record a reload that failed. The current snapshot keeps ageing.
    pub fn record_reload_failure(&self, start: Instant) {
        self.reload_failures.add(1, &[]);
        self.reload_duration.record(start.elapsed().as_secs_f64(), &[]);
        self.update_snapshot_age();
    }

    /// Record a rejected typed rebind.
    pub fn record_validation_failure(&self) {
        self.validation_failures.add(1, &[]);
    }

    /// Update the number of active subscribers.
    pub fn update_subscriber_count(&self, count: i64) {
        self.active_subscribers.record(count, &[]);
    }

    /// Report how long the current snapshot has been in effect.
    pub fn update_snapshot_age(&self) {
        self.snapshot_age_seconds.record(self.snapshot_age().as_secs() as i64, &[]);
    }

    fn snapshot_age(&self) -> Duration {
        self.last_update.lock().elapsed()
    }

    /// Mark a snapshot as freshly published.
    pub fn record_update(&self) {
        *self.last_update.lock() = Instant::now();
    }
}
