//! Registration lifecycle coordinator.

use super::client::RegistryClient;
use super::consul::ConsulRegistry;
use super::model::{HealthCheckRegistration, HealthCheckSpec, ServiceEntry, TenantRegistration};
use super::settings::RegistryConnectionSettings;
use crate::core::{ResolvedSettings, WatchHandle};
use crate::error::RegistryError;
use parking_lot::Mutex;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

/// Where the node stands in its registry lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    /// Nothing published.
    Unregistered,
    /// A registration call is in flight.
    Registering,
    /// The service entry is published.
    Registered,
    /// The service entry and its health check are published.
    HealthChecked,
    /// Teardown is in progress.
    Deregistering,
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Unregistered => "unregistered",
            Self::Registering => "registering",
            Self::Registered => "registered",
            Self::HealthChecked => "health-checked",
            Self::Deregistering => "deregistering",
        };
        f.write_str(name)
    }
}

/// Publishes the node into a service registry and withdraws it on shutdown.
///
/// Registration and health-check attachment are sequential; [`stop`] undoes
/// them in reverse order and then cancels the configuration watch it owns.
/// Operations are serialized, so a `stop` racing a `start` either sees the
/// finished registration and withdraws it, or makes the `start` fail.
///
/// [`stop`]: RegistrationCoordinator::stop
pub struct RegistrationCoordinator {
    client: Arc<dyn RegistryClient>,
    teardown_timeout: Duration,
    state: Mutex<LifecycleState>,
    registration: Mutex<Option<TenantRegistration>>,
    watch: Mutex<Option<WatchHandle>>,
    stopped: AtomicBool,
    ops: tokio::sync::Mutex<()>,
}

impl RegistrationCoordinator {
    /// Create a coordinator over an existing client.
    pub fn new(client: Arc<dyn RegistryClient>) -> Self {
        Self {
            client,
            teardown_timeout: Duration::from_secs(5),
            state: Mutex::new(LifecycleState::Unregistered),
            registration: Mutex::new(None),
            watch: Mutex::new(None),
            stopped: AtomicBool::new(false),
            ops: tokio::sync::Mutex::new(()),
        }
    }

    /// Bound for each individual removal during [`stop`](Self::stop).
    pub fn with_teardown_timeout(mut self, timeout: Duration) -> Self {
        self.teardown_timeout = timeout;
        self
    }

    /// Create a coordinator talking to the Consul agent named by the
    /// `registry` section of `settings`.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::Config`] if the section is missing or
    /// malformed.
    pub fn connect(settings: &ResolvedSettings) -> Result<Self, RegistryError> {
        let connection: RegistryConnectionSettings = settings.bind_section("registry")?;
        let client = ConsulRegistry::new(&connection)?;
        tracing::info!(registry = %client.name(), "registry client created");
        Ok(Self::new(Arc::new(client)).with_teardown_timeout(connection.timeout()))
    }

    /// Current lifecycle state.
    pub fn state(&self) -> LifecycleState {
        *self.state.lock()
    }

    /// The live registration, if any.
    pub fn registration(&self) -> Option<TenantRegistration> {
        self.registration.lock().clone()
    }

    /// Whether [`stop`](Self::stop) has been called.
    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::Acquire)
    }

    fn transition(&self, next: LifecycleState) {
        let mut state = self.state.lock();
        tracing::debug!(from = %*state, to = %next, "registration state changed");
        *state = next;
    }

    /// Publish `entry`.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::Registration`] if the registry is unreachable
    /// or rejects the entry, and [`RegistryError::InvalidState`] if the node
    /// is already registered or has been stopped.
    pub async fn start(&self, entry: ServiceEntry) -> Result<TenantRegistration, RegistryError> {
        let _op = self.ops.lock().await;

        if self.is_stopped() {
            return Err(RegistryError::InvalidState(
                "coordinator has been stopped".into(),
            ));
        }
        let current = self.state();
        if current != LifecycleState::Unregistered {
            return Err(RegistryError::InvalidState(format!(
                "cannot register while {}",
                current
            )));
        }

        self.transition(LifecycleState::Registering);
        let id = match self.client.register(&entry).await {
            Ok(id) => id,
            Err(e) => {
                self.transition(LifecycleState::Unregistered);
                return Err(match e {
                    RegistryError::Registration(_) => e,
                    other => RegistryError::Registration(other.to_string()),
                });
            }
        };

        tracing::info!(
            id = %id,
            service = %entry.name,
            version = %entry.version,
            address = %entry.address,
            "service registered"
        );
        let registration = TenantRegistration::new(id, entry);
        *self.registration.lock() = Some(registration.clone());
        self.transition(LifecycleState::Registered);
        Ok(registration)
    }

    /// Attach a health check to the live registration.
    ///
    /// A failure is logged and leaves the node registered without active
    /// probing.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::HealthCheckAttach`] if the registry refused
    /// the check, and [`RegistryError::InvalidState`] if nothing is registered
    /// or a check is already attached.
    pub async fn attach_health_check(
        &self,
        spec: HealthCheckSpec,
    ) -> Result<HealthCheckRegistration, RegistryError> {
        let _op = self.ops.lock().await;

        let owner = match self.registration.lock().as_ref() {
            Some(registration) if registration.health_check().is_some() => {
                return Err(RegistryError::InvalidState(
                    "a health check is already attached".into(),
                ));
            }
            Some(registration) => registration.id().clone(),
            None => {
                return Err(RegistryError::InvalidState(
                    "no registration to attach a health check to".into(),
                ));
            }
        };

        match self.client.register_health_check(&owner, &spec).await {
            Ok(id) => {
                tracing::info!(id = %id, target = %spec.target, "health check attached");
                let check = HealthCheckRegistration::new(id, owner, &spec);
                if let Some(registration) = self.registration.lock().as_mut() {
                    registration.attach(check.clone());
                }
                self.transition(LifecycleState::HealthChecked);
                Ok(check)
            }
            Err(e) => {
                tracing::warn!(
                    error = %e,
                    target = %spec.target,
                    "health check not attached, continuing without active probing"
                );
                Err(match e {
                    RegistryError::HealthCheckAttach(_) => e,
                    other => RegistryError::HealthCheckAttach(other.to_string()),
                })
            }
        }
    }

    /// Hand over the configuration watch so that [`stop`](Self::stop) cancels it.
    ///
    /// A watch handed over after `stop` is cancelled immediately.
    pub fn own_watch(&self, handle: WatchHandle) {
        if self.is_stopped() {
            handle.cancel();
            return;
        }
        if let Some(previous) = self.watch.lock().replace(handle) {
            previous.cancel();
        }
    }

    /// Withdraw the health check, then the service entry, then cancel the watch.
    ///
    /// Each removal is bounded by the teardown timeout; failures are logged and
    /// do not prevent the remaining steps. Calling `stop` again does nothing.
    pub async fn stop(&self) {
        if self.stopped.swap(true, Ordering::AcqRel) {
            tracing::debug!("registration already stopped");
            return;
        }
        let _op = self.ops.lock().await;

        let registration = self.registration.lock().take();
        if let Some(mut registration) = registration {
            self.transition(LifecycleState::Deregistering);

            if let Some(check) = registration.take_health_check() {
                self.teardown(
                    format!("health check {}", check.id()),
                    self.client.remove_health_check(check.id()),
                )
                .await;
            }
            self.teardown(
                format!("service {}", registration.id()),
                self.client.deregister(registration.id()),
            )
            .await;

            self.transition(LifecycleState::Unregistered);
        }

        let watch = self.watch.lock().take();
        if let Some(watch) = watch {
            watch.cancel();
        }
        tracing::info!("registration stopped");
    }

    async fn teardown<F>(&self, what: String, removal: F)
    where
        F: Future<Output = Result<(), RegistryError>>,
    {
        let outcome = match tokio::time::timeout(self.teardown_timeout, removal).await {
            Ok(Ok(())) => {
                tracing::info!(entry = %what, "removed from registry");
                return;
            }
            Ok(Err(e)) => RegistryError::Teardown(format!("{}: {}", what, e)),
            Err(_) => RegistryError::Teardown(format!(
                "{}: no answer within {:?}",
                what, self.teardown_timeout
            )),
        };
        tracing::error!(error = %outcome, "registry teardown step failed");
    }
}

impl fmt::Debug for RegistrationCoordinator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegistrationCoordinator")
            .field("registry", &self.client.name())
            .field("state", &self.state())
            .finish()
    }
}
