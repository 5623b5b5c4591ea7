//! Node startup and shutdown sequencing.

use crate::core::{ConfigResolver, ResolvedSettings};
use crate::error::{BootstrapError, RegistryError};
use crate::registry::{
    AddressDiscovery, HealthCheckSpec, LocalInterface, RegistrationCoordinator, RegistryClient,
    ServiceEntry, ServiceSettings, ShutdownSignal, TenantRegistration, self_uri,
};
use std::sync::Arc;
use std::time::Duration;

#[cfg(feature = "validation")]
use crate::core::Validate;
#[cfg(feature = "validation")]
use crate::registry::NodeSettings;

/// Brings a node from resolved configuration to a discoverable, running state.
///
/// The sequence is: read the `service` settings, discover the reachable
/// address, start the configuration watch, register, and optionally attach a
/// health check. Any failure before registration completes aborts startup and
/// leaves nothing behind in the registry.
///
/// # Examples
///
/// ```rust,no_run
/// use node_bootstrap::prelude::*;
///
/// # async fn example() -> std::result::Result<(), Box<dyn std::error::Error>> {
/// let resolver = ConfigResolver::builder()
///     .with_file("appsettings.json")
///     .with_env_overrides("NODE", "__")
///     .build()
///     .await?;
///
/// let node = NodeBootstrap::new(resolver).start().await?;
/// let shutdown = ShutdownSignal::new();
/// shutdown.fire_on_ctrl_c();
/// node.run_until(&shutdown).await?;
/// # Ok(())
/// # }
/// ```
pub struct NodeBootstrap {
    resolver: ConfigResolver,
    discovery: Box<dyn AddressDiscovery>,
    client: Option<Arc<dyn RegistryClient>>,
    teardown_timeout: Option<Duration>,
}

impl NodeBootstrap {
    /// Bootstrap against the Consul agent configured in the `registry` section,
    /// advertising the default-route interface address.
    pub fn new(resolver: ConfigResolver) -> Self {
        Self {
            resolver,
            discovery: Box::new(LocalInterface),
            client: None,
            teardown_timeout: None,
        }
    }

    /// Use a different address discovery strategy.
    pub fn with_address_discovery<D: AddressDiscovery + 'static>(mut self, discovery: D) -> Self {
        self.discovery = Box::new(discovery);
        self
    }

    /// Use this registry client instead of connecting from configuration.
    /// The `registry` section is then not required.
    pub fn with_registry_client(mut self, client: Arc<dyn RegistryClient>) -> Self {
        self.client = Some(client);
        self
    }

    /// Override the per-step teardown bound.
    pub fn with_teardown_timeout(mut self, timeout: Duration) -> Self {
        self.teardown_timeout = Some(timeout);
        self
    }

    fn coordinator(
        &self,
        snapshot: &ResolvedSettings,
    ) -> Result<RegistrationCoordinator, BootstrapError> {
        let coordinator = match &self.client {
            Some(client) => RegistrationCoordinator::new(Arc::clone(client)),
            None => {
                #[cfg(feature = "validation")]
                {
                    let node: NodeSettings = snapshot.bind()?;
                    node.validate().map_err(crate::error::ConfigError::from)?;
                }
                RegistrationCoordinator::connect(snapshot)?
            }
        };
        Ok(match self.teardown_timeout {
            Some(timeout) => coordinator.with_teardown_timeout(timeout),
            None => coordinator,
        })
    }

    /// Run the startup sequence.
    ///
    /// # Errors
    ///
    /// Returns [`BootstrapError::Config`] if the settings do not bind or the
    /// resolver is already watched, and [`BootstrapError::Registry`] if no
    /// address is found or registration fails. A health-check failure is not
    /// an error.
    pub async fn start(self) -> Result<RunningNode, BootstrapError> {
        let snapshot = self.resolver.snapshot();
        let service: ServiceSettings = snapshot.bind_section("service")?;
        let coordinator = Arc::new(self.coordinator(&snapshot)?);

        let ip = self.discovery.discover()?;
        let address = self_uri(ip, &service.scheme, service.port)?;
        tracing::info!(address = %address, "resolved node address");

        let watch = self.resolver.watch(|snapshot| {
            tracing::info!(
                keys = snapshot.len(),
                sources = ?snapshot.contributors(),
                "configuration reloaded"
            );
        })?;
        coordinator.own_watch(watch);

        let mut entry = ServiceEntry::new(&service.name, &service.version, address.clone());
        entry.tags = service.tags.clone();

        if let Err(e) = coordinator.start(entry).await {
            tracing::error!(error = %e, "registration failed, aborting startup");
            coordinator.stop().await;
            return Err(e.into());
        }

        if service.health_check.enabled {
            match address.join(&service.health_check.path) {
                Ok(target) => {
                    let spec = HealthCheckSpec {
                        name: format!("{}-health", service.name),
                        target,
                        interval: Duration::from_secs(service.health_check.interval_secs),
                    };
                    match coordinator.attach_health_check(spec).await {
                        Ok(check) => {
                            tracing::debug!(check = %check.id(), "health check in place")
                        }
                        Err(e) => tracing::warn!(
                            error = %e,
                            "node registered without a health check"
                        ),
                    }
                }
                Err(e) => tracing::warn!(
                    error = %e,
                    path = %service.health_check.path,
                    "invalid health check path, continuing without active probing"
                ),
            }
        }

        Ok(RunningNode {
            resolver: self.resolver,
            coordinator,
        })
    }
}

/// A registered node. Dropping it does not deregister; call
/// [`shutdown`](RunningNode::shutdown) or [`run_until`](RunningNode::run_until).
pub struct RunningNode {
    resolver: ConfigResolver,
    coordinator: Arc<RegistrationCoordinator>,
}

impl RunningNode {
    /// The configuration resolver, still watched.
    pub fn resolver(&self) -> &ConfigResolver {
        &self.resolver
    }

    /// The live registration, if still published.
    pub fn registration(&self) -> Option<TenantRegistration> {
        self.coordinator.registration()
    }

    /// The lifecycle coordinator.
    pub fn coordinator(&self) -> &Arc<RegistrationCoordinator> {
        &self.coordinator
    }

    /// Wait for `signal`, then shut down.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::InvalidState`] if the signal already has a
    /// subscriber.
    pub async fn run_until(&self, signal: &ShutdownSignal) -> Result<(), RegistryError> {
        let subscription = signal.subscribe()?;
        subscription.recv().await;
        tracing::info!("shutdown signal received");
        self.shutdown().await;
        Ok(())
    }

    /// Withdraw from the registry and stop the configuration watch. Idempotent.
    pub async fn shutdown(&self) {
        self.coordinator.stop().await;
    }
}
