//! Service registry publication and the node's registration lifecycle.
//!
//! The [`RegistrationCoordinator`] drives a [`RegistryClient`] through
//! register, optional health-check attachment, and teardown. [`ConsulRegistry`]
//! talks to a Consul agent; [`InMemoryRegistry`] keeps everything in process.

mod address;
mod client;
mod consul;
mod lifecycle;
mod memory;
mod model;
mod settings;
mod signal;

pub use address::{AddressDiscovery, FixedAddress, LocalInterface, self_uri};
pub use client::RegistryClient;
pub use consul::ConsulRegistry;
pub use lifecycle::{LifecycleState, RegistrationCoordinator};
pub use memory::InMemoryRegistry;
pub use model::{
    CheckId, HealthCheckRegistration, HealthCheckSpec, RegistrationId, ServiceEntry,
    TenantRegistration,
};
pub use settings::{HealthCheckSettings, NodeSettings, RegistryConnectionSettings, ServiceSettings};
pub use signal::{ShutdownSignal, ShutdownSubscription};
