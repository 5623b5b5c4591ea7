//! Registry client trait.

use super::model::{CheckId, HealthCheckSpec, RegistrationId, ServiceEntry};
use crate::error::RegistryError;
use async_trait::async_trait;

/// Operations the lifecycle coordinator needs from a service registry.
///
/// Implementations are expected to be cheap to share behind an `Arc` and to
/// bound every call with their own timeout.
#[async_trait]
pub trait RegistryClient: Send + Sync {
    /// Publish a service entry, returning its registry identity.
    async fn register(&self, entry: &ServiceEntry) -> Result<RegistrationId, RegistryError>;

    /// Withdraw a previously published entry.
    async fn deregister(&self, id: &RegistrationId) -> Result<(), RegistryError>;

    /// Attach a health check to a live registration.
    async fn register_health_check(
        &self,
        owner: &RegistrationId,
        spec: &HealthCheckSpec,
    ) -> Result<CheckId, RegistryError>;

    /// Withdraw a health check.
    async fn remove_health_check(&self, id: &CheckId) -> Result<(), RegistryError>;

    /// Name of this registry for logging.
    fn name(&self) -> String;
}
