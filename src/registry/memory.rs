//! In-process registry for tests and local runs.

use super::client::RegistryClient;
use super::model::{CheckId, HealthCheckSpec, RegistrationId, ServiceEntry};
use crate::error::RegistryError;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::sync::Arc;

#[derive(Default)]
struct State {
    services: BTreeMap<RegistrationId, ServiceEntry>,
    checks: BTreeMap<CheckId, (RegistrationId, HealthCheckSpec)>,
    calls: usize,
    unreachable: bool,
    reject_health_checks: bool,
    fail_removals: bool,
}

/// A registry kept in memory.
///
/// Clones share state, so a test can hand one clone to the coordinator and
/// inspect or sabotage the other.
#[derive(Clone, Default)]
pub struct InMemoryRegistry {
    state: Arc<Mutex<State>>,
}

impl InMemoryRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Currently registered services.
    pub fn services(&self) -> Vec<(RegistrationId, ServiceEntry)> {
        let state = self.state.lock();
        state
            .services
            .iter()
            .map(|(id, entry)| (id.clone(), entry.clone()))
            .collect()
    }

    /// Currently registered health checks with their owning registration.
    pub fn checks(&self) -> Vec<(CheckId, RegistrationId)> {
        let state = self.state.lock();
        state
            .checks
            .iter()
            .map(|(id, (owner, _))| (id.clone(), owner.clone()))
            .collect()
    }

    /// Total number of client calls received, successful or not.
    pub fn call_count(&self) -> usize {
        self.state.lock().calls
    }

    /// Make every call fail as if the registry were down.
    pub fn set_unreachable(&self, unreachable: bool) {
        self.state.lock().unreachable = unreachable;
    }

    /// Reject health-check registrations.
    pub fn reject_health_checks(&self, reject: bool) {
        self.state.lock().reject_health_checks = reject;
    }

    /// Make deregistration and check removal fail.
    pub fn fail_removals(&self, fail: bool) {
        self.state.lock().fail_removals = fail;
    }

    fn enter(&self) -> Result<parking_lot::MutexGuard<'_, State>, RegistryError> {
        let mut state = self.state.lock();
        state.calls += 1;
        if state.unreachable {
            return Err(RegistryError::Unreachable("in-memory registry is down".into()));
        }
        Ok(state)
    }
}

#[async_trait]
impl RegistryClient for InMemoryRegistry {
    async fn register(&self, entry: &ServiceEntry) -> Result<RegistrationId, RegistryError> {
        let mut state = self.enter()?;
        let id = RegistrationId::new(format!(
            "{}-{}",
            entry.name,
            entry.address.authority()
        ));
        if state.services.contains_key(&id) {
            return Err(RegistryError::Conflict(id.to_string()));
        }
        state.services.insert(id.clone(), entry.clone());
        Ok(id)
    }

    async fn deregister(&self, id: &RegistrationId) -> Result<(), RegistryError> {
        let mut state = self.enter()?;
        if state.fail_removals {
            return Err(RegistryError::Rejected {
                status: 500,
                message: format!("refusing to remove {}", id),
            });
        }
        state.services.remove(id);
        state.checks.retain(|_, (owner, _)| owner != id);
        Ok(())
    }

    async fn register_health_check(
        &self,
        owner: &RegistrationId,
        spec: &HealthCheckSpec,
    ) -> Result<CheckId, RegistryError> {
        let mut state = self.enter()?;
        if state.reject_health_checks {
            return Err(RegistryError::HealthCheckAttach(format!(
                "check {} rejected",
                spec.name
            )));
        }
        if !state.services.contains_key(owner) {
            return Err(RegistryError::HealthCheckAttach(format!(
                "unknown service {}",
                owner
            )));
        }
        let id = CheckId::new(format!("{}-{}", owner, spec.name));
        state.checks.insert(id.clone(), (owner.clone(), spec.clone()));
        Ok(id)
    }

    async fn remove_health_check(&self, id: &CheckId) -> Result<(), RegistryError> {
        let mut state = self.enter()?;
        if state.fail_removals {
            return Err(RegistryError::Rejected {
                status: 500,
                message: format!("refusing to remove {}", id),
            });
        }
        state.checks.remove(id);
        Ok(())
    }

    fn name(&self) -> String {
        "memory".to_string()
    }
}
