//! Registry data model.

use reqwest::Url;
use std::fmt;
use std::time::Duration;

/// Registry-assigned identity of a published service entry.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RegistrationId(String);

impl RegistrationId {
    /// Wrap an identifier returned by the registry.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// The identifier as sent over the wire.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RegistrationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Registry-assigned identity of a health-check entry.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CheckId(String);

impl CheckId {
    /// Wrap an identifier returned by the registry.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// The identifier as sent over the wire.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CheckId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// What the node advertises about itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceEntry {
    /// Logical service name other nodes look up.
    pub name: String,
    /// Version tag of the running build.
    pub version: String,
    /// Base URI the node answers on.
    pub address: Url,
    /// Free-form tags, e.g. router prefixes.
    pub tags: Vec<String>,
}

impl ServiceEntry {
    /// Create an entry without tags.
    pub fn new(name: impl Into<String>, version: impl Into<String>, address: Url) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
            address,
            tags: Vec::new(),
        }
    }

    /// Add one tag.
    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.push(tag.into());
        self
    }
}

/// A probe the registry should run against the node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HealthCheckSpec {
    /// Check name, unique per registration.
    pub name: String,
    /// URI the registry probes.
    pub target: Url,
    /// Time between probes.
    pub interval: Duration,
}

/// A health check attached to a live registration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HealthCheckRegistration {
    id: CheckId,
    owner: RegistrationId,
    target: Url,
    interval: Duration,
}

impl HealthCheckRegistration {
    pub(crate) fn new(id: CheckId, owner: RegistrationId, spec: &HealthCheckSpec) -> Self {
        Self {
            id,
            owner,
            target: spec.target.clone(),
            interval: spec.interval,
        }
    }

    /// Registry identity of the check.
    pub fn id(&self) -> &CheckId {
        &self.id
    }

    /// The registration this check belongs to.
    pub fn owner(&self) -> &RegistrationId {
        &self.owner
    }

    /// URI being probed.
    pub fn target(&self) -> &Url {
        &self.target
    }

    /// Time between probes.
    pub fn interval(&self) -> Duration {
        self.interval
    }
}

/// The node's published presence in the registry.
///
/// Owns its optional health check, so the check can only be removed through
/// the registration and is always withdrawn first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TenantRegistration {
    id: RegistrationId,
    entry: ServiceEntry,
    health_check: Option<HealthCheckRegistration>,
}

impl TenantRegistration {
    pub(crate) fn new(id: RegistrationId, entry: ServiceEntry) -> Self {
        Self {
            id,
            entry,
            health_check: None,
        }
    }

    /// Registry identity of the entry.
    pub fn id(&self) -> &RegistrationId {
        &self.id
    }

    /// What was published.
    pub fn entry(&self) -> &ServiceEntry {
        &self.entry
    }

    /// The attached health check, if any.
    pub fn health_check(&self) -> Option<&HealthCheckRegistration> {
        self.health_check.as_ref()
    }

    pub(crate) fn attach(&mut self, check: HealthCheckRegistration) {
        self.health_check = Some(check);
    }

    pub(crate) fn take_health_check(&mut self) -> Option<HealthCheckRegistration> {
        self.health_check.take()
    }
}
