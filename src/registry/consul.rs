//! Consul agent registry client.

use super::client::RegistryClient;
use super::model::{CheckId, HealthCheckSpec, RegistrationId, ServiceEntry};
use super::settings::RegistryConnectionSettings;
use crate::error::RegistryError;
use async_trait::async_trait;
use reqwest::{Client, Url};
use serde::Serialize;
use std::collections::HashMap;

const TOKEN_HEADER: &str = "X-Consul-Token";

#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
struct AgentServiceRegistration<'a> {
    #[serde(rename = "ID")]
    id: &'a str,
    name: &'a str,
    tags: &'a [String],
    address: &'a str,
    port: u16,
    meta: HashMap<&'a str, &'a str>,
}

#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
struct AgentCheckRegistration<'a> {
    #[serde(rename = "ID")]
    id: &'a str,
    name: &'a str,
    #[serde(rename = "ServiceID")]
    service_id: &'a str,
    #[serde(rename = "HTTP")]
    http: &'a str,
    interval: String,
}

/// Registers the node with the local Consul agent over its HTTP API.
///
/// Service identities are `{name}-{host}-{port}`, so one node can host several
/// services and a restarted node replaces its own stale entry.
pub struct ConsulRegistry {
    base: Url,
    client: Client,
    token: Option<String>,
}

impl ConsulRegistry {
    /// Create a client from resolved registry settings.
    ///
    /// # Errors
    ///
    /// Returns an error if the settings do not form a valid URL or the HTTP
    /// client cannot be built.
    pub fn new(settings: &RegistryConnectionSettings) -> Result<Self, RegistryError> {
        let client = Client::builder()
            .timeout(settings.timeout())
            .build()
            .map_err(|e| {
                RegistryError::Unreachable(format!("failed to build HTTP client: {}", e))
            })?;

        Ok(Self {
            base: settings.base_url()?,
            client,
            token: settings.token.clone(),
        })
    }

    fn endpoint(&self, path: &str) -> Result<Url, RegistryError> {
        self.base
            .join(path)
            .map_err(|e| RegistryError::Unreachable(format!("invalid endpoint '{}': {}", path, e)))
    }

    /// `path` followed by `id` as one percent-encoded segment.
    fn endpoint_for(&self, path: &str, id: &str) -> Result<Url, RegistryError> {
        let mut url = self.endpoint(path)?;
        url.path_segments_mut()
            .map_err(|_| {
                RegistryError::Unreachable(format!("{} cannot carry a path", self.base))
            })?
            .pop_if_empty()
            .push(id);
        Ok(url)
    }

    async fn put<B: Serialize + ?Sized>(
        &self,
        url: Url,
        body: Option<&B>,
    ) -> Result<(), RegistryError> {
        let mut request = self.client.put(url);
        if let Some(token) = &self.token {
            request = request.header(TOKEN_HEADER, token);
        }
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request
            .send()
            .await
            .map_err(|e| RegistryError::Unreachable(format!("{}: {}", self.base, e)))?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }
        let message = response.text().await.unwrap_or_default();
        Err(RegistryError::Rejected {
            status: status.as_u16(),
            message: message.trim().to_string(),
        })
    }
}

fn service_id(entry: &ServiceEntry) -> String {
    let host = entry.address.host_str().unwrap_or("unknown");
    let port = entry.address.port_or_known_default().unwrap_or(0);
    format!("{}-{}-{}", entry.name, host.trim_matches(['[', ']']), port)
}

#[async_trait]
impl RegistryClient for ConsulRegistry {
    async fn register(&self, entry: &ServiceEntry) -> Result<RegistrationId, RegistryError> {
        let id = service_id(entry);
        let host = entry
            .address
            .host_str()
            .ok_or_else(|| RegistryError::Registration(format!("{} has no host", entry.address)))?
            .trim_matches(['[', ']']);
        let port = entry
            .address
            .port_or_known_default()
            .ok_or_else(|| RegistryError::Registration(format!("{} has no port", entry.address)))?;

        let body = AgentServiceRegistration {
            id: &id,
            name: &entry.name,
            tags: &entry.tags,
            address: host,
            port,
            meta: HashMap::from([("version", entry.version.as_str())]),
        };
        self.put(self.endpoint("v1/agent/service/register")?, Some(&body))
            .await
            .map_err(|e| RegistryError::Registration(e.to_string()))?;

        Ok(RegistrationId::new(id))
    }

    async fn deregister(&self, id: &RegistrationId) -> Result<(), RegistryError> {
        let url = self.endpoint_for("v1/agent/service/deregister/", id.as_str())?;
        self.put::<()>(url, None).await
    }

    async fn register_health_check(
        &self,
        owner: &RegistrationId,
        spec: &HealthCheckSpec,
    ) -> Result<CheckId, RegistryError> {
        let id = format!("{}-{}", owner, spec.name);
        let body = AgentCheckRegistration {
            id: &id,
            name: &spec.name,
            service_id: owner.as_str(),
            http: spec.target.as_str(),
            interval: format!("{}s", spec.interval.as_secs().max(1)),
        };
        self.put(self.endpoint("v1/agent/check/register")?, Some(&body))
            .await
            .map_err(|e| RegistryError::HealthCheckAttach(e.to_string()))?;

        Ok(CheckId::new(id))
    }

    async fn remove_health_check(&self, id: &CheckId) -> Result<(), RegistryError> {
        let url = self.endpoint_for("v1/agent/check/deregister/", id.as_str())?;
        self.put::<()>(url, None).await
    }

    fn name(&self) -> String {
        format!("consul:{}", self.base.as_str().trim_end_matches('/'))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings() -> RegistryConnectionSettings {
        RegistryConnectionSettings {
            scheme: "http".into(),
            host: "127.0.0.1".into(),
            port: 8500,
            token: Some("secret".into()),
            timeout_ms: 1_000,
        }
    }

    #[test]
    fn test_service_id_from_address() {
        let entry = ServiceEntry::new(
            "values",
            "1.0.0",
            Url::parse("http://10.0.0.5:5000/").unwrap(),
        );
        assert_eq!(service_id(&entry), "values-10.0.0.5-5000");

        let entry = ServiceEntry::new(
            "values",
            "1.0.0",
            Url::parse("http://[fe80::1]:80/").unwrap(),
        );
        assert_eq!(service_id(&entry), "values-fe80::1-80");
    }

    #[test]
    fn test_endpoints_join_base() {
        let registry = ConsulRegistry::new(&settings()).unwrap();
        let endpoint = registry
            .endpoint("v1/agent/service/deregister/values-1")
            .unwrap();
        assert_eq!(
            endpoint.as_str(),
            "http://127.0.0.1:8500/v1/agent/service/deregister/values-1"
        );
        assert_eq!(registry.name(), "consul:http://127.0.0.1:8500");
    }

    #[test]
    fn test_removal_ids_are_single_segments() {
        let registry = ConsulRegistry::new(&settings()).unwrap();
        let url = registry
            .endpoint_for("v1/agent/service/deregister/", "values#v2/a?b-10.0.0.5-5000")
            .unwrap();
        assert_eq!(
            url.path(),
            "/v1/agent/service/deregister/values%23v2%2Fa%3Fb-10.0.0.5-5000"
        );
        assert!(url.query().is_none());
        assert!(url.fragment().is_none());

        let url = registry.endpoint_for("v1/agent/check/deregister/", "values-health").unwrap();
        assert_eq!(
            url.as_str(),
            "http://127.0.0.1:8500/v1/agent/check/deregister/values-health"
        );
    }

    #[test]
    fn test_registration_body_shape() {
        let tags = vec!["urlprefix-/values".to_string()];
        let body = AgentServiceRegistration {
            id: "values-10.0.0.5-5000",
            name: "values",
            tags: &tags,
            address: "10.0.0.5",
            port: 5000,
            meta: HashMap::from([("version", "1.0.0")]),
        };
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["ID"], "values-10.0.0.5-5000");
        assert_eq!(json["Name"], "values");
        assert_eq!(json["Tags"][0], "urlprefix-/values");
        assert_eq!(json["Port"], 5000);
        assert_eq!(json["Meta"]["version"], "1.0.0");
    }
}
