//! Remote key/value configuration source backed by the Consul KV store.

use super::ConfigSource;
use crate::error::{ConfigError, Result};
use async_trait::async_trait;
use reqwest::{Client, Response, StatusCode};
use serde_json::Value as JsonValue;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

const INDEX_HEADER: &str = "X-Consul-Index";
const TOKEN_HEADER: &str = "X-Consul-Token";

/// Configuration source reading one JSON document from a Consul KV key.
///
/// Changes are detected with Consul blocking queries: the source remembers the
/// `X-Consul-Index` of the last response and parks a request on the server until
/// the index moves or the wait time elapses. Nothing is polled in a tight loop.
///
/// The source is optional and reloadable by default, so an unreachable store
/// never prevents the node from starting.
///
/// # Examples
///
/// ```rust,no_run
/// use node_bootstrap::sources::ConsulKvSource;
/// use std::time::Duration;
///
/// # fn example() -> node_bootstrap::error::Result<()> {
/// let source = ConsulKvSource::builder()
///     .with_address("http://127.0.0.1:8500")
///     .with_key("sampleservicesettings.json")
///     .with_wait(Duration::from_secs(60))
///     .build()?;
/// # Ok(())
/// # }
/// ```
pub struct ConsulKvSource {
    address: String,
    key: String,
    client: Client,
    token: Option<String>,
    timeout: Duration,
    wait: Duration,
    priority: i32,
    optional: bool,
    reloadable: bool,
    last_index: AtomicU64,
}

impl ConsulKvSource {
    /// Create a new builder for constructing a Consul KV source.
    pub fn builder() -> ConsulKvSourceBuilder {
        ConsulKvSourceBuilder::new()
    }

    fn key_url(&self) -> String {
        format!(
            "{}/v1/kv/{}",
            self.address.trim_end_matches('/'),
            self.key.trim_start_matches('/')
        )
    }

    fn request(&self, url: &str) -> reqwest::RequestBuilder {
        let request = self.client.get(url);
        match &self.token {
            Some(token) => request.header(TOKEN_HEADER, token),
            None => request,
        }
    }

    /// The last index observed from the store, 0 if none yet.
    pub fn last_index(&self) -> u64 {
        self.last_index.load(Ordering::Acquire)
    }

    /// Issue one blocking query. Returns `true` when the index moved.
    async fn poll_index(&self) -> Result<bool> {
        let last = self.last_index();
        let wait = format!("{}s", self.wait.as_secs().max(1));

        let response = self
            .request(&self.key_url())
            .query(&[("index", last.to_string()), ("wait", wait)])
            .timeout(self.wait + self.timeout)
            .send()
            .await
            .map_err(|e| ConfigError::WatchError(format!("Consul blocking query failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() && status != StatusCode::NOT_FOUND {
            return Err(ConfigError::WatchError(format!(
                "Consul blocking query failed with status {}",
                status
            )));
        }

        let index = response_index(&response).ok_or_else(|| {
            ConfigError::WatchError(format!("Consul response is missing {}", INDEX_HEADER))
        })?;

        Ok(self.advance_index(index))
    }

    /// Record a new index following Consul's reset rules.
    fn advance_index(&self, index: u64) -> bool {
        let last = self.last_index.swap(index, Ordering::AcqRel);
        if last == 0 {
            // First observation only establishes the baseline.
            return false;
        }
        // An index that goes backwards means the store was reset; treat it as a change.
        index != last
    }
}

#[async_trait]
impl ConfigSource for ConsulKvSource {
    async fn load(&self) -> Result<HashMap<String, config::Value>> {
        let url = format!("{}?raw", self.key_url());
        let response = self
            .request(&url)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| ConfigError::LoadError(format!("Consul request failed: {}", e)))?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Err(ConfigError::LoadError(format!(
                "Consul key not found: {}",
                self.key
            )));
        }
        if !status.is_success() {
            return Err(ConfigError::LoadError(format!(
                "Consul request failed with status {}: {}",
                status,
                status.canonical_reason().unwrap_or("Unknown")
            )));
        }

        if let Some(index) = response_index(&response) {
            self.last_index.fetch_max(index, Ordering::AcqRel);
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| ConfigError::LoadError(format!("Failed to read Consul value: {}", e)))?;
        let json: JsonValue = serde_json::from_slice(&body)
            .map_err(|e| ConfigError::ParseError(format!("Failed to parse JSON: {}", e)))?;

        json_to_config_map(json)
    }

    fn name(&self) -> String {
        format!("consul:{}/{}", self.address.trim_end_matches('/'), self.key)
    }

    fn priority(&self) -> i32 {
        self.priority
    }

    fn is_optional(&self) -> bool {
        self.optional
    }

    fn is_reloadable(&self) -> bool {
        self.reloadable
    }

    async fn wait_for_change(&self) -> Result<()> {
        if !self.reloadable {
            return Err(ConfigError::WatchNotSupported);
        }
        loop {
            if self.poll_index().await? {
                return Ok(());
            }
        }
    }
}

fn response_index(response: &Response) -> Option<u64> {
    response
        .headers()
        .get(INDEX_HEADER)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.parse().ok())
}

/// Builder for constructing a `ConsulKvSource`.
pub struct ConsulKvSourceBuilder {
    address: Option<String>,
    key: Option<String>,
    token: Option<String>,
    timeout: Duration,
    wait: Duration,
    priority: i32,
    optional: bool,
    reloadable: bool,
}

impl ConsulKvSourceBuilder {
    /// Create a new builder with default settings.
    pub fn new() -> Self {
        Self {
            address: None,
            key: None,
            token: None,
            timeout: Duration::from_secs(10),
            wait: Duration::from_secs(300),
            priority: 250, // Higher than files (100-200), lower than env vars (300)
            optional: true,
            reloadable: true,
        }
    }

    /// Base address of the Consul agent, e.g. `http://127.0.0.1:8500`.
    pub fn with_address(mut self, address: impl Into<String>) -> Self {
        self.address = Some(address.into());
        self
    }

    /// Key holding the JSON settings document.
    pub fn with_key(mut self, key: impl Into<String>) -> Self {
        self.key = Some(key.into());
        self
    }

    /// ACL token sent with every request.
    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    /// Timeout for plain reads; blocking queries get this on top of the wait time.
    ///
    /// Default is 10 seconds.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Maximum time a blocking query is parked on the server.
    ///
    /// Default is 5 minutes, Consul's own default.
    pub fn with_wait(mut self, wait: Duration) -> Self {
        self.wait = wait;
        self
    }

    /// Set the priority for this source.
    ///
    /// Default is 250 (higher than files, lower than environment variables).
    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    /// Whether a failing store aborts the build. Default is optional.
    pub fn optional(mut self, optional: bool) -> Self {
        self.optional = optional;
        self
    }

    /// Whether the key is watched for changes. Default is reloadable.
    pub fn reloadable(mut self, reloadable: bool) -> Self {
        self.reloadable = reloadable;
        self
    }

    /// Build the Consul KV source.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - No address or key is provided
    /// - The HTTP client cannot be constructed
    pub fn build(self) -> Result<ConsulKvSource> {
        let address = self.address.ok_or_else(|| {
            ConfigError::LoadError("Address is required for ConsulKvSource".to_string())
        })?;
        let key = self
            .key
            .ok_or_else(|| ConfigError::LoadError("Key is required for ConsulKvSource".to_string()))?;

        let client = Client::builder()
            .build()
            .map_err(|e| ConfigError::LoadError(format!("Failed to create HTTP client: {}", e)))?;

        Ok(ConsulKvSource {
            address,
            key,
            client,
            token: self.token,
            timeout: self.timeout,
            wait: self.wait,
            priority: self.priority,
            optional: self.optional,
            reloadable: self.reloadable,
            last_index: AtomicU64::new(0),
        })
    }
}

impl Default for ConsulKvSourceBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Convert a JSON value to a config::Value HashMap.
pub(crate) fn json_to_config_map(json: JsonValue) -> Result<HashMap<String, config::Value>> {
    match json {
        JsonValue::Object(map) => {
            let mut result = HashMap::new();
            for (key, value) in map {
                result.insert(key, json_value_to_config_value(value)?);
            }
            Ok(result)
        }
        _ => Err(ConfigError::ParseError(
            "Expected JSON object at root level".to_string(),
        )),
    }
}

/// Convert a serde_json::Value to a config::Value.
fn json_value_to_config_value(value: JsonValue) -> Result<config::Value> {
    match value {
        JsonValue::Null => Ok(config::Value::new(None, config::ValueKind::Nil)),
        JsonValue::Bool(b) => Ok(config::Value::new(None, config::ValueKind::Boolean(b))),
        JsonValue::Number(n) => {
            if let Some(i) = n.as_i64() {
                Ok(config::Value::new(None, config::ValueKind::I64(i)))
            } else if let Some(f) = n.as_f64() {
                Ok(config::Value::new(None, config::ValueKind::Float(f)))
            } else {
                Err(ConfigError::ParseError(format!(
                    "Unsupported number type: {}",
                    n
                )))
            }
        }
        JsonValue::String(s) => Ok(config::Value::new(None, config::ValueKind::String(s))),
        JsonValue::Array(arr) => {
            let values: Result<Vec<config::Value>> =
                arr.into_iter().map(json_value_to_config_value).collect();
            Ok(config::Value::new(None, config::ValueKind::Array(values?)))
        }
        JsonValue::Object(map) => {
            let mut result = HashMap::new();
            for (key, val) in map {
                result.insert(key, json_value_to_config_value(val)?);
            }
            Ok(config::Value::new(None, config::ValueKind::Table(result)))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn source() -> ConsulKvSource {
        ConsulKvSource::builder()
            .with_address("http://127.0.0.1:8500/")
            .with_key("/sampleservicesettings.json")
            .build()
            .unwrap()
    }

    #[test]
    fn test_builder_defaults() {
        let source = source();
        assert_eq!(source.priority(), 250);
        assert!(source.is_optional());
        assert!(source.is_reloadable());
        assert_eq!(source.last_index(), 0);
        assert_eq!(
            source.key_url(),
            "http://127.0.0.1:8500/v1/kv/sampleservicesettings.json"
        );
    }

    #[test]
    fn test_builder_requires_address_and_key() {
        assert!(ConsulKvSource::builder().with_key("k").build().is_err());
        assert!(
            ConsulKvSource::builder()
                .with_address("http://localhost:8500")
                .build()
                .is_err()
        );
    }

    #[test]
    fn test_advance_index() {
        let source = source();
        // Baseline
        assert!(!source.advance_index(10));
        // Timeout without change
        assert!(!source.advance_index(10));
        assert!(source.advance_index(12));
        // Reset on the server side
        assert!(source.advance_index(3));
        assert_eq!(source.last_index(), 3);
    }

    #[test]
    fn test_json_to_config_map() {
        let json = json!({
            "registry": { "host": "localhost", "port": 8500 },
            "debug": true,
            "ratio": 0.5,
            "tags": ["a", "b"]
        });

        let map = json_to_config_map(json).unwrap();
        assert!(map.contains_key("registry"));
        assert!(map["debug"].clone().into_bool().unwrap());
        assert_eq!(map["tags"].clone().into_array().unwrap().len(), 2);
    }

    #[test]
    fn test_json_to_config_map_invalid() {
        let map = json_to_config_map(json!([1, 2, 3]));
        assert!(matches!(map, Err(ConfigError::ParseError(_))));
    }

    #[tokio::test]
    async fn test_unreachable_store_fails_load() {
        let source = ConsulKvSource::builder()
            .with_address("http://127.0.0.1:1")
            .with_key("settings.json")
            .with_timeout(Duration::from_millis(500))
            .build()
            .unwrap();
        let err = source.load().await.unwrap_err();
        assert!(matches!(err, ConfigError::LoadError(_)));
    }
}
