// # OVH Inventory Source
//
// This crate provides the OVH dedicated-server availability source for the
// stockwatch system.
//
// ## Endpoint
//
// `GET https://eu.api.ovh.com/v1/dedicated/server/datacenter/availabilities`
// is public and returns a JSON array of
//
// ```json
// {
//   "fqn": "24sk10.ram-32g-ecc-2133.softraid-2x2000sa",
//   "planCode": "24sk10",
//   "server": "24sk10",
//   "memory": "ram-32g-ecc-2133",
//   "storage": "softraid-2x2000sa",
//   "systemStorage": "...",
//   "gpu": "...",
//   "datacenters": [ { "datacenter": "gra", "availability": "1H-high" } ]
// }
// ```
//
// ## Architecture
//
// One GET per `fetch()`. No polling, caching or retry: the core
// `SnapshotFetcher` and `Monitor` own those. Anything that is not a JSON
// array is a fetch error so the fetcher's fallback engages.

use std::time::Duration;

use stockwatch_core::config::{DEFAULT_OVH_URL, SourceConfig};
use stockwatch_core::source::normalize_payload;
use stockwatch_core::traits::{InventorySource, InventorySourceFactory};
use stockwatch_core::{ComponentRegistry, Error, Resource, Result};

/// Per-request timeout
const REQUEST_TIMEOUT_SECS: u64 = 30;

/// The endpoint rejects requests without a browser-like agent
const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
                          (KHTML, like Gecko) Chrome/91.0.4472.124 Safari/537.36";

/// OVH availability source
pub struct OvhInventorySource {
    url: String,
    client: reqwest::Client,
}

impl OvhInventorySource {
    /// Create a source for the public EU endpoint
    pub fn new() -> Self {
        Self::with_url(DEFAULT_OVH_URL)
    }

    /// Create a source for a specific endpoint
    pub fn with_url(url: impl Into<String>) -> Self {
        Self::with_timeout(url, Duration::from_secs(REQUEST_TIMEOUT_SECS))
    }

    /// Create a source with a custom whole-request timeout
    pub fn with_timeout(url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            url: url.into(),
            client: reqwest::Client::builder()
                .timeout(timeout)
                .user_agent(USER_AGENT)
                .build()
                .unwrap_or_default(),
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    fn request_error(&self, e: reqwest::Error) -> Error {
        if e.is_timeout() {
            Error::timeout(format!("Request to {} timed out", self.url))
        } else {
            Error::http(format!("Request to {} failed: {}", self.url, e))
        }
    }
}

impl Default for OvhInventorySource {
    fn default() -> Self {
        Self::new()
    }
}

/// Whether a Content-Type header announces JSON (absent is tolerated)
fn is_json_content_type(content_type: Option<&str>) -> bool {
    content_type.is_none_or(|value| value.to_ascii_lowercase().contains("json"))
}

/// Parse a response body into resources
fn parse_body(body: &str) -> Result<Vec<Resource>> {
    let payload: serde_json::Value = serde_json::from_str(body)
        .map_err(|e| Error::source(format!("Response is not valid JSON: {}", e)))?;

    if !payload.is_array() {
        return Err(Error::source(format!(
            "Expected a JSON array, got {}",
            json_kind(&payload)
        )));
    }

    Ok(normalize_payload(payload))
}

fn json_kind(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "a boolean",
        serde_json::Value::Number(_) => "a number",
        serde_json::Value::String(_) => "a string",
        serde_json::Value::Array(_) => "an array",
        serde_json::Value::Object(_) => "an object",
    }
}

#[async_trait::async_trait]
impl InventorySource for OvhInventorySource {
    async fn fetch(&self) -> Result<Vec<Resource>> {
        let response = self
            .client
            .get(&self.url)
            .header(reqwest::header::ACCEPT, "application/json")
            .send()
            .await
            .map_err(|e| self.request_error(e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::source(format!("HTTP error: {}", status)));
        }

        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string);
        if !is_json_content_type(content_type.as_deref()) {
            return Err(Error::source(format!(
                "Unexpected content type: {}",
                content_type.unwrap_or_default()
            )));
        }

        let body = response
            .text()
            .await
            .map_err(|e| self.request_error(e))?;

        let resources = parse_body(&body)?;
        tracing::debug!("OVH returned {} resources", resources.len());
        Ok(resources)
    }

    fn source_name(&self) -> &'static str {
        "ovh"
    }
}

/// Factory for creating OVH sources
pub struct OvhSourceFactory;

impl InventorySourceFactory for OvhSourceFactory {
    fn create(&self, config: &SourceConfig) -> Result<Box<dyn InventorySource>> {
        match config {
            SourceConfig::Ovh { url } => Ok(Box::new(OvhInventorySource::with_url(url.clone()))),
            _ => Err(Error::config("Invalid config for OVH source")),
        }
    }
}

/// Register the OVH source with a registry
pub fn register(registry: &ComponentRegistry) {
    registry.register_source("ovh", Box::new(OvhSourceFactory));
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_test::{assert_err, assert_ok};

    #[test]
    fn test_factory_creation() {
        let factory = OvhSourceFactory;

        let source = assert_ok!(factory.create(&SourceConfig::default()));
        assert_eq!(source.source_name(), "ovh");

        let wrong = factory.create(&SourceConfig::Static { resources: Vec::new() });
        assert!(matches!(wrong, Err(Error::Config(_))));
    }

    #[test]
    fn test_register() {
        let registry = ComponentRegistry::new();
        register(&registry);
        assert!(registry.has_source("ovh"));
        assert_ok!(registry.create_source(&SourceConfig::default()));
    }

    #[test]
    fn test_parse_body_normalizes() {
        let body = r#"[
            {
                "fqn": "24sk10.ram-32g-ecc-2133.softraid-2x2000sa",
                "planCode": "24sk10",
                "server": "24sk10",
                "datacenters": [
                    { "datacenter": "gra", "availability": "1H-high" },
                    { "datacenter": "bhs", "availability": "unavailable" }
                ]
            }
        ]"#;

        let resources = assert_ok!(parse_body(body));
        assert_eq!(resources.len(), 1);
        assert_eq!(resources[0].plan_code, "24sk10");
        assert_eq!(resources[0].memory, "N/A");
        assert!(resources[0].locations[0].status.is_available());
        assert!(!resources[0].locations[1].status.is_available());
    }

    #[test]
    fn test_parse_body_rejects_non_json_and_non_arrays() {
        assert_err!(parse_body("<html>Service Unavailable</html>"));
        assert_err!(parse_body(r#"{"message":"rate limited"}"#));
        assert_ok!(parse_body("[]"));
    }

    #[test]
    fn test_content_type_check() {
        assert!(is_json_content_type(None));
        assert!(is_json_content_type(Some("application/json; charset=utf-8")));
        assert!(!is_json_content_type(Some("text/html")));
    }

    #[tokio::test]
    async fn test_unreachable_endpoint_is_an_error() {
        // Nothing listens on the discard port
        let source = OvhInventorySource::with_url("http://127.0.0.1:9/availabilities");
        assert_err!(source.fetch().await);
    }

    #[tokio::test]
    async fn test_stalled_endpoint_times_out() {
        // Connections queue in the backlog but nothing ever answers
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let url = format!("http://{}/availabilities", listener.local_addr().unwrap());

        let source = OvhInventorySource::with_timeout(url, Duration::from_millis(200));
        let err = assert_err!(source.fetch().await);
        assert!(matches!(err, Error::Timeout(_)), "unexpected error: {}", err);
    }
}
