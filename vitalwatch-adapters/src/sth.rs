//! FIWARE STH-Comet adapter for the historical attribute API.
//!
//! STH-Comet keeps the raw history of every attribute published by a context
//! entity. This adapter asks it for the most recent `lastN` values of a single
//! attribute of a single entity.
//!
//! ## Request
//!
//! ```text
//! GET {endpoint}/STH/v1/contextEntities/type/{type}/id/{id}/attributes/{attr}?lastN={n}
//! fiware-service: {service}
//! fiware-servicepath: {service_path}
//! ```
//!
//! ## Response
//!
//! Only `contextResponses[0].contextElement.attributes[0].values` is read; every
//! other field is ignored. Each value carries a `recvTime` and an `attrValue`.
//!
//! ## Example
//!
//! ```rust,no_run
//! use vitalwatch_adapters::sth::SthAdapter;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let adapter = SthAdapter::builder()
//!         .endpoint("http://localhost:8666")
//!         .entity("Sensor", "urn:ngsi-ld:bpm:032")
//!         .build()?;
//!
//!     for sample in adapter.fetch("bpm", 30).await? {
//!         println!("{} -> {}", sample.recv_time, sample.attr_value);
//!     }
//!
//!     Ok(())
//! }
//! ```

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Deserializer, Serialize};

use crate::AdapterError;

/// Default per-request timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

/// A single value as stored by STH-Comet, before any interpretation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawSample {
    /// Reception time in UTC, e.g. `2024-05-01T12:00:00.123Z`.
    #[serde(rename = "recvTime")]
    pub recv_time: String,
    /// The attribute value. STH stores strings, but numbers are accepted too.
    #[serde(rename = "attrValue", deserialize_with = "string_or_number")]
    pub attr_value: String,
}

impl RawSample {
    pub fn new(recv_time: impl Into<String>, attr_value: impl Into<String>) -> Self {
        Self {
            recv_time: recv_time.into(),
            attr_value: attr_value.into(),
        }
    }
}

/// Outgoing GET request handed to a [`Transport`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpRequest {
    pub url: String,
    pub headers: Vec<(String, String)>,
}

/// Status and body returned by a [`Transport`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub body: String,
}

impl HttpResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// The HTTP capability the adapter needs.
///
/// The default implementation is [`ReqwestTransport`]; tests and embedders can
/// supply their own.
#[async_trait]
pub trait Transport: Send + Sync + fmt::Debug {
    /// Perform a GET request. Non-success statuses are returned, not raised.
    async fn get(&self, request: &HttpRequest) -> Result<HttpResponse, AdapterError>;
}

/// [`Transport`] backed by a `reqwest` client with a fixed timeout.
#[cfg(feature = "reqwest")]
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: reqwest::Client,
}

#[cfg(feature = "reqwest")]
impl ReqwestTransport {
    pub fn new(timeout: Duration) -> Result<Self, AdapterError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { client })
    }
}

#[cfg(feature = "reqwest")]
#[async_trait]
impl Transport for ReqwestTransport {
    async fn get(&self, request: &HttpRequest) -> Result<HttpResponse, AdapterError> {
        let mut builder = self.client.get(&request.url);
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }

        let response = builder.send().await?;
        let status = response.status().as_u16();
        let body = response.text().await?;

        Ok(HttpResponse { status, body })
    }
}

/// STH-Comet adapter scoped to one entity.
#[derive(Debug, Clone)]
pub struct SthAdapter {
    transport: Arc<dyn Transport>,
    endpoint: String,
    service: String,
    service_path: String,
    entity_type: String,
    entity_id: String,
}

impl SthAdapter {
    /// Create a new builder for configuring the adapter.
    pub fn builder() -> SthAdapterBuilder {
        SthAdapterBuilder::default()
    }

    /// The entity id every request is scoped to.
    pub fn entity_id(&self) -> &str {
        &self.entity_id
    }

    /// The base endpoint, without trailing slash.
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Build the history URL for an attribute.
    pub fn history_url(&self, attribute: &str, last_n: usize) -> String {
        format!(
            "{}/STH/v1/contextEntities/type/{}/id/{}/attributes/{}?lastN={}",
            self.endpoint,
            urlencoded(&self.entity_type),
            urlencoded(&self.entity_id),
            urlencoded(attribute),
            last_n
        )
    }

    /// Fetch the `last_n` most recent values of `attribute`.
    ///
    /// An empty history is returned as an empty `Vec`; deciding whether that
    /// counts as a failure is up to the caller.
    pub async fn fetch(&self, attribute: &str, last_n: usize) -> Result<Vec<RawSample>, AdapterError> {
        let request = HttpRequest {
            url: self.history_url(attribute, last_n),
            headers: vec![
                ("fiware-service".to_string(), self.service.clone()),
                ("fiware-servicepath".to_string(), self.service_path.clone()),
            ],
        };

        let response = self.transport.get(&request).await?;
        if !response.is_success() {
            return Err(AdapterError::Status(response.status));
        }

        parse_history(&response.body)
    }
}

/// Builder for SthAdapter.
#[derive(Debug, Default)]
pub struct SthAdapterBuilder {
    endpoint: Option<String>,
    service: Option<String>,
    service_path: Option<String>,
    entity_type: Option<String>,
    entity_id: Option<String>,
    timeout: Option<Duration>,
    transport: Option<Arc<dyn Transport>>,
}

impl SthAdapterBuilder {
    /// Set the STH-Comet endpoint (e.g., "http://localhost:8666").
    pub fn endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = Some(endpoint.into());
        self
    }

    /// Set the `fiware-service` and `fiware-servicepath` tenant headers.
    pub fn service(mut self, service: impl Into<String>, service_path: impl Into<String>) -> Self {
        self.service = Some(service.into());
        self.service_path = Some(service_path.into());
        self
    }

    /// Set the entity type and id to query.
    pub fn entity(mut self, entity_type: impl Into<String>, entity_id: impl Into<String>) -> Self {
        self.entity_type = Some(entity_type.into());
        self.entity_id = Some(entity_id.into());
        self
    }

    /// Set the request timeout (default: 5 seconds).
    ///
    /// Ignored when a custom transport is supplied.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Use a custom transport instead of the default HTTP client.
    pub fn transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Build the adapter.
    pub fn build(self) -> Result<SthAdapter, AdapterError> {
        let transport = match self.transport {
            Some(transport) => transport,
            None => default_transport(self.timeout.unwrap_or(DEFAULT_TIMEOUT))?,
        };

        let endpoint = self
            .endpoint
            .unwrap_or_else(|| "http://localhost:8666".to_string())
            .trim_end_matches('/')
            .to_string();

        Ok(SthAdapter {
            transport,
            endpoint,
            service: self.service.unwrap_or_else(|| "smart".to_string()),
            service_path: self.service_path.unwrap_or_else(|| "/".to_string()),
            entity_type: self.entity_type.unwrap_or_else(|| "Sensor".to_string()),
            entity_id: self
                .entity_id
                .unwrap_or_else(|| "urn:ngsi-ld:bpm:032".to_string()),
        })
    }
}

#[cfg(feature = "reqwest")]
fn default_transport(timeout: Duration) -> Result<Arc<dyn Transport>, AdapterError> {
    Ok(Arc::new(ReqwestTransport::new(timeout)?))
}

#[cfg(not(feature = "reqwest"))]
fn default_transport(_timeout: Duration) -> Result<Arc<dyn Transport>, AdapterError> {
    Err(AdapterError::Connection(
        "no transport configured and the reqwest feature is disabled".to_string(),
    ))
}

/// Extract the value list from an STH-Comet history response body.
pub fn parse_history(body: &str) -> Result<Vec<RawSample>, AdapterError> {
    let response: HistoryResponse = serde_json::from_str(body)?;

    let element = response
        .context_responses
        .into_iter()
        .next()
        .ok_or_else(|| AdapterError::Parse("no context responses".to_string()))?
        .context_element;

    let attribute = element
        .attributes
        .into_iter()
        .next()
        .ok_or_else(|| AdapterError::Parse("context element has no attributes".to_string()))?;

    Ok(attribute.values)
}

// Escape the characters that would change the meaning of a path segment
fn urlencoded(s: &str) -> String {
    s.replace('%', "%25")
        .replace('/', "%2F")
        .replace(' ', "%20")
        .replace('?', "%3F")
        .replace('#', "%23")
}

fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum AttrValue {
        Text(String),
        Number(serde_json::Number),
    }

    Ok(match AttrValue::deserialize(deserializer)? {
        AttrValue::Text(text) => text,
        AttrValue::Number(number) => number.to_string(),
    })
}

#[derive(Debug, Deserialize)]
struct HistoryResponse {
    #[serde(rename = "contextResponses")]
    context_responses: Vec<ContextResponse>,
}

#[derive(Debug, Deserialize)]
struct ContextResponse {
    #[serde(rename = "contextElement")]
    context_element: ContextElement,
}

#[derive(Debug, Deserialize)]
struct ContextElement {
    attributes: Vec<AttributeHistory>,
}

#[derive(Debug, Deserialize)]
struct AttributeHistory {
    values: Vec<RawSample>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Debug)]
    struct StubTransport {
        response: Result<HttpResponse, fn() -> AdapterError>,
        requests: Mutex<Vec<HttpRequest>>,
    }

    impl StubTransport {
        fn ok(status: u16, body: &str) -> Arc<Self> {
            Arc::new(Self {
                response: Ok(HttpResponse {
                    status,
                    body: body.to_string(),
                }),
                requests: Mutex::new(Vec::new()),
            })
        }

        fn failing(err: fn() -> AdapterError) -> Arc<Self> {
            Arc::new(Self {
                response: Err(err),
                requests: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl Transport for StubTransport {
        async fn get(&self, request: &HttpRequest) -> Result<HttpResponse, AdapterError> {
            self.requests.lock().unwrap().push(request.clone());
            match &self.response {
                Ok(response) => Ok(response.clone()),
                Err(make) => Err(make()),
            }
        }
    }

    fn history_json() -> &'static str {
        r#"{
            "contextResponses": [{
                "contextElement": {
                    "attributes": [{
                        "name": "bpm",
                        "values": [
                            {"_id": "a", "recvTime": "2024-05-01T12:00:00.123Z", "attrType": "Number", "attrValue": "72"},
                            {"_id": "b", "recvTime": "2024-05-01T12:00:02Z", "attrType": "Number", "attrValue": 74.5}
                        ]
                    }],
                    "id": "urn:ngsi-ld:bpm:032",
                    "isPattern": false,
                    "type": "Sensor"
                },
                "statusCode": {"code": "200", "reasonPhrase": "OK"}
            }]
        }"#
    }

    fn adapter_with(transport: Arc<StubTransport>) -> SthAdapter {
        SthAdapter::builder()
            .endpoint("http://sth.local:8666/")
            .service("smart", "/")
            .entity("Sensor", "urn:ngsi-ld:bpm:032")
            .transport(transport)
            .build()
            .unwrap()
    }

    #[test]
    fn test_builder_defaults() {
        let adapter = SthAdapter::builder()
            .transport(StubTransport::ok(200, "{}"))
            .build()
            .unwrap();
        assert_eq!(adapter.endpoint(), "http://localhost:8666");
        assert_eq!(adapter.entity_id(), "urn:ngsi-ld:bpm:032");
        assert_eq!(adapter.service, "smart");
        assert_eq!(adapter.service_path, "/");
        assert_eq!(adapter.entity_type, "Sensor");
    }

    #[test]
    fn test_history_url() {
        let adapter = adapter_with(StubTransport::ok(200, "{}"));
        assert_eq!(
            adapter.history_url("temperatureC", 30),
            "http://sth.local:8666/STH/v1/contextEntities/type/Sensor/id/urn:ngsi-ld:bpm:032/attributes/temperatureC?lastN=30"
        );
    }

    #[test]
    fn test_urlencoded() {
        assert_eq!(urlencoded("/"), "%2F");
        assert_eq!(urlencoded("a b"), "a%20b");
        assert_eq!(urlencoded("urn:ngsi-ld:bpm:032"), "urn:ngsi-ld:bpm:032");
    }

    #[test]
    fn test_parse_history_accepts_strings_and_numbers() {
        let values = parse_history(history_json()).unwrap();
        assert_eq!(
            values,
            vec![
                RawSample::new("2024-05-01T12:00:00.123Z", "72"),
                RawSample::new("2024-05-01T12:00:02Z", "74.5"),
            ]
        );
    }

    #[test]
    fn test_parse_history_rejects_unexpected_shapes() {
        assert!(parse_history("not json").unwrap_err().is_schema());
        assert!(parse_history(r#"{"contextResponses": []}"#).unwrap_err().is_schema());
        assert!(parse_history(r#"{"contextResponses": [{"contextElement": {"attributes": []}}]}"#)
            .unwrap_err()
            .is_schema());
        assert!(parse_history(r#"{"error": "NotFound"}"#).unwrap_err().is_schema());
        assert!(parse_history(
            r#"{"contextResponses": [{"contextElement": {"attributes": [{"values": [{"attrValue": "1"}]}]}}]}"#
        )
        .unwrap_err()
        .is_schema());
    }

    #[test]
    fn test_parse_history_empty_values() {
        let body = r#"{"contextResponses": [{"contextElement": {"attributes": [{"values": []}]}}]}"#;
        assert!(parse_history(body).unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_fetch_sends_tenant_headers() {
        let transport = StubTransport::ok(200, history_json());
        let adapter = adapter_with(transport.clone());

        let values = adapter.fetch("bpm", 20).await.unwrap();
        assert_eq!(values.len(), 2);

        let requests = transport.requests.lock().unwrap();
        assert_eq!(requests.len(), 1);
        assert!(requests[0].url.ends_with("/attributes/bpm?lastN=20"));
        assert!(requests[0]
            .headers
            .contains(&("fiware-service".to_string(), "smart".to_string())));
        assert!(requests[0]
            .headers
            .contains(&("fiware-servicepath".to_string(), "/".to_string())));
    }

    #[tokio::test]
    async fn test_fetch_non_success_status() {
        let adapter = adapter_with(StubTransport::ok(404, ""));
        let err = adapter.fetch("bpm", 20).await.unwrap_err();
        assert!(matches!(err, AdapterError::Status(404)));
    }

    #[tokio::test]
    async fn test_fetch_transport_error_passes_through() {
        let adapter = adapter_with(StubTransport::failing(|| AdapterError::Timeout));
        let err = adapter.fetch("spo2", 20).await.unwrap_err();
        assert!(matches!(err, AdapterError::Timeout));
    }
}
