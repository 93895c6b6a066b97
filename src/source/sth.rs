//! STH-Comet backed data source.

use async_trait::async_trait;
use vitalwatch_adapters::SthAdapter;

use super::{FetchOutcome, SampleSource};
use crate::data::Attribute;

/// A data source that queries the STH-Comet history of one entity.
#[derive(Debug, Clone)]
pub struct SthSource {
    adapter: SthAdapter,
    description: String,
}

impl SthSource {
    pub fn new(adapter: SthAdapter) -> Self {
        let description = format!("sth: {} ({})", adapter.endpoint(), adapter.entity_id());
        Self {
            adapter,
            description,
        }
    }
}

#[async_trait]
impl SampleSource for SthSource {
    async fn fetch(&self, attribute: Attribute, last_n: usize) -> FetchOutcome {
        let result = self.adapter.fetch(attribute.name(), last_n).await;
        match &result {
            Err(err) if err.is_schema() => {
                tracing::warn!(%attribute, error = %err, "Unexpected STH-Comet payload")
            }
            Err(err) => tracing::debug!(%attribute, error = %err, "STH-Comet fetch failed"),
            Ok(_) => {}
        }
        FetchOutcome::from_result(result)
    }

    fn description(&self) -> &str {
        &self.description
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::Unavailable;
    use std::sync::Arc;
    use vitalwatch_adapters::{AdapterError, HttpRequest, HttpResponse, Transport};

    #[derive(Debug)]
    struct FixedTransport(HttpResponse);

    #[async_trait]
    impl Transport for FixedTransport {
        async fn get(&self, _request: &HttpRequest) -> Result<HttpResponse, AdapterError> {
            Ok(self.0.clone())
        }
    }

    fn source(status: u16, body: &str) -> SthSource {
        let transport = Arc::new(FixedTransport(HttpResponse {
            status,
            body: body.to_string(),
        }));
        let adapter = SthAdapter::builder()
            .endpoint("http://sth.local:8666")
            .entity("Sensor", "urn:ngsi-ld:bpm:030")
            .transport(transport)
            .build()
            .unwrap();
        SthSource::new(adapter)
    }

    #[test]
    fn test_description() {
        let source = source(200, "{}");
        assert_eq!(
            source.description(),
            "sth: http://sth.local:8666 (urn:ngsi-ld:bpm:030)"
        );
    }

    #[tokio::test]
    async fn test_fetch_samples() {
        let body = r#"{"contextResponses":[{"contextElement":{"attributes":[{"values":[
            {"recvTime":"2024-06-01T15:00:00Z","attrValue":"97"}
        ]}]}}]}"#;
        let outcome = source(200, body).fetch(Attribute::Spo2, 20).await;
        assert!(outcome.is_available());
    }

    #[tokio::test]
    async fn test_fetch_failures_are_unavailable() {
        assert_eq!(
            source(500, "").fetch(Attribute::Bpm, 20).await,
            FetchOutcome::Unavailable(Unavailable::Status(500))
        );
        assert!(matches!(
            source(200, "[]").fetch(Attribute::Bpm, 20).await,
            FetchOutcome::Unavailable(Unavailable::Schema(_))
        ));
        let empty = r#"{"contextResponses":[{"contextElement":{"attributes":[{"values":[]}]}}]}"#;
        assert_eq!(
            source(200, empty).fetch(Attribute::Bpm, 20).await,
            FetchOutcome::Unavailable(Unavailable::Empty)
        );
    }
}
