//! HTTP transport seam
//!
//! Adapters only ever POST JSON and read back a status plus body. Keeping
//! that behind [`Transport`] lets tests run adapters against wiremock or an
//! in-memory double.

use crate::error::{ProviderError, TransportFault};
use async_trait::async_trait;
use std::error::Error as StdError;

/// Outgoing JSON POST
#[derive(Debug, Clone)]
pub struct HttpRequest {
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: serde_json::Value,
}

impl HttpRequest {
    pub fn post(url: impl Into<String>, body: serde_json::Value) -> Self {
        Self {
            url: url.into(),
            headers: Vec::new(),
            body,
        }
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }
}

/// Raw response: status and undecoded body
#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: u16,
    pub body: String,
}

impl HttpResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

#[async_trait]
pub trait Transport: Send + Sync {
    /// Send the request; any response (including 4xx/5xx) is `Ok`
    ///
    /// Only failures that produced no response are `Err`.
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, ProviderError>;
}

/// Production transport backed by a shared `reqwest::Client`
///
/// Deadlines are enforced by the adapters, not by the client.
#[derive(Clone)]
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    pub fn new() -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("jarvis-orchestrator/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, ProviderError> {
        let mut builder = self.client.post(&request.url).json(&request.body);
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }

        let response = builder.send().await.map_err(map_reqwest_error)?;
        let status = response.status().as_u16();
        let body = response.text().await.map_err(map_reqwest_error)?;

        Ok(HttpResponse { status, body })
    }
}

/// Translate a reqwest failure into a transport fault
///
/// reqwest does not expose the OS error kind directly, so the source chain
/// text is inspected.
fn map_reqwest_error(err: reqwest::Error) -> ProviderError {
    let chain = error_chain(&err);
    let lowered = chain.to_ascii_lowercase();

    let fault = if err.is_timeout() {
        TransportFault::Timeout
    } else if lowered.contains("dns")
        || lowered.contains("failed to lookup address")
        || lowered.contains("name or service not known")
    {
        TransportFault::DnsNotFound
    } else if lowered.contains("refused") {
        TransportFault::ConnectionRefused
    } else if lowered.contains("reset") || lowered.contains("broken pipe") {
        TransportFault::ConnectionReset
    } else if err.is_connect() {
        TransportFault::ConnectionRefused
    } else {
        TransportFault::Other
    };

    ProviderError::transport(fault, format!("{}: {}", fault.as_str(), chain))
}

fn error_chain(err: &(dyn StdError + 'static)) -> String {
    let mut parts = vec![err.to_string()];
    let mut source = err.source();
    while let Some(inner) = source {
        parts.push(inner.to_string());
        source = inner.source();
    }
    parts.join(": ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_http_request_builder_collects_headers() {
        let req = HttpRequest::post("http://localhost/v1", serde_json::json!({"a": 1}))
            .header("x-api-key", "k")
            .header("anthropic-version", "2023-06-01");
        assert_eq!(req.headers.len(), 2);
        assert_eq!(req.headers[0], ("x-api-key".to_string(), "k".to_string()));
    }

    #[test]
    fn test_http_response_success_range() {
        assert!(HttpResponse { status: 200, body: String::new() }.is_success());
        assert!(!HttpResponse { status: 429, body: String::new() }.is_success());
    }

    #[tokio::test]
    async fn test_connection_refused_maps_to_network_fault() {
        // Port 9 (discard) on localhost is almost never listening
        let transport = ReqwestTransport::new().unwrap();
        let err = transport
            .send(HttpRequest::post("http://127.0.0.1:9/v1", serde_json::json!({})))
            .await
            .expect_err("nothing listens on port 9");
        assert!(
            matches!(
                err.fault(),
                Some(TransportFault::ConnectionRefused | TransportFault::ConnectionReset)
            ),
            "unexpected fault: {:?} ({})",
            err.fault(),
            err
        );
    }
}
