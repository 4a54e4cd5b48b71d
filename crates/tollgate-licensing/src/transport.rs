//! Reqwest-backed [`HttpTransport`].

use async_trait::async_trait;
use std::time::Duration;
use tollgate_core::{Error, HttpRequest, HttpResponse, HttpTransport, Result};
use tracing::debug;

/// HTTP transport over a shared [`reqwest::Client`].
#[derive(Debug, Clone, Default)]
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reuse an existing client (proxies, custom TLS roots).
    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn post(&self, request: HttpRequest) -> Result<HttpResponse> {
        let HttpRequest {
            url,
            headers,
            body,
            timeout,
        } = request;

        let mut builder = self.client.post(&url).body(body);
        for (name, value) in &headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }

        let response = builder.send().await.map_err(|e| map_error(e, timeout))?;
        let status = response.status().as_u16();
        let body = response.text().await.map_err(|e| map_error(e, timeout))?;

        debug!(url = %url, status, "Attestation response received");
        Ok(HttpResponse::new(status, body))
    }
}

fn map_error(error: reqwest::Error, timeout: Option<Duration>) -> Error {
    if error.is_timeout() {
        Error::Timeout {
            timeout_ms: timeout.map(|t| t.as_millis() as u64).unwrap_or_default(),
        }
    } else {
        Error::Network(error.to_string())
    }
}
