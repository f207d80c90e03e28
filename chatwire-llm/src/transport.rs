//! Production [`Transport`] over `reqwest`.

use reqwest::Client;

use crate::error::{LlmError, Result, TransportFailure};
use crate::retry::{HttpRequest, HttpResponse, Transport};

/// Sends requests with a shared `reqwest` connection pool.
///
/// Timeouts are enforced by the retry executor, not here.
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    http: Client,
}

impl ReqwestTransport {
    /// Build a transport with a fresh client.
    ///
    /// # Errors
    ///
    /// Returns [`LlmError::Config`] if the TLS backend cannot be initialised.
    pub fn new() -> Result<Self> {
        let http = Client::builder()
            .user_agent(concat!("chatwire/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| LlmError::Config(format!("cannot build HTTP client: {e}")))?;
        Ok(Self { http })
    }

    /// Wrap an existing client.
    #[must_use]
    pub fn with_client(http: Client) -> Self {
        Self { http }
    }
}

impl Transport for ReqwestTransport {
    async fn post(&self, request: &HttpRequest) -> std::result::Result<HttpResponse, TransportFailure> {
        let body = serde_json::to_vec(&request.body)
            .map_err(|e| TransportFailure::Request(format!("cannot encode body: {e}")))?;

        let mut builder = self.http.post(&request.url).body(body);
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }

        let response = builder.send().await?;
        let status = response.status().as_u16();
        let body = response.text().await?;

        Ok(HttpResponse { status, body })
    }
}
