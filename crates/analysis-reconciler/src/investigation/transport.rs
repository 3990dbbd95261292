//! Transport seam for the investigation service.

use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;

use super::error::{InvestigationError, TransportResult};
use super::wire::{InvestigationRequest, InvestigationResponse};

/// Path of the incident analysis endpoint, relative to the base URL.
pub const ANALYZE_PATH: &str = "/api/v1/incident/analyze";

/// One network exchange with the investigation service.
///
/// Implementations perform exactly one call per invocation and never retry;
/// retry policy belongs to [`super::InvestigationClient`].
#[async_trait]
pub trait InvestigationTransport: Send + Sync {
    async fn send(
        &self,
        request: &InvestigationRequest,
    ) -> TransportResult<InvestigationResponse>;
}

/// HTTP transport backed by `reqwest`.
pub struct HttpInvestigationTransport {
    client: reqwest::Client,
    url: String,
}

impl HttpInvestigationTransport {
    /// Build a transport for `base_url` with a per-request timeout.
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self::with_client(client, base_url))
    }

    /// Use a pre-configured client (shared connection pool, custom TLS).
    pub fn with_client(client: reqwest::Client, base_url: &str) -> Self {
        Self {
            client,
            url: format!("{}{}", base_url.trim_end_matches('/'), ANALYZE_PATH),
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl InvestigationTransport for HttpInvestigationTransport {
    async fn send(
        &self,
        request: &InvestigationRequest,
    ) -> TransportResult<InvestigationResponse> {
        let response = self.client.post(&self.url).json(request).send().await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            debug!(status = status.as_u16(), url = %self.url, "Investigation call rejected");
            return Err(InvestigationError::api(status.as_u16(), body));
        }

        Ok(response.json::<InvestigationResponse>().await?)
    }
}
