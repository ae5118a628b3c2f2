//! Gateway client for posting assertions and reveals.
//!
//! Public API: no status code knowledge. All HTTP/status mapping in http.rs.

use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderValue, USER_AGENT};
use tracing::debug;
use uuid::Uuid;

use crate::error::{GatewayError, GatewayResult};
use crate::types::{
    AssertionReceipt, AssertionRequest, GatewayConfig, PendingBounty, RevealRequest,
};

mod artifacts;
mod helpers;
mod http;

pub use artifacts::{ArtifactBody, ArtifactClient};
pub use helpers::{validate_artifact_uri, MAX_ARTIFACT_URI_LEN};

use helpers::unwrap_envelope;
use http::HttpBackend;

pub(crate) const USER_AGENT_VALUE: &str = concat!("microengine/", env!("CARGO_PKG_VERSION"));

pub(crate) fn build_http_client(config: &GatewayConfig) -> GatewayResult<reqwest::Client> {
    let mut default_headers = HeaderMap::new();
    default_headers.insert(USER_AGENT, HeaderValue::from_static(USER_AGENT_VALUE));

    reqwest::Client::builder()
        .timeout(Duration::from_secs(config.timeout_secs))
        .default_headers(default_headers)
        .build()
        .map_err(|e| GatewayError::Config {
            message: format!("failed to create HTTP client: {}", e),
        })
}

/// Client for the bounty gateway's HTTP API.
#[derive(Debug, Clone)]
pub struct GatewayClient {
    http: HttpBackend,
    base_url: String,
}

impl GatewayClient {
    pub fn new(config: GatewayConfig) -> GatewayResult<Self> {
        let client = build_http_client(&config)?;
        let base_url = config.url.trim_end_matches('/').to_string();

        url::Url::parse(&base_url).map_err(|e| GatewayError::Config {
            message: format!("invalid gateway URL {:?}: {}", base_url, e),
        })?;

        Ok(Self {
            http: HttpBackend { client, config },
            base_url,
        })
    }

    /// Post a blinded assertion for a bounty. Attempted once, never retried.
    pub async fn post_assertion(
        &self,
        guid: Uuid,
        assertion: &AssertionRequest,
    ) -> GatewayResult<AssertionReceipt> {
        let url = self.account_url(&format!("bounties/{}/assertions", guid))?;
        debug!(url = %url, verdicts = assertion.verdicts.len(), "posting assertion");

        let body = serde_json::to_value(assertion).map_err(|e| GatewayError::InvalidResponse {
            message: format!("failed to encode assertion: {}", e),
        })?;
        let response = self
            .http
            .request_once(reqwest::Method::POST, &url, Some(&body))
            .await?;

        let text = response.text().await.map_err(|e| GatewayError::Network {
            message: format!("failed to read assertion response: {}", e),
        })?;

        unwrap_envelope(&text, "assertion response")
    }

    /// Reveal a previously posted assertion. Attempted once, never retried.
    pub async fn post_reveal(
        &self,
        guid: Uuid,
        index: &str,
        reveal: &RevealRequest,
    ) -> GatewayResult<()> {
        let url = self.account_url(&format!("bounties/{}/assertions/{}/reveal", guid, index))?;
        debug!(url = %url, "posting reveal");

        let body = serde_json::to_value(reveal).map_err(|e| GatewayError::InvalidResponse {
            message: format!("failed to encode reveal: {}", e),
        })?;
        let response = self
            .http
            .request_once(reqwest::Method::POST, &url, Some(&body))
            .await?;

        let text = response.text().await.unwrap_or_default();
        debug!(body = %text, "reveal accepted");
        Ok(())
    }

    /// List bounties still open for assertions.
    pub async fn pending_bounties(&self) -> GatewayResult<Vec<PendingBounty>> {
        let url = format!("{}/bounties/pending", self.base_url);
        debug!(url = %url, "listing pending bounties");

        let response = self.http.request(reqwest::Method::GET, &url).await?;
        let text = response.text().await.map_err(|e| GatewayError::Network {
            message: format!("failed to read pending bounties: {}", e),
        })?;

        unwrap_envelope(&text, "pending bounties")
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn config(&self) -> &GatewayConfig {
        &self.http.config
    }

    fn account_url(&self, path: &str) -> GatewayResult<String> {
        let raw = format!("{}/{}", self.base_url, path);
        match &self.http.config.account {
            Some(account) => url::Url::parse_with_params(&raw, &[("account", account)])
                .map(String::from)
                .map_err(|e| GatewayError::Config {
                    message: format!("invalid gateway URL {:?}: {}", raw, e),
                }),
            None => Ok(raw),
        }
    }
}
