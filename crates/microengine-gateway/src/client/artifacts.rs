//! Artifact store client: stat precheck and streaming download.

use bytes::Bytes;
use futures::stream::{BoxStream, StreamExt, TryStreamExt};
use tracing::debug;

use crate::error::{GatewayError, GatewayResult};
use crate::types::{ArtifactStat, GatewayConfig};

use super::build_http_client;
use super::helpers::{unwrap_envelope, validate_artifact_uri};
use super::http::HttpBackend;

/// Streamed artifact body. Never buffered in full.
pub type ArtifactBody = BoxStream<'static, std::io::Result<Bytes>>;

/// Client for the content-addressed artifact store.
#[derive(Debug, Clone)]
pub struct ArtifactClient {
    http: HttpBackend,
    base_url: String,
}

impl ArtifactClient {
    pub fn new(config: GatewayConfig) -> GatewayResult<Self> {
        let client = build_http_client(&config)?;
        let base_url = config.artifact_base().trim_end_matches('/').to_string();

        Ok(Self {
            http: HttpBackend { client, config },
            base_url,
        })
    }

    /// Fetch size metadata for member `index` of an artifact collection.
    pub async fn stat(&self, uri: &str, index: usize) -> GatewayResult<ArtifactStat> {
        validate_artifact_uri(uri)?;
        let url = format!("{}/stat", self.artifact_url(uri, index));
        debug!(url = %url, "fetching artifact stat");

        let response = self
            .http
            .request_once(reqwest::Method::GET, &url, None)
            .await?;
        let text = response.text().await.map_err(|e| GatewayError::Network {
            message: format!("failed to read artifact stat: {}", e),
        })?;

        unwrap_envelope(&text, "artifact stat")
    }

    /// Open a byte stream for member `index` of an artifact collection.
    pub async fn fetch(&self, uri: &str, index: usize) -> GatewayResult<ArtifactBody> {
        validate_artifact_uri(uri)?;
        let url = self.artifact_url(uri, index);
        debug!(url = %url, "fetching artifact");

        let response = self
            .http
            .request_once(reqwest::Method::GET, &url, None)
            .await?;

        Ok(response
            .bytes_stream()
            .map_err(std::io::Error::other)
            .boxed())
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn artifact_url(&self, uri: &str, index: usize) -> String {
        format!("{}/artifacts/{}/{}", self.base_url, uri, index)
    }
}
