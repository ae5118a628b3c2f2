//! Wire types for the gateway and artifact-store protocol.

use serde::{Deserialize, Deserializer, Serialize};
use uuid::Uuid;

/// Standard response envelope: `{"status": "OK", "result": ...}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope<T> {
    /// `"OK"` on success, anything else is a gateway-side failure.
    pub status: String,

    /// Payload.
    pub result: T,
}

impl<T> Envelope<T> {
    pub fn is_ok(&self) -> bool {
        self.status.eq_ignore_ascii_case("ok")
    }
}

/// Stats of one artifact in the content-addressed store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactStat {
    /// Content hash of the member.
    #[serde(default)]
    pub hash: String,

    #[serde(default)]
    pub block_size: u64,

    #[serde(default)]
    pub cumulative_size: u64,

    /// Size of the payload in bytes.
    pub data_size: u64,

    /// Number of child links (non-zero for directories).
    #[serde(default)]
    pub num_links: i64,
}

impl ArtifactStat {
    /// An artifact is only worth downloading when it has a payload that fits under `max_size`.
    pub fn is_acceptable(&self, max_size: u64) -> bool {
        self.data_size != 0 && self.data_size <= max_size
    }
}

/// Body of `POST /bounties/{guid}/assertions`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssertionRequest {
    pub verdicts: Vec<bool>,
    pub mask: Vec<bool>,
    /// Bid in wei, as a decimal string.
    pub bid: String,
}

impl AssertionRequest {
    /// Build a request that answers every verdict position.
    pub fn answering_all(verdicts: Vec<bool>, bid: u128) -> Self {
        let mask = vec![true; verdicts.len()];
        Self {
            verdicts,
            mask,
            bid: bid.to_string(),
        }
    }
}

/// Result of a posted assertion: binds the later reveal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssertionReceipt {
    /// Assertion index within the bounty (decimal string).
    #[serde(deserialize_with = "deserialize_index")]
    pub index: String,

    /// Nonce the commitment was blinded with.
    pub nonce: String,
}

/// Body of `POST /bounties/{guid}/assertions/{index}/reveal`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RevealRequest {
    pub nonce: String,
    pub verdicts: Vec<bool>,
    pub metadata: String,
}

/// A bounty returned by `GET /bounties/pending`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingBounty {
    pub guid: Uuid,

    /// Artifact collection identifier.
    pub uri: String,

    /// Block height at which the assertion window closes.
    #[serde(deserialize_with = "deserialize_block_height")]
    pub expiration: u64,
}

/// Parse a block height the way the gateway emits it: a JSON integer, a
/// decimal string, or a `0x`-prefixed hex string.
pub fn parse_block_height(raw: &str) -> Option<u64> {
    let raw = raw.trim();
    if let Some(hex) = raw.strip_prefix("0x").or_else(|| raw.strip_prefix("0X")) {
        u64::from_str_radix(hex, 16).ok()
    } else {
        raw.parse().ok()
    }
}

/// Serde adapter for [`parse_block_height`].
pub fn deserialize_block_height<'de, D>(deserializer: D) -> Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    use serde::de::Error;

    match serde_json::Value::deserialize(deserializer)? {
        serde_json::Value::Number(n) => n
            .as_u64()
            .ok_or_else(|| D::Error::custom(format!("block height out of range: {}", n))),
        serde_json::Value::String(s) => parse_block_height(&s)
            .ok_or_else(|| D::Error::custom(format!("invalid block height: {:?}", s))),
        other => Err(D::Error::custom(format!(
            "expected block height, got {}",
            other
        ))),
    }
}

fn deserialize_index<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    use serde::de::Error;

    match serde_json::Value::deserialize(deserializer)? {
        serde_json::Value::Number(n) => {
            if let Some(i) = n.as_u64() {
                Ok(i.to_string())
            } else if let Some(f) = n.as_f64().filter(|f| *f >= 0.0 && f.fract() == 0.0) {
                Ok(format!("{}", f as u64))
            } else {
                Err(D::Error::custom(format!("invalid assertion index: {}", n)))
            }
        }
        serde_json::Value::String(s) if !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit()) => {
            Ok(s)
        }
        other => Err(D::Error::custom(format!(
            "expected assertion index, got {}",
            other
        ))),
    }
}

/// Gateway configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    /// Base URL of the bounty gateway (http or https).
    #[serde(default = "default_gateway_url")]
    pub url: String,

    /// Base URL of the artifact store. Defaults to the gateway.
    #[serde(default)]
    pub artifact_url: Option<String>,

    /// Account address sent as `?account=` on state-changing calls.
    #[serde(default)]
    pub account: Option<String>,

    /// Request timeout in seconds.
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,

    /// Maximum retries for idempotent reads.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
}

fn default_gateway_url() -> String {
    "http://localhost:31337".to_string()
}

fn default_timeout() -> u64 {
    10
}

fn default_max_retries() -> u32 {
    3
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            url: default_gateway_url(),
            artifact_url: None,
            account: None,
            timeout_secs: default_timeout(),
            max_retries: default_max_retries(),
        }
    }
}

impl GatewayConfig {
    /// Create config from environment variables.
    ///
    /// | Variable | Description |
    /// |----------|-------------|
    /// | `POLYSWARMD_HOST` | Gateway host (`host:port` or full URL) |
    /// | `ARTIFACT_HOST` | Artifact store host (defaults to the gateway) |
    /// | `MICROENGINE_HTTP_TIMEOUT` | Request timeout in seconds |
    /// | `MICROENGINE_MAX_RETRIES` | Retries for idempotent reads |
    pub fn from_env() -> Self {
        Self {
            url: std::env::var("POLYSWARMD_HOST")
                .ok()
                .filter(|v| !v.is_empty())
                .map(|v| normalize_base_url(&v))
                .unwrap_or_else(default_gateway_url),
            artifact_url: std::env::var("ARTIFACT_HOST")
                .ok()
                .filter(|v| !v.is_empty())
                .map(|v| normalize_base_url(&v)),
            account: None,
            timeout_secs: std::env::var("MICROENGINE_HTTP_TIMEOUT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or_else(default_timeout),
            max_retries: std::env::var("MICROENGINE_MAX_RETRIES")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or_else(default_max_retries),
        }
    }

    /// Set the gateway URL.
    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = url.into();
        self
    }

    /// Set the artifact store URL.
    pub fn with_artifact_url(mut self, url: impl Into<String>) -> Self {
        self.artifact_url = Some(url.into());
        self
    }

    /// Set the account address.
    pub fn with_account(mut self, account: impl Into<String>) -> Self {
        self.account = Some(account.into());
        self
    }

    /// Effective artifact store base URL.
    pub fn artifact_base(&self) -> &str {
        self.artifact_url.as_deref().unwrap_or(&self.url)
    }

    /// Websocket URL for a gateway path (`http` → `ws`, `https` → `wss`).
    pub fn websocket_url(&self, path: &str) -> String {
        let base = self.url.trim_end_matches('/');
        let base = if let Some(rest) = base.strip_prefix("https://") {
            format!("wss://{}", rest)
        } else if let Some(rest) = base.strip_prefix("http://") {
            format!("ws://{}", rest)
        } else {
            format!("ws://{}", base)
        };
        format!("{}/{}", base, path.trim_start_matches('/'))
    }
}

/// Accept a bare `host:port` as well as a full URL.
pub fn normalize_base_url(host: &str) -> String {
    let host = host.trim().trim_end_matches('/');
    if host.starts_with("http://") || host.starts_with("https://") {
        host.to_string()
    } else {
        format!("http://{}", host)
    }
}
