//! HTTP client for the bounty gateway and the content-addressed artifact store.
//!
//! This crate provides:
//!
//! - Typed calls for posting assertions and reveals and listing pending bounties
//! - Artifact stat precheck and streaming artifact download
//! - A single status-mapping layer shared by both clients
//!
//! # Quick Start
//!
//! ```no_run
//! use microengine_gateway::{AssertionRequest, GatewayClient, GatewayConfig};
//!
//! # async fn example() -> Result<(), microengine_gateway::GatewayError> {
//! let config = GatewayConfig::from_env().with_account("0x00000000000000000000000000000000000000aa");
//! let client = GatewayClient::new(config)?;
//!
//! let guid = uuid::Uuid::new_v4();
//! let assertion = AssertionRequest::answering_all(vec![false, true], 62_500_000_000_000_000);
//! let receipt = client.post_assertion(guid, &assertion).await?;
//! println!("assertion {} bound to nonce {}", receipt.index, receipt.nonce);
//! # Ok(())
//! # }
//! ```
//!
//! # Configuration
//!
//! | Environment Variable | Description |
//! |---------------------|-------------|
//! | `POLYSWARMD_HOST` | Gateway host (default: `localhost:31337`) |
//! | `ARTIFACT_HOST` | Artifact store host (default: the gateway) |
//! | `MICROENGINE_HTTP_TIMEOUT` | Request timeout in seconds (default: 10) |
//! | `MICROENGINE_MAX_RETRIES` | Retries for idempotent reads (default: 3) |

pub mod client;
pub mod error;
pub mod types;

pub use client::{
    validate_artifact_uri, ArtifactBody, ArtifactClient, GatewayClient, MAX_ARTIFACT_URI_LEN,
};
pub use error::{GatewayError, GatewayResult};
pub use types::{
    deserialize_block_height, normalize_base_url, parse_block_height, ArtifactStat,
    AssertionReceipt, AssertionRequest, Envelope, GatewayConfig, PendingBounty, RevealRequest,
};

/// User-Agent sent with every request.
pub const GATEWAY_USER_AGENT: &str = client::USER_AGENT_VALUE;
