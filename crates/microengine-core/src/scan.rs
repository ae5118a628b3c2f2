//! Bounty scan aggregation.
//!
//! A bounty's artifact collection is enumerated by index until the store
//! runs out of members (or one is unusable). Every member that can be
//! fetched and scanned contributes its per-chunk verdicts, in order.

use async_trait::async_trait;
use microengine_gateway::{validate_artifact_uri, GatewayError};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::artifact::ArtifactSource;
use crate::engine::ScanEngine;

/// Default cap on collection members scanned per bounty.
pub const DEFAULT_MAX_ARTIFACTS: usize = 256;

/// Default cap on a single member's size (50 MiB).
pub const DEFAULT_MAX_ARTIFACT_SIZE: u64 = 50 * 1024 * 1024;

/// Folded result of scanning a bounty.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanReport {
    /// One entry per chunk verdict, across all scanned members.
    pub verdicts: Vec<bool>,
    /// Concatenated `description;` per chunk verdict.
    pub metadata: String,
}

impl ScanReport {
    /// Nothing was scored; the bounty should not be committed to.
    pub fn is_empty(&self) -> bool {
        self.verdicts.is_empty()
    }

    fn push(&mut self, is_match: bool, description: &str) {
        self.verdicts.push(is_match);
        self.metadata.push_str(description);
        self.metadata.push(';');
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ScanError {
    #[error("invalid artifact uri {uri:?}: {reason}")]
    InvalidUri { uri: String, reason: String },
}

/// Produces a [`ScanReport`] for a bounty's artifact collection.
#[async_trait]
pub trait BountyScanner: Send + Sync {
    async fn scan(&self, artifact_uri: &str) -> Result<ScanReport, ScanError>;
}

/// Enumerates an artifact collection and scans each member with a [`ScanEngine`].
#[derive(Debug, Clone)]
pub struct ScanAggregator<A, E> {
    source: A,
    engine: E,
    max_artifacts: usize,
    max_artifact_size: u64,
}

impl<A, E> ScanAggregator<A, E>
where
    A: ArtifactSource,
    E: ScanEngine,
{
    pub fn new(source: A, engine: E) -> Self {
        Self {
            source,
            engine,
            max_artifacts: DEFAULT_MAX_ARTIFACTS,
            max_artifact_size: DEFAULT_MAX_ARTIFACT_SIZE,
        }
    }

    pub fn with_max_artifacts(mut self, max_artifacts: usize) -> Self {
        self.max_artifacts = max_artifacts;
        self
    }

    pub fn with_max_artifact_size(mut self, max_artifact_size: u64) -> Self {
        self.max_artifact_size = max_artifact_size;
        self
    }

    pub fn engine(&self) -> &E {
        &self.engine
    }

    pub fn source(&self) -> &A {
        &self.source
    }
}

#[async_trait]
impl<A, E> BountyScanner for ScanAggregator<A, E>
where
    A: ArtifactSource,
    E: ScanEngine,
{
    async fn scan(&self, artifact_uri: &str) -> Result<ScanReport, ScanError> {
        validate_artifact_uri(artifact_uri).map_err(|e| match e {
            GatewayError::InvalidArtifact { uri, reason } => ScanError::InvalidUri { uri, reason },
            other => ScanError::InvalidUri {
                uri: artifact_uri.to_string(),
                reason: other.to_string(),
            },
        })?;

        let mut report = ScanReport::default();

        for index in 0..self.max_artifacts {
            let stat = match self.source.stat(artifact_uri, index).await {
                Ok(stat) => stat,
                Err(GatewayError::NotFound { .. }) => {
                    debug!(uri = artifact_uri, index, "end of artifact collection");
                    break;
                }
                Err(e) => {
                    warn!(uri = artifact_uri, index, error = %e, "artifact stat failed");
                    break;
                }
            };

            if !stat.is_acceptable(self.max_artifact_size) {
                warn!(
                    uri = artifact_uri,
                    index,
                    data_size = stat.data_size,
                    max = self.max_artifact_size,
                    "artifact rejected by size precheck"
                );
                break;
            }

            let body = match self.source.fetch(artifact_uri, index).await {
                Ok(body) => body,
                Err(e) if index == 0 => {
                    warn!(uri = artifact_uri, error = %e, "first artifact unavailable, dropping bounty");
                    return Ok(ScanReport::default());
                }
                Err(e) => {
                    warn!(uri = artifact_uri, index, error = %e, "artifact fetch failed, skipping");
                    continue;
                }
            };

            let verdicts = match self.engine.scan(body).await {
                Ok(verdicts) => verdicts,
                Err(e) => {
                    warn!(uri = artifact_uri, index, error = %e, "artifact scan failed, skipping");
                    continue;
                }
            };

            let mut any_match = false;
            for verdict in &verdicts {
                any_match |= verdict.is_match;
                report.push(verdict.is_match, &verdict.description);
            }
            info!(uri = artifact_uri, index, verdict = any_match, "scanned artifact");
        }

        Ok(report)
    }
}
