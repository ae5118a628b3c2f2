//! Artifact source seam between the aggregator and the artifact store.

use async_trait::async_trait;
use microengine_gateway::{ArtifactBody, ArtifactClient, ArtifactStat, GatewayResult};

/// Content-addressed store holding the members of a bounty's artifact collection.
#[async_trait]
pub trait ArtifactSource: Send + Sync {
    /// Size metadata for member `index` of `uri`.
    async fn stat(&self, uri: &str, index: usize) -> GatewayResult<ArtifactStat>;

    /// Body of member `index` of `uri`, as a byte stream.
    async fn fetch(&self, uri: &str, index: usize) -> GatewayResult<ArtifactBody>;
}

#[async_trait]
impl ArtifactSource for ArtifactClient {
    async fn stat(&self, uri: &str, index: usize) -> GatewayResult<ArtifactStat> {
        ArtifactClient::stat(self, uri, index).await
    }

    async fn fetch(&self, uri: &str, index: usize) -> GatewayResult<ArtifactBody> {
        ArtifactClient::fetch(self, uri, index).await
    }
}
