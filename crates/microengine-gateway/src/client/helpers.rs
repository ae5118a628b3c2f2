//! Pure helpers: identifier validation, URL building, envelope unwrapping (no HTTP).

use serde::de::DeserializeOwned;

use crate::error::{GatewayError, GatewayResult};
use crate::types::Envelope;

/// Artifact identifiers longer than this are rejected before any request.
pub const MAX_ARTIFACT_URI_LEN: usize = 100;

/// Check that an artifact identifier is a plausible base58 content address.
pub fn validate_artifact_uri(uri: &str) -> GatewayResult<()> {
    if uri.is_empty() {
        return Err(GatewayError::InvalidArtifact {
            uri: uri.to_string(),
            reason: "empty identifier".to_string(),
        });
    }

    if uri.len() >= MAX_ARTIFACT_URI_LEN {
        return Err(GatewayError::InvalidArtifact {
            uri: uri.chars().take(32).collect::<String>() + "...",
            reason: format!("identifier longer than {} bytes", MAX_ARTIFACT_URI_LEN - 1),
        });
    }

    bs58::decode(uri)
        .into_vec()
        .map_err(|e| GatewayError::InvalidArtifact {
            uri: uri.to_string(),
            reason: format!("not base58: {}", e),
        })?;

    Ok(())
}

/// Path of the last two URL segments, for error messages.
pub(crate) fn resource_from_url(url: &str) -> String {
    let path = url.split('?').next().unwrap_or(url);
    let parts: Vec<&str> = path.trim_end_matches('/').rsplitn(3, '/').collect();
    match parts.as_slice() {
        [last, prev, _] => format!("{}/{}", prev, last),
        [last, ..] => last.to_string(),
        [] => "unknown".to_string(),
    }
}

/// Decode a `{"status", "result"}` envelope and return its payload.
pub(crate) fn unwrap_envelope<T: DeserializeOwned>(body: &str, what: &str) -> GatewayResult<T> {
    let envelope: Envelope<T> =
        serde_json::from_str(body).map_err(|e| GatewayError::InvalidResponse {
            message: format!("failed to parse {}: {}", what, e),
        })?;

    if !envelope.is_ok() {
        return Err(GatewayError::InvalidResponse {
            message: format!("{} returned status {:?}", what, envelope.status),
        });
    }

    Ok(envelope.result)
}
