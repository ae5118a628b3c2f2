//! Scan engine seam.
//!
//! The aggregator only sees [`ScanEngine`]; [`ClamdEngine`] speaks the clamd
//! daemon protocol.

use async_trait::async_trait;
use microengine_gateway::ArtifactBody;
use serde::{Deserialize, Serialize};

mod clamd;

pub use clamd::{ClamdEngine, INSTREAM_CHUNK_SIZE};

/// Verdict for one chunk/file the engine decomposed an artifact into.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanVerdict {
    pub is_match: bool,
    /// Signature name for a match, empty otherwise.
    pub description: String,
}

impl ScanVerdict {
    pub fn clean() -> Self {
        Self {
            is_match: false,
            description: String::new(),
        }
    }

    pub fn found(description: impl Into<String>) -> Self {
        Self {
            is_match: true,
            description: description.into(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("engine I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Daemon answered with an error line (size limit, unreadable stream, ...).
    #[error("engine reported error: {message}")]
    Daemon { message: String },

    #[error("unexpected engine reply: {reply:?}")]
    Protocol { reply: String },
}

/// A streaming malware scanner.
#[async_trait]
pub trait ScanEngine: Send + Sync {
    /// Health check used for readiness probing.
    async fn ping(&self) -> Result<(), EngineError>;

    /// Scan a byte stream. The returned sequence is finite and non-empty on success.
    async fn scan(&self, body: ArtifactBody) -> Result<Vec<ScanVerdict>, EngineError>;
}
