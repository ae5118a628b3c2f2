//! Top-level worker errors. Everything here is fatal.

use microengine_gateway::GatewayError;

use crate::signer::SignerError;
use crate::stream::StreamError;
use crate::wait::WaitError;

/// Process exit codes.
pub mod exit_codes {
    pub const SUCCESS: i32 = 0;
    pub const CONFIG_ERROR: i32 = 2; // Bad configuration or key material
    pub const UNAVAILABLE: i32 = 3; // Collaborator not reachable within the timeout
    pub const STREAM_LOST: i32 = 4; // Event feed could not be re-established
}

#[derive(Debug, thiserror::Error)]
pub enum MicroengineError {
    #[error("configuration error: {message}")]
    Config { message: String },

    #[error("key material unusable: {0}")]
    Key(#[from] SignerError),

    #[error("gateway client error: {0}")]
    Gateway(#[from] GatewayError),

    #[error("collaborator unavailable: {0}")]
    Unavailable(#[from] WaitError),

    #[error("event stream lost: {0}")]
    Stream(#[from] StreamError),

    #[error("{task} task ended unexpectedly: {message}")]
    TaskFailed { task: &'static str, message: String },
}

impl MicroengineError {
    pub fn exit_code(&self) -> i32 {
        match self {
            MicroengineError::Config { .. } | MicroengineError::Key(_) => exit_codes::CONFIG_ERROR,
            MicroengineError::Gateway(GatewayError::Config { .. }) => exit_codes::CONFIG_ERROR,
            MicroengineError::Gateway(_) | MicroengineError::Unavailable(_) => {
                exit_codes::UNAVAILABLE
            }
            MicroengineError::Stream(_) | MicroengineError::TaskFailed { .. } => {
                exit_codes::STREAM_LOST
            }
        }
    }
}

pub type MicroengineResult<T> = Result<T, MicroengineError>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_exit_codes() {
        let config = MicroengineError::Config {
            message: "poll interval must be non-zero".into(),
        };
        assert_eq!(config.exit_code(), exit_codes::CONFIG_ERROR);

        let key = MicroengineError::from(SignerError::InvalidKey {
            message: "short".into(),
        });
        assert_eq!(key.exit_code(), exit_codes::CONFIG_ERROR);

        let bad_url = MicroengineError::from(GatewayError::Config {
            message: "invalid gateway URL".into(),
        });
        assert_eq!(bad_url.exit_code(), exit_codes::CONFIG_ERROR);

        let timed_out = WaitError::TimedOut {
            name: "clamd".into(),
            elapsed: Duration::from_secs(3000),
            last_error: "connection refused".into(),
        };
        assert_eq!(
            MicroengineError::from(timed_out).exit_code(),
            exit_codes::UNAVAILABLE
        );

        let lost = StreamError::Unavailable {
            url: "ws://localhost:31337/events/home".into(),
            source: WaitError::TimedOut {
                name: "events".into(),
                elapsed: Duration::from_secs(1),
                last_error: "refused".into(),
            },
        };
        assert_eq!(MicroengineError::from(lost).exit_code(), exit_codes::STREAM_LOST);
    }
}
