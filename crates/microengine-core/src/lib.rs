//! Commit-reveal bounty worker.
//!
//! The worker follows a bounty gateway's event feed, scans each bounty's
//! artifacts with a malware engine, commits a blinded assertion before the
//! bounty expires, and reveals it once the arbiter voting window has passed.
//! Transactions the gateway needs signed are handled by an isolated signer
//! task that owns the key.
//!
//! # Layout
//!
//! - [`engine`]: the [`ScanEngine`] seam and the clamd client
//! - [`scan`]: enumerates a bounty's artifacts and folds verdicts
//! - [`scheduler`]: owns outstanding commitments and decides when to reveal
//! - [`events`] / [`stream`]: gateway event decoding and websocket plumbing
//! - [`signer`]: EIP-155 transaction signer actor
//! - [`wait`]: poll-until-ready primitive shared by every collaborator
//! - [`runner`]: wires it all together
//!
//! # Example
//!
//! ```no_run
//! use microengine_core::{Microengine, MicroengineConfig};
//!
//! # async fn example() -> Result<(), microengine_core::MicroengineError> {
//! let config = MicroengineConfig::from_env().with_keyfile("/run/secrets/keyfile");
//! Microengine::new(config).run().await
//! # }
//! ```

pub mod artifact;
pub mod config;
pub mod engine;
pub mod error;
pub mod events;
pub mod runner;
pub mod scan;
pub mod scheduler;
pub mod signer;
pub mod stream;
pub mod wait;

pub use artifact::ArtifactSource;
pub use config::MicroengineConfig;
pub use engine::{ClamdEngine, EngineError, ScanEngine, ScanVerdict};
pub use error::{exit_codes, MicroengineError, MicroengineResult};
pub use events::{BlockEvent, BountyEvent, Event};
pub use runner::{backfill, follow, Microengine};
pub use scan::{BountyScanner, ScanAggregator, ScanError, ScanReport};
pub use scheduler::{BountyMarket, BountyOutcome, Commitment, Scheduler};
pub use signer::{
    load_key, KeyPassword, SignTxRequest, SignTxResponse, SignerError, SignerHandle,
    TransactionSigner, TxData,
};
pub use stream::{EventSource, EventStream, StreamError, TransactionBridge};
pub use wait::{until_ready, ReadyPolicy, WaitError};
