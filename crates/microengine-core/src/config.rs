//! Worker configuration.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use microengine_gateway::{normalize_base_url, GatewayConfig};

use crate::error::{MicroengineError, MicroengineResult};
use crate::scan::{DEFAULT_MAX_ARTIFACTS, DEFAULT_MAX_ARTIFACT_SIZE};
use crate::scheduler::{DEFAULT_BID, DEFAULT_VOTING_WINDOW};
use crate::signer::KeyPassword;
use crate::wait::ReadyPolicy;

/// Everything the worker needs to start.
#[derive(Debug, Clone)]
pub struct MicroengineConfig {
    /// Gateway and artifact store endpoints.
    pub gateway: GatewayConfig,

    /// clamd `host:port`.
    pub clamd_addr: String,

    /// V3 JSON keystore, or a hex-encoded secp256k1 private key.
    pub keyfile: PathBuf,

    /// Password for a keystore `keyfile`; ignored for hex keys.
    pub keyfile_password: KeyPassword,

    /// Bid per assertion, in wei.
    pub bid: u128,

    pub max_artifact_size: u64,
    pub max_artifacts: usize,

    /// Arbiter voting window, in blocks.
    pub voting_window: u64,

    /// How long to wait for a collaborator before giving up.
    pub connect_timeout: Duration,
    pub poll_interval: Duration,

    /// Sleep before touching any collaborator.
    pub startup_delay: Duration,

    /// Replay `GET /bounties/pending` before following live events.
    pub backfill: bool,
}

impl Default for MicroengineConfig {
    fn default() -> Self {
        Self {
            gateway: GatewayConfig::default(),
            clamd_addr: "localhost:3310".to_string(),
            keyfile: PathBuf::from("keyfile"),
            keyfile_password: KeyPassword::default(),
            bid: DEFAULT_BID,
            max_artifact_size: DEFAULT_MAX_ARTIFACT_SIZE,
            max_artifacts: DEFAULT_MAX_ARTIFACTS,
            voting_window: DEFAULT_VOTING_WINDOW,
            connect_timeout: Duration::from_secs(3000),
            poll_interval: Duration::from_secs(1),
            startup_delay: Duration::ZERO,
            backfill: true,
        }
    }
}

impl MicroengineConfig {
    /// Create config from environment variables.
    ///
    /// | Variable | Default |
    /// |----------|---------|
    /// | `CLAMD_HOST` | `localhost:3310` |
    /// | `MICROENGINE_KEYFILE` | `keyfile` |
    /// | `MICROENGINE_KEYFILE_PASSWORD` | `password` |
    /// | `MICROENGINE_BID` | `62500000000000000` |
    /// | `MICROENGINE_MAX_ARTIFACT_SIZE` | `52428800` |
    /// | `MICROENGINE_MAX_ARTIFACTS` | `256` |
    /// | `MICROENGINE_VOTING_WINDOW` | `25` |
    /// | `MICROENGINE_CONNECT_TIMEOUT` | `3000` (seconds) |
    /// | `MICROENGINE_POLL_INTERVAL` | `1` (seconds) |
    /// | `MICROENGINE_STARTUP_DELAY` | `0` (seconds) |
    ///
    /// Gateway variables are read by [`GatewayConfig::from_env`].
    pub fn from_env() -> Self {
        Self::from_vars(GatewayConfig::from_env(), |name| std::env::var(name).ok())
    }

    /// Build from an arbitrary variable lookup. Unparseable values fall back to defaults.
    pub fn from_vars<F>(gateway: GatewayConfig, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let get = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());
        let parse = |name: &str| get(name).and_then(|v| parse_trimmed(&v));
        let secs = |name: &str, default: Duration| {
            parse(name).map(Duration::from_secs).unwrap_or(default)
        };

        Self {
            gateway,
            clamd_addr: get("CLAMD_HOST").unwrap_or(defaults.clamd_addr),
            keyfile: get("MICROENGINE_KEYFILE")
                .map(PathBuf::from)
                .unwrap_or(defaults.keyfile),
            keyfile_password: lookup("MICROENGINE_KEYFILE_PASSWORD")
                .map(KeyPassword::new)
                .unwrap_or(defaults.keyfile_password),
            bid: get("MICROENGINE_BID")
                .and_then(|v| parse_trimmed(&v))
                .unwrap_or(defaults.bid),
            max_artifact_size: parse("MICROENGINE_MAX_ARTIFACT_SIZE")
                .unwrap_or(defaults.max_artifact_size),
            max_artifacts: get("MICROENGINE_MAX_ARTIFACTS")
                .and_then(|v| parse_trimmed(&v))
                .unwrap_or(defaults.max_artifacts),
            voting_window: parse("MICROENGINE_VOTING_WINDOW").unwrap_or(defaults.voting_window),
            connect_timeout: secs("MICROENGINE_CONNECT_TIMEOUT", defaults.connect_timeout),
            poll_interval: secs("MICROENGINE_POLL_INTERVAL", defaults.poll_interval),
            startup_delay: secs("MICROENGINE_STARTUP_DELAY", defaults.startup_delay),
            backfill: defaults.backfill,
        }
    }

    pub fn with_gateway_url(mut self, host: &str) -> Self {
        self.gateway.url = normalize_base_url(host);
        self
    }

    pub fn with_clamd_addr(mut self, addr: impl Into<String>) -> Self {
        self.clamd_addr = addr.into();
        self
    }

    pub fn with_keyfile(mut self, keyfile: impl Into<PathBuf>) -> Self {
        self.keyfile = keyfile.into();
        self
    }

    pub fn with_keyfile_password(mut self, password: KeyPassword) -> Self {
        self.keyfile_password = password;
        self
    }

    pub fn with_startup_delay(mut self, delay: Duration) -> Self {
        self.startup_delay = delay;
        self
    }

    pub fn with_backfill(mut self, backfill: bool) -> Self {
        self.backfill = backfill;
        self
    }

    pub fn with_ready_policy(mut self, policy: ReadyPolicy) -> Self {
        self.poll_interval = policy.poll_interval;
        self.connect_timeout = policy.timeout;
        self
    }

    /// Readiness policy shared by every collaborator probe.
    pub fn ready_policy(&self) -> ReadyPolicy {
        ReadyPolicy::new(self.poll_interval, self.connect_timeout)
    }

    /// Reject settings the worker cannot run with.
    pub fn validate(&self) -> MicroengineResult<()> {
        let invalid = |message: String| Err(MicroengineError::Config { message });

        if self.clamd_addr.trim().is_empty() {
            return invalid("clamd address is empty".into());
        }
        if self.poll_interval.is_zero() {
            return invalid("poll interval must be non-zero".into());
        }
        if self.poll_interval > self.connect_timeout {
            return invalid(format!(
                "poll interval {:?} exceeds connect timeout {:?}",
                self.poll_interval, self.connect_timeout
            ));
        }
        if self.max_artifacts == 0 {
            return invalid("max artifacts must be at least 1".into());
        }
        Ok(())
    }
}

fn parse_trimmed<T: FromStr>(raw: &str) -> Option<T> {
    raw.trim().parse().ok()
}
