use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, ValueEnum};
use microengine_core::MicroengineConfig;

#[derive(Parser, Debug)]
#[command(
    name = "microengine",
    version,
    about = "Commit-reveal bounty worker: scans bounty artifacts with clamd and asserts on the results"
)]
pub struct Cli {
    /// Log output format
    #[arg(long, env = "LOG_FORMAT", value_enum, default_value_t = LogFormat::Text)]
    pub log_format: LogFormat,

    /// Seconds to sleep before connecting to anything (overrides MICROENGINE_STARTUP_DELAY)
    #[arg(long)]
    pub startup_delay: Option<u64>,

    /// Do not replay pending bounties on startup
    #[arg(long)]
    pub no_backfill: bool,

    /// Private key file (overrides MICROENGINE_KEYFILE)
    #[arg(long)]
    pub keyfile: Option<PathBuf>,

    /// Gateway host (overrides POLYSWARMD_HOST)
    #[arg(long)]
    pub polyswarmd_host: Option<String>,

    /// clamd address (overrides CLAMD_HOST)
    #[arg(long)]
    pub clamd_host: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    Text,
    Json,
}

impl Cli {
    /// Layer command-line overrides on top of the environment config.
    pub fn apply(&self, mut config: MicroengineConfig) -> MicroengineConfig {
        if let Some(secs) = self.startup_delay {
            config = config.with_startup_delay(Duration::from_secs(secs));
        }
        if let Some(keyfile) = &self.keyfile {
            config = config.with_keyfile(keyfile.clone());
        }
        if let Some(host) = &self.polyswarmd_host {
            config = config.with_gateway_url(host);
        }
        if let Some(addr) = &self.clamd_host {
            config = config.with_clamd_addr(addr.clone());
        }
        config.with_backfill(!self.no_backfill)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_leave_config_alone() {
        let cli = Cli::try_parse_from(["microengine"]).unwrap();
        let config = cli.apply(MicroengineConfig::default());
        assert!(config.backfill);
        assert_eq!(config.clamd_addr, "localhost:3310");
        assert!(config.startup_delay.is_zero());
    }

    #[test]
    fn test_overrides() {
        let cli = Cli::try_parse_from([
            "microengine",
            "--log-format",
            "json",
            "--startup-delay",
            "30",
            "--no-backfill",
            "--polyswarmd-host",
            "polyswarmd:31337",
            "--clamd-host",
            "clamav:3310",
        ])
        .unwrap();
        assert_eq!(cli.log_format, LogFormat::Json);

        let config = cli.apply(MicroengineConfig::default());
        assert_eq!(config.startup_delay, Duration::from_secs(30));
        assert!(!config.backfill);
        assert_eq!(config.gateway.url, "http://polyswarmd:31337");
        assert_eq!(config.clamd_addr, "clamav:3310");
    }

    #[test]
    fn test_rejects_unknown_log_format() {
        assert!(Cli::try_parse_from(["microengine", "--log-format", "xml"]).is_err());
    }
}
