use anyhow::Context;
use clap::Parser;
use microengine_core::{exit_codes, Microengine, MicroengineConfig, MicroengineError};

mod args;
mod logging;

use args::Cli;

#[tokio::main(flavor = "multi_thread")]
async fn main() {
    let cli = Cli::parse();
    logging::init(cli.log_format);

    let code = match run(cli).await {
        Ok(()) => exit_codes::SUCCESS,
        Err(e) => {
            tracing::error!("fatal: {e:#}");
            e.downcast_ref::<MicroengineError>()
                .map(MicroengineError::exit_code)
                .unwrap_or(exit_codes::CONFIG_ERROR)
        }
    };
    std::process::exit(code);
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let config = cli.apply(MicroengineConfig::from_env());
    tracing::debug!(?config, "resolved configuration");

    Microengine::new(config)
        .run()
        .await
        .context("microengine stopped")
}
