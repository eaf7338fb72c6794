use anyhow::Context;
use clap::Parser;
use simpleserver::{logger, Cli, ServerConfig};
use std::process::ExitCode;

fn main() -> ExitCode {
    let cli = Cli::parse();
    logger::init_cli_logger(cli.verbose);

    tracing::info!("simpleserver started");
    tracing::debug!("CLI config: {:?}", cli);

    match start(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("{:#}", e);
            ExitCode::FAILURE
        }
    }
}

fn start(cli: Cli) -> anyhow::Result<()> {
    let port = cli.port;
    let config = ServerConfig::from_cli(cli).context("invalid directory to serve")?;
    simpleserver::run(config).with_context(|| format!("server on port {} stopped", port))
}
