//! rrredir - round-robin TCP port redirector.
//!
//! Accepts TCP connections and forwards each one to the first reachable
//! target in an ordered list:
//! - Targets are tried in order for every connection, starting at the first
//! - Unreachable targets are skipped; other connect errors drop the client
//! - Bytes are relayed verbatim until either side closes or both go idle
//! - Connections are rejected, not queued, when workers cannot be admitted

use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{CommandFactory, Parser};
use tracing::info;

use rrredir::config::{Args, Config};
use rrredir::logging;
use rrredir::Listener;

#[tokio::main]
async fn main() -> ExitCode {
    let args = match Args::try_parse() {
        Ok(args) => args,
        Err(e) => {
            let _ = e.print();
            // --help and --version are not failures
            return if e.use_stderr() {
                ExitCode::FAILURE
            } else {
                ExitCode::SUCCESS
            };
        }
    };

    if let Err(e) = logging::init(&args.log_level, args.log_json) {
        eprintln!("error: {e:#}");
        return ExitCode::FAILURE;
    }

    match run(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e:#}");
            eprintln!("{}", Args::command().render_usage());
            ExitCode::FAILURE
        }
    }
}

async fn run(args: Args) -> Result<()> {
    let config = Config::from_args(&args).await?;

    info!("Starting rrredir");
    info!(
        listen_addr = %config.listen_addr,
        targets = config.targets.len(),
        connect_timeout = ?config.connect_timeout,
        max_connections = ?config.max_connections,
        "Configuration loaded"
    );
    for (index, target) in config.targets.iter().enumerate() {
        info!(index, target = %target, "Target");
    }

    let listener = Listener::bind(config.listener_config(), Arc::clone(&config.targets))
        .await
        .with_context(|| format!("failed to listen on {}", config.listen_addr))?;

    Arc::new(listener).run().await.context("listener stopped")
}
