//! `argus` binary
//!
//! ```text
//! argus --config argus.json [--strategy maker]
//! ```
//!
//! Exits non-zero on bad configuration or when a feed listener exhausts its
//! reconnect attempts; ctrl-c stops cleanly.

use std::path::PathBuf;
use std::process::ExitCode;

use argus_runner::{Runtime, StrategyKind, load_config};
use clap::Parser;
use log::{error, info};

#[derive(Parser, Debug)]
#[command(author, version, about = "Crypto derivatives order execution and market state coordination")]
struct Args {
    /// JSON configuration file
    #[arg(short, long)]
    config: PathBuf,

    /// Override the configured strategy
    #[arg(short, long, value_enum)]
    strategy: Option<StrategyKind>,
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for ctrl-c: {}", e);
        std::future::pending::<()>().await;
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    info!("Loading configuration from: {}", args.config.display());

    let mut config = match load_config(&args.config) {
        Ok(config) => config,
        Err(e) => {
            error!("{}", e);
            return ExitCode::FAILURE;
        }
    };
    if let Some(kind) = args.strategy {
        info!("Strategy overridden: {} -> {}", config.strategy.kind, kind);
        config.strategy.kind = kind;
    }

    let runtime = match Runtime::bootstrap(&config).await {
        Ok(runtime) => runtime,
        Err(e) => {
            error!("Bootstrap failed: {}", e);
            return ExitCode::FAILURE;
        }
    };
    info!("Running {} on {}", runtime.engine_name(), config.symbol);

    match runtime.run(shutdown_signal()).await {
        Ok(stats) => {
            info!(
                "Finished after {} ticks: {} trades, {} recoveries",
                stats.ticks, stats.trades, stats.recoveries
            );
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("{}", e);
            ExitCode::FAILURE
        }
    }
}
