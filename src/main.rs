//! cache-dance - BuildKit cache mount transfer
//!
//! CLI entry point that dispatches to subcommands.

use cache_dance::cli::{Cli, Commands};
use cache_dance::config::{Config, ConfigManager};
use cache_dance::error::DanceResult;
use clap::Parser;
use console::style;
use std::error::Error;
use std::process::ExitCode;
use tracing::debug;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{} {}", style("Error:").red().bold(), e);
            let mut source = e.source();
            while let Some(cause) = source {
                debug!("Caused by: {}", cause);
                source = cause.source();
            }
            if let Some(hint) = e.hint() {
                eprintln!("{} {}", style("Hint:").yellow(), hint);
            }
            ExitCode::FAILURE
        }
    }
}

async fn run() -> DanceResult<()> {
    let cli = Cli::parse();

    // Load configuration
    let config_manager = if let Some(ref path) = cli.config {
        ConfigManager::with_path(path.clone())
    } else {
        ConfigManager::new()
    };
    let config = config_manager.load().await;

    // Logging needs the config, so it starts before load errors surface
    init_logging(cli.verbose, config.as_ref().ok());
    let config = config?;
    debug!("Using configuration from {}", config_manager.path().display());

    // Dispatch to command
    match cli.command {
        Commands::Inject(args) => cache_dance::cli::commands::inject(args, &config).await,
        Commands::Extract(args) => cache_dance::cli::commands::extract(args, &config).await,
        Commands::Config(args) => {
            cache_dance::cli::commands::config(args, &config, &config_manager).await
        }
    }
}

/// info by default, debug with -v or `general.verbose`; RUST_LOG wins
fn init_logging(verbose: u8, config: Option<&Config>) {
    let debug = verbose > 0 || config.is_some_and(|c| c.general.verbose);
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(if debug {
            "cache_dance=debug"
        } else {
            "cache_dance=info"
        })
    });

    let json = config.is_some_and(|c| c.general.log_format == "json");
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.with_target(false).without_time().init();
    }
}
