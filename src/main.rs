//! flingdeck - apps and media on your cast devices
//!
//! # Usage
//!
//! ```bash
//! flingdeck list --rows 10
//! flingdeck list --kind media --json
//! flingdeck select 0 --action launch --device "Living Room TV"
//! flingdeck watch --interval 5
//! ```
//!
//! Logging goes to stderr and is controlled with `FLINGDECK_LOG`
//! (e.g. `FLINGDECK_LOG=flingdeck=debug`).

mod cli;
mod commands;

use clap::Parser;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use flingdeck::config::Config;

use crate::cli::{Cli, Command, ExitCode, Output};
use crate::commands::Settings;

const LOG_ENV: &str = "FLINGDECK_LOG";

fn init_tracing(quiet: bool) {
    let default = if quiet { LevelFilter::ERROR } else { LevelFilter::WARN };
    let _ = tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(
            EnvFilter::builder()
                .with_default_directive(default.into())
                .with_env_var(LOG_ENV)
                .from_env_lossy(),
        )
        .try_init();
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_tracing(cli.quiet);

    let exit_code = run_cli(cli).await;
    std::process::exit(exit_code.into());
}

/// Resolve settings and run the command
async fn run_cli(cli: Cli) -> ExitCode {
    let output = Output::new(&cli);

    let config = match &cli.config {
        Some(path) => Config::load_from(path),
        None => Config::load(),
    };
    let settings = Settings {
        catalog_url: cli.catalog.clone().unwrap_or_else(|| config.catalog_url()),
        device: cli.device.clone().or_else(|| config.default_device.clone()),
        config,
    };
    tracing::debug!(catalog = %settings.catalog_url, "settings resolved");

    match cli.command {
        Command::List(cmd) => commands::list_cmd(cmd, &settings, &output).await,
        Command::Devices(cmd) => commands::devices_cmd(cmd, &settings, &output).await,
        Command::Select(cmd) => commands::select_cmd(cmd, &settings, &output).await,
        Command::Watch(cmd) => commands::watch_cmd(cmd, &settings, &output).await,
    }
}
