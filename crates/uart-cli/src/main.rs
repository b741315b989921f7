//! Command-line interface for streaming telemetry from BLE UART microcontrollers.
//!
//! # Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `stream` | Connect to a board and print each record until Ctrl-C |
//! | `scan` | List nearby BLE devices |
//! | `config` | Show, locate, or initialize the config file |
//!
//! # Configuration
//!
//! Settings are read from `<config dir>/uart-ble/config.toml`, or from the
//! path given by `--config` / `UART_BLE_CONFIG`. Command-line flags override
//! values from the file.

mod cli;
mod commands;
mod config;
mod format;

use std::io;

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use crate::cli::{Cli, Commands};
use crate::commands::{cmd_config, cmd_scan, cmd_stream};
use crate::config::Config;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.quiet {
        EnvFilter::new("warn")
    } else if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    // Records go to stdout; keep logs off it.
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();

    let config = Config::load(cli.config.as_deref());

    match &cli.command {
        Commands::Stream(args) => cmd_stream(args, &config, cli.quiet).await,
        Commands::Scan { timeout, format } => cmd_scan(*timeout, *format, &config).await,
        Commands::Config { action } => cmd_config(action, &config, cli.config.as_deref()),
    }
}
