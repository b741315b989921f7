//! CLI argument definitions using clap.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};
use serde::{Deserialize, Serialize};

use uart_types::Microcontroller;

/// Output format for commands
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

/// Board to stream from
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
#[value(rename_all = "UPPER")]
pub enum MicrocontrollerArg {
    Arduino,
    #[value(name = "CIRCUITPY")]
    CircuitPy,
}

impl From<MicrocontrollerArg> for Microcontroller {
    fn from(arg: MicrocontrollerArg) -> Self {
        match arg {
            MicrocontrollerArg::Arduino => Microcontroller::Arduino,
            MicrocontrollerArg::CircuitPy => Microcontroller::CircuitPy,
        }
    }
}

#[derive(Parser)]
#[command(name = "uart-ble")]
#[command(author, version, about = "Stream telemetry from BLE UART microcontrollers", long_about = None)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true, conflicts_with = "quiet")]
    pub verbose: bool,

    /// Suppress non-essential output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Use this config file instead of the default location
    #[arg(long, global = true, env = "UART_BLE_CONFIG")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Stream records from a microcontroller until Ctrl-C
    Stream(StreamArgs),

    /// Scan for nearby BLE devices
    Scan {
        /// Scan timeout in seconds
        #[arg(short, long)]
        timeout: Option<u64>,

        /// Output format
        #[arg(short, long, value_enum)]
        format: Option<OutputFormat>,
    },

    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Arguments for the stream command
#[derive(Debug, Clone, Args)]
pub struct StreamArgs {
    /// Microcontroller to connect to
    #[arg(short, long, value_enum, ignore_case = true)]
    pub microcontroller: MicrocontrollerArg,

    /// Scan timeout in seconds
    #[arg(short, long)]
    pub timeout: Option<u64>,

    /// Output format
    #[arg(short, long, value_enum)]
    pub format: Option<OutputFormat>,

    /// Stop after this many records (0 for unlimited)
    #[arg(short, long, default_value = "0")]
    pub count: u64,

    /// Reconnect up to this many times after the link drops
    #[arg(short, long)]
    pub reconnect: Option<u32>,
}

/// Configuration subcommands
#[derive(Subcommand)]
pub enum ConfigAction {
    /// Show current configuration
    Show,

    /// Show configuration file path
    Path,

    /// Initialize default configuration
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}
