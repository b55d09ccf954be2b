//! Command-line interface definitions and parsing

use clap::{Parser, Subcommand, ValueEnum};
use serde::{Deserialize, Serialize};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Configuration file path
    #[arg(short, long, global = true)]
    pub config: Option<String>,

    /// Bluetooth backend to drive (overrides the configuration file)
    #[arg(short, long, global = true, value_enum)]
    pub backend: Option<Backend>,
}

/// Platform stack behind the coordinator
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    /// In-memory devices, no radio required
    Sim,
    /// System Bluetooth adapter through btleplug
    Btleplug,
}

impl std::fmt::Display for Backend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Backend::Sim => f.write_str("sim"),
            Backend::Btleplug => f.write_str("btleplug"),
        }
    }
}

#[derive(Subcommand, Debug, PartialEq, Eq)]
pub enum Commands {
    /// Scan for peripherals exposing the configured service
    Scan {
        /// How long to scan before listing results
        #[arg(short, long)]
        duration_secs: Option<u64>,
        /// Print the device list as JSON
        #[arg(long)]
        json: bool,
    },
    /// Connect to a discovered peripheral and exchange data
    Connect {
        /// Device identifier as printed by `scan`
        id: String,
        /// Text to write once the link is ready
        #[arg(short, long)]
        send: Option<String>,
        /// How long to print incoming notifications
        #[arg(short, long)]
        listen_secs: Option<u64>,
    },
    /// Publish the service and advertise it
    Advertise {
        /// How long to stay advertising
        #[arg(short, long)]
        duration_secs: Option<u64>,
    },
    /// Print the effective configuration as TOML
    Config,
}
