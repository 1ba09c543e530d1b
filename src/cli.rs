//! CLI command definitions and subcommands

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// GroundLink - drone ground control station link daemon
#[derive(Parser)]
#[command(
    name = "gl",
    about = "Ground control station link daemon",
    version,
    after_help = "Logs are written to: ~/.local/share/groundlink/logs/groundlink.log"
)]
pub struct Cli {
    /// Path to config file
    #[arg(short, long, global = true, help = "Path to config file")]
    pub config: Option<PathBuf>,

    /// Log level override (trace, debug, info, warn, error)
    #[arg(long, global = true)]
    pub log_level: Option<String>,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Command,
}

/// CLI subcommands
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Start the daemon in the background
    Start {
        /// Don't fork to background (run in foreground)
        #[arg(long)]
        foreground: bool,
    },

    /// Stop the running daemon
    Stop,

    /// Show daemon and link status
    Status {
        /// Output format
        #[arg(short, long, default_value = "text")]
        format: OutputFormat,
    },

    /// Check if the daemon is alive and responsive
    Ping,

    /// Establish the vehicle connection
    Connect,

    /// Drop the vehicle connection
    Disconnect,

    /// Subscribe to telemetry events and print them
    Watch,

    /// Update the network availability indicator
    Network {
        /// Whether the network is available
        #[arg(action = clap::ArgAction::Set)]
        available: bool,
    },

    /// Show daemon logs
    Logs {
        /// Follow log output (like tail -f)
        #[arg(short, long)]
        follow: bool,

        /// Number of lines to show
        #[arg(short, long, default_value = "50")]
        lines: usize,
    },

    /// Internal: run as the daemon process (used by `start`)
    #[command(hide = true)]
    RunDaemon,
}

/// Output format for the status command
#[derive(Clone, Debug, Default)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

impl std::str::FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "text" | "plain" => Ok(Self::Text),
            "json" => Ok(Self::Json),
            _ => Err(format!("Unknown format: {}. Use: text or json", s)),
        }
    }
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Text => write!(f, "text"),
            Self::Json => write!(f, "json"),
        }
    }
}

/// Path of the daemon log file
pub fn get_log_path() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("groundlink")
        .join("logs")
        .join("groundlink.log")
}
