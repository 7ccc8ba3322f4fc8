//! CLI interface for nogasm-ws
//!
//! Provides subcommands for:
//! - `watch`: Follow a device's status socket
//! - `backoff`: Show the reconnect schedule
//! - `config`: Show the effective configuration

mod backoff;
mod watch;

pub use backoff::BackoffArgs;
pub use watch::WatchArgs;

use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "nogasm-ws")]
#[command(about = "Resilient WebSocket status client for NogasmLink devices")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Path to configuration file
    #[arg(short, long, default_value = "config.toml")]
    pub config: String,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Follow the device's status socket until Ctrl-C
    Watch(WatchArgs),
    /// Show the reconnect schedule
    Backoff(BackoffArgs),
    /// Show the effective configuration
    Config,
}
