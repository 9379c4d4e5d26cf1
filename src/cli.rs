use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// chain-sentinel CLI (library-facing definitions)
#[derive(Debug, Parser)]
#[command(name = "chain-sentinel", about = "Transaction compliance and risk monitor")]
#[command(version = env!("CARGO_PKG_VERSION"))]
pub struct Cli {
    /// TOML configuration file (falls back to $SENTINEL_CONFIG)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Poll the ledger and raise alerts until interrupted
    Monitor {
        /// Only follow these senders (repeatable)
        #[arg(long = "address")]
        addresses: Vec<String>,
        /// Dump Prometheus metrics to stdout on shutdown
        #[arg(long)]
        metrics: bool,
    },
    /// Check a single transaction against the configured policies
    Check {
        #[arg(long)]
        sender: String,
        #[arg(long)]
        receiver: Option<String>,
        #[arg(long, default_value_t = 0)]
        value: u64,
        #[arg(long, default_value_t = 0)]
        gas_used: u64,
        /// Entry function id, e.g. 0x1::coin::transfer
        #[arg(long)]
        function: Option<String>,
    },
    /// Print the configured policies
    Policies {
        /// Print aggregate statistics instead
        #[arg(long)]
        stats: bool,
    },
}
