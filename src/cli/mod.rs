//! CLI module for the Lynxa gateway
//!
//! - `serve`: run the HTTP gateway
//! - `migrate`: create the PostgreSQL schema and exit

pub mod migrate;
pub mod serve;

use clap::{Parser, Subcommand};

/// Lynxa Gateway - API keys, rate limiting and usage metering
#[derive(Parser)]
#[command(name = "lynxa-gateway")]
#[command(version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Run the HTTP gateway
    Serve,

    /// Create PostgreSQL tables and exit
    Migrate,
}
