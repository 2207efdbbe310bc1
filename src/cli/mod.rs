//! CLI module for the access key gate

pub mod serve;

use clap::{Parser, Subcommand};

/// Access key gate - validates panel access keys and manages their lifecycle
#[derive(Parser)]
#[command(name = "access-key-gate")]
#[command(version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand)]
pub enum Command {
    /// Run the HTTP server (default)
    Serve,
}
