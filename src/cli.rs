//! CLI argument parsing for the maillift-worker binary.

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "maillift-worker", about = "Maillift subscriber import worker")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand)]
pub enum Command {
    /// Start the worker server (default if no subcommand given)
    Serve,
    /// Run database migrations and exit
    Migrate,
}
