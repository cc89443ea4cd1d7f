//! CLI commands and argument parsing.

pub mod verify;
pub mod write;

use clap::{Parser, Subcommand};

/// auditlog - structured audit trail tooling
#[derive(Parser)]
#[command(name = "auditlog")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands.
#[derive(Subcommand)]
pub enum Commands {
    /// Append one audit record
    Write(write::WriteArgs),

    /// Check an audit trail against the record format
    Verify(verify::VerifyArgs),

    /// Print version information
    Version,
}
