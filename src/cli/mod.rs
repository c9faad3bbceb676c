//! Command-line interface for the ragdex daemon.

pub mod commands;
pub mod output;

use clap::{Parser, Subcommand};

use crate::models::OutputFormat;

/// Minimal retrieval-augmented-generation backend: ingest, search, ask.
#[derive(Debug, Parser)]
#[command(name = "ragdex")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    #[arg(
        long,
        short = 'f',
        global = true,
        help = "Output format: text, json, or markdown"
    )]
    pub format: Option<OutputFormat>,

    #[arg(long, short = 'v', global = true, help = "Enable verbose output")]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available subcommands.
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Ingest files or directories into the index
    Ingest(commands::IngestArgs),

    /// Return the chunks most similar to a query
    Search(commands::SearchArgs),

    /// Answer a question from the indexed chunks
    Ask(commands::AskArgs),

    /// Check that the daemon is alive
    Health,

    /// Show daemon and index status
    Status,

    /// Maintain the index (rebuild, clear)
    #[command(subcommand)]
    Index(commands::IndexCommand),

    /// Start, stop or restart the daemon
    Serve(commands::ServeArgs),

    /// Manage configuration
    #[command(subcommand)]
    Config(commands::ConfigCommand),
}
