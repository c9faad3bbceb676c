//! Index maintenance commands.

use anyhow::{Context, Result};
use clap::Subcommand;

use crate::cli::output::get_formatter;
use crate::client::DaemonClient;
use crate::models::{Config, OutputFormat};

#[derive(Debug, Subcommand)]
pub enum IndexCommand {
    /// Re-vectorize every stored chunk with the configured scheme
    Rebuild,

    /// Remove every indexed chunk
    Clear {
        /// Skip confirmation prompt
        #[arg(long, short = 'y')]
        force: bool,
    },
}

pub async fn handle_index(cmd: IndexCommand, format: OutputFormat, verbose: bool) -> Result<()> {
    let config = Config::load()?.config;
    let formatter = get_formatter(format);
    let client = DaemonClient::new(&config);

    let status = match cmd {
        IndexCommand::Rebuild => {
            if verbose {
                eprintln!("Rebuilding index at {}...", config.index_dir().display());
            }
            client.rebuild().await.context("rebuild failed")?
        }
        IndexCommand::Clear { force } => {
            if !force {
                eprintln!("This will delete ALL indexed chunks. Continue? [y/N]");
                let mut input = String::new();
                std::io::stdin().read_line(&mut input)?;
                if !input.trim().eq_ignore_ascii_case("y") {
                    println!("{}", formatter.format_message("Cancelled."));
                    return Ok(());
                }
            }
            client.clear().await.context("clear failed")?
        }
    };

    print!("{}", formatter.format_index_status(&status));
    Ok(())
}
