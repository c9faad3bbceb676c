use anyhow::{Context, Result};
use clap::Args;
use std::time::Instant;

use crate::cli::output::get_formatter;
use crate::client::DaemonClient;
use crate::models::{Config, OutputFormat};

#[derive(Debug, Args)]
pub struct SearchArgs {
    #[arg(required = true, help = "Search query text")]
    pub query: String,

    #[arg(short = 'k', long = "top-k", help = "Number of chunks to return")]
    pub k: Option<usize>,
}

pub async fn handle_search(args: SearchArgs, format: OutputFormat, verbose: bool) -> Result<()> {
    let config = Config::load()?.config;
    let formatter = get_formatter(format);
    let start_time = Instant::now();

    let k = args.k.unwrap_or(config.search.default_k);
    if verbose {
        eprintln!("Query: \"{}\"", args.query);
        eprintln!("  k: {k}");
    }

    let client = DaemonClient::new(&config);
    let results = client
        .search(&args.query, Some(k))
        .await
        .context("search failed")?;

    if verbose {
        eprintln!("Timing:");
        eprintln!("  Index: {}ms", results.duration_ms);
        eprintln!("  Total: {}ms", start_time.elapsed().as_millis());
        eprintln!();
    }

    print!("{}", formatter.format_search_results(&results));
    Ok(())
}
