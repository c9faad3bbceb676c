use anyhow::{Context, Result};
use clap::Args;

use crate::cli::output::get_formatter;
use crate::client::DaemonClient;
use crate::models::{Config, OutputFormat};

#[derive(Debug, Args)]
pub struct AskArgs {
    #[arg(required = true, help = "Question to answer from the indexed documents")]
    pub question: String,

    #[arg(short = 'k', long = "top-k", help = "Number of chunks to draw the answer from")]
    pub k: Option<usize>,
}

pub async fn handle_ask(args: AskArgs, format: OutputFormat, verbose: bool) -> Result<()> {
    let config = Config::load()?.config;
    let formatter = get_formatter(format);
    let k = args.k.unwrap_or(config.search.default_k);

    if verbose {
        eprintln!("Question: \"{}\" (k={k})", args.question);
    }

    let client = DaemonClient::new(&config);
    let answer = client
        .generate(&args.question, Some(k))
        .await
        .context("answer generation failed")?;

    print!("{}", formatter.format_answer(&args.question, &answer));
    Ok(())
}
