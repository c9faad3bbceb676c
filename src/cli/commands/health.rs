use anyhow::{Context, Result};

use crate::cli::output::get_formatter;
use crate::client::DaemonClient;
use crate::models::{Config, OutputFormat};

pub async fn handle_health(format: OutputFormat, _verbose: bool) -> Result<()> {
    let config = Config::load()?.config;
    let formatter = get_formatter(format);

    let health = DaemonClient::new(&config)
        .health()
        .await
        .context("daemon health check failed")?;

    print!("{}", formatter.format_health(&health));
    Ok(())
}
