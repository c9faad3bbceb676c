use anyhow::Result;

use crate::cli::output::{StatusInfo, get_formatter};
use crate::client::DaemonClient;
use crate::models::{Config, IndexStatus, OutputFormat};
use crate::services::SnapshotStore;

pub async fn handle_status(format: OutputFormat, verbose: bool) -> Result<()> {
    let config = Config::load()?.config;
    let formatter = get_formatter(format);

    let client = DaemonClient::new(&config);
    let daemon = if client.is_running() {
        match client.status().await {
            Ok(status) => Some(status),
            Err(e) => {
                if verbose {
                    eprintln!("Daemon status failed: {e}");
                }
                None
            }
        }
    } else {
        None
    };

    let status = match daemon {
        Some(daemon) => StatusInfo {
            daemon_running: true,
            socket_path: config.socket_path().display().to_string(),
            pid: Some(daemon.pid),
            idle_secs: Some(daemon.idle_secs),
            requests_served: Some(daemon.requests_served),
            index: daemon.index,
            metrics: daemon.metrics,
        },
        None => StatusInfo {
            daemon_running: false,
            socket_path: config.socket_path().display().to_string(),
            pid: None,
            idle_secs: None,
            requests_served: None,
            index: offline_index_status(&config),
            metrics: None,
        },
    };

    print!("{}", formatter.format_status(&status));

    if !status.daemon_running {
        eprintln!();
        eprintln!("Hint: daemon not running. It starts automatically on first ingest/search.");
        eprintln!("      Or start manually with: ragdex serve");
    }

    Ok(())
}

/// Describe the index from its manifest alone, without loading vectors.
fn offline_index_status(config: &Config) -> IndexStatus {
    let dir = config.index_dir();
    let mut status = IndexStatus {
        index_dir: dir.display().to_string(),
        ..Default::default()
    };
    let manifest = SnapshotStore::open(&dir).and_then(|store| store.read_manifest());
    match manifest {
        Ok(Some(manifest)) => {
            status.scheme = manifest.scheme;
            status.generation = manifest.generation;
            status.entries = manifest.entries;
        }
        Ok(None) => {}
        Err(e) => eprintln!("Warning: could not read index manifest: {e}"),
    }
    status
}
