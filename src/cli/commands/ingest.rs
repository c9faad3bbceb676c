//! Ingest command implementation.

use anyhow::{Context, Result};
use clap::Args;
use indicatif::{ProgressBar, ProgressStyle};
use std::path::{Path, PathBuf};
use std::time::Instant;
use walkdir::WalkDir;

use crate::cli::output::{IngestStats, get_formatter};
use crate::client::DaemonClient;
use crate::error::DaemonError;
use crate::models::{Config, OutputFormat};
use crate::utils::is_text_file;

#[derive(Debug, Args)]
pub struct IngestArgs {
    /// File or directory to ingest
    #[arg(required = true)]
    pub path: PathBuf,

    /// Job id recorded on every chunk (a new UUID when omitted)
    #[arg(long, short = 'j')]
    pub job_id: Option<String>,

    /// File patterns to exclude (can be specified multiple times)
    #[arg(long, short = 'e')]
    pub exclude: Vec<String>,

    /// Show what would be ingested without ingesting
    #[arg(long)]
    pub dry_run: bool,
}

pub async fn handle_ingest(args: IngestArgs, format: OutputFormat, verbose: bool) -> Result<()> {
    let config = Config::load()?.config;
    let formatter = get_formatter(format);
    let start_time = Instant::now();

    let path = args.path.canonicalize().context("invalid path")?;
    let files = collect_files(&path, &args.exclude, &config.ingest.exclude_patterns)?;

    if files.is_empty() {
        println!("{}", formatter.format_message("No files found to ingest."));
        return Ok(());
    }

    if verbose {
        eprintln!("Found {} files to process", files.len());
    }

    if args.dry_run {
        println!(
            "{}",
            formatter.format_message(&format!("Dry run: Would ingest {} files", files.len()))
        );
        for file in &files {
            println!("  {}", file.display());
        }
        return Ok(());
    }

    let job_id = args
        .job_id
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
    let client = DaemonClient::new(&config);
    client
        .ensure_running()
        .await
        .context("failed to reach the ragdex daemon")?;

    let pb = ProgressBar::new(files.len() as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template(
                "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({eta})",
            )
            .context("invalid progress template")?
            .progress_chars("#>-"),
    );

    let mut stats = IngestStats {
        job_id: job_id.clone(),
        files_scanned: files.len() as u64,
        ..Default::default()
    };

    for file_path in &files {
        pb.inc(1);

        if !is_text_file(file_path) {
            stats.files_skipped += 1;
            continue;
        }

        let report = match client.ingest_path(&job_id, file_path).await {
            Ok(report) => report,
            Err(DaemonError::Remote(message)) => {
                if verbose {
                    pb.println(format!("Skipping {}: {}", file_path.display(), message));
                }
                stats.files_skipped += 1;
                continue;
            }
            Err(e) => {
                pb.finish_and_clear();
                return Err(e).context(format!("failed to ingest {}", file_path.display()));
            }
        };

        if report.indexed {
            stats.files_indexed += 1;
        } else {
            stats.files_skipped += 1;
        }
        stats.chunks_created += report.num_chunks as u64;
        stats.summary_chunks += u64::from(report.summary_chunk);
        stats.skipped_cells += report.skipped_cells as u64;
        stats.skipped_rows += report.skipped_rows as u64;
        stats.skipped_bytes += report.skipped_bytes as u64;
    }

    pb.finish_and_clear();
    stats.duration_ms = start_time.elapsed().as_millis() as u64;
    print!("{}", formatter.format_ingest_stats(&stats));

    Ok(())
}

fn collect_files(path: &Path, exclude: &[String], default_exclude: &[String]) -> Result<Vec<PathBuf>> {
    if path.is_file() {
        return Ok(vec![path.to_path_buf()]);
    }

    let patterns: Vec<glob::Pattern> = exclude
        .iter()
        .chain(default_exclude.iter())
        .map(|p| glob::Pattern::new(p).with_context(|| format!("invalid exclude pattern: {p}")))
        .collect::<Result<_>>()?;

    let mut files = Vec::new();
    for entry in WalkDir::new(path).follow_links(false).sort_by_file_name() {
        let entry = entry.context("failed to read directory entry")?;
        let entry_path = entry.path();

        if !entry.file_type().is_file() {
            continue;
        }

        let path_str = entry_path.to_string_lossy();
        if !patterns.iter().any(|p| p.matches(&path_str)) {
            files.push(entry_path.to_path_buf());
        }
    }

    Ok(files)
}
