use anyhow::{Context, Result};
use clap::Subcommand;
use std::process::Command;

use crate::cli::output::{Formatter, get_formatter};
use crate::models::{Config, OutputFormat, ResolvedConfig};

/// Environment variables that override file configuration.
const ENV_OVERRIDES: [&str; 3] = ["RAGDEX_INDEX_DIR", "RAGDEX_SCHEME", "EMBEDDING_MODEL"];

#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    #[command(about = "Initialize configuration file")]
    Init {
        #[arg(
            long,
            short = 'g',
            help = "Create global config instead of project config"
        )]
        global: bool,
        #[arg(long, help = "Force overwrite existing config")]
        force: bool,
    },
    #[command(about = "Show current configuration")]
    Show {
        #[arg(long, help = "Show which files and variables contributed")]
        source: bool,
    },
    #[command(about = "Show configuration file paths")]
    Path {
        #[arg(long, help = "Show all possible config paths")]
        all: bool,
    },
    #[command(about = "Edit configuration file")]
    Edit {
        #[arg(
            long,
            short = 'g',
            help = "Edit global config instead of project config"
        )]
        global: bool,
    },
}

pub async fn handle_config(cmd: ConfigCommand, format: OutputFormat, _verbose: bool) -> Result<()> {
    let formatter = get_formatter(format);

    match cmd {
        ConfigCommand::Init { global, force } => handle_init(global, force, formatter.as_ref()),
        ConfigCommand::Show { source } => handle_show(source, format),
        ConfigCommand::Path { all } => handle_path(all),
        ConfigCommand::Edit { global } => handle_edit(global, formatter.as_ref()),
    }
}

fn handle_init(global: bool, force: bool, formatter: &dyn Formatter) -> Result<()> {
    let (config_path, scope) = if global {
        let path = Config::global_path()
            .ok_or_else(|| anyhow::anyhow!("could not determine config directory"))?;
        (path, "global")
    } else {
        let cwd = std::env::current_dir().context("could not determine current directory")?;
        (cwd.join(".ragdex").join("config.toml"), "project")
    };

    if config_path.exists() && !force {
        anyhow::bail!(
            "{scope} config already exists at: {}\nUse --force to overwrite.",
            config_path.display()
        );
    }

    let path = if global {
        Config::init_global()
    } else {
        Config::init_project()
    }
    .with_context(|| format!("failed to create {scope} config"))?;

    println!(
        "{}",
        formatter.format_message(&format!("Created {scope} config at: {}", path.display()))
    );
    Ok(())
}

fn handle_show(show_source: bool, format: OutputFormat) -> Result<()> {
    let resolved = Config::load()?;
    let active_env = active_env_overrides();

    if format == OutputFormat::Json {
        if show_source {
            let output = serde_json::json!({
                "config": resolved.config,
                "project_path": resolved.project_path,
                "global_path": resolved.global_path,
                "env_overrides": active_env,
            });
            println!("{}", serde_json::to_string_pretty(&output)?);
        } else {
            println!("{}", serde_json::to_string_pretty(&resolved.config)?);
        }
        return Ok(());
    }

    if show_source {
        print_sources(&resolved, &active_env);
        println!();
    }
    let rendered =
        toml::to_string_pretty(&resolved.config).context("failed to render configuration")?;
    print!("{rendered}");
    println!();
    println!("# index directory: {}", resolved.config.index_dir().display());
    println!("# socket: {}", resolved.config.socket_path().display());

    Ok(())
}

fn print_sources(resolved: &ResolvedConfig, active_env: &[&str]) {
    println!("# Sources (later entries win):");
    println!("#   defaults");
    match resolved.global_path {
        Some(ref path) => println!("#   global:  {}", path.display()),
        None => println!("#   global:  (none)"),
    }
    match resolved.project_path {
        Some(ref path) => println!("#   project: {}", path.display()),
        None => println!("#   project: (none)"),
    }
    if active_env.is_empty() {
        println!("#   env:     (none)");
    } else {
        println!("#   env:     {}", active_env.join(", "));
    }
}

fn active_env_overrides() -> Vec<&'static str> {
    ENV_OVERRIDES
        .into_iter()
        .filter(|name| std::env::var(name).is_ok_and(|v| !v.trim().is_empty()))
        .collect()
}

fn handle_path(show_all: bool) -> Result<()> {
    let resolved = Config::load()?;

    println!("Configuration paths:");
    println!();

    if let Some(ref path) = resolved.project_path {
        println!("Project config (active): {}", path.display());
    } else if show_all && let Some(dir) = Config::project_config_dir() {
        println!(
            "Project config (would be): {}",
            dir.join("config.toml").display()
        );
    }

    if let Some(ref path) = resolved.global_path {
        println!("Global config (active): {}", path.display());
    } else if show_all && let Some(path) = Config::global_path() {
        println!("Global config (would be): {}", path.display());
    }

    if show_all && let Ok(cwd) = std::env::current_dir() {
        let env_path = cwd.join(".env");
        if env_path.exists() {
            println!(".env file (active): {}", env_path.display());
        } else {
            println!(".env file (would be): {}", env_path.display());
        }
    }

    println!("Index directory: {}", resolved.config.index_dir().display());
    Ok(())
}

fn handle_edit(global: bool, formatter: &dyn Formatter) -> Result<()> {
    let config_path = if global {
        let path = Config::global_path()
            .ok_or_else(|| anyhow::anyhow!("could not determine config directory"))?;

        if !path.exists() {
            Config::init_global().context("failed to create global config")?;
            println!(
                "{}",
                formatter.format_message(&format!("Created global config at: {}", path.display()))
            );
        }
        path
    } else {
        let path = Config::project_config_dir()
            .map(|d| d.join("config.toml"))
            .ok_or_else(|| anyhow::anyhow!("could not determine config path"))?;

        if !path.exists() {
            let created = Config::init_project().context("failed to create project config")?;
            println!(
                "{}",
                formatter.format_message(&format!(
                    "Created project config at: {}",
                    created.display()
                ))
            );
        }
        path
    };

    let editor = std::env::var("EDITOR")
        .unwrap_or_else(|_| std::env::var("VISUAL").unwrap_or_else(|_| "vim".into()));

    Command::new(&editor)
        .arg(&config_path)
        .status()
        .with_context(|| format!("failed to open editor: {}", editor))?;

    Ok(())
}
