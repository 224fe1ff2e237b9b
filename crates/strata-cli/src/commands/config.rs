//! Config command for managing the strata.toml file

use std::path::PathBuf;

use clap::{Args, Subcommand};

use crate::config::{Config, CONFIG_FILE_NAME};
use crate::output::{print_json, OutputFormat};
use crate::Cli;

#[derive(Args)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommands,
}

#[derive(Subcommand)]
pub enum ConfigCommands {
    /// Get a config value
    Get {
        /// Config key name
        key: String,
    },
    /// Set a config value
    Set {
        /// Config key name
        key: String,
        /// New value
        value: String,
    },
    /// Show the effective configuration
    Show,
    /// Show config file path
    Path,
    /// Write a default config file
    Init {
        /// Overwrite existing config
        #[arg(long)]
        force: bool,
    },
}

pub fn run(args: &ConfigArgs, cli: &Cli) -> anyhow::Result<()> {
    match &args.command {
        ConfigCommands::Get { key } => run_get(cli, key),
        ConfigCommands::Set { key, value } => run_set(cli, key, value),
        ConfigCommands::Show => run_show(cli),
        ConfigCommands::Path => run_path(cli),
        ConfigCommands::Init { force } => run_init(cli, *force),
    }
}

/// File that `set` and `init` write to
fn target_path(cli: &Cli) -> PathBuf {
    Config::locate(cli.config.as_deref()).unwrap_or_else(|| PathBuf::from(CONFIG_FILE_NAME))
}

fn run_get(cli: &Cli, key: &str) -> anyhow::Result<()> {
    let ctx = crate::AppContext::new(cli)?;
    match ctx.config.get(key) {
        Some(value) => println!("{}", value),
        None => anyhow::bail!(
            "Unknown config key: {} (available: {})",
            key,
            Config::keys().join(", ")
        ),
    }
    Ok(())
}

fn run_set(cli: &Cli, key: &str, value: &str) -> anyhow::Result<()> {
    let path = target_path(cli);
    let mut config = if path.is_file() {
        Config::load_from(&path)?
    } else {
        Config::default()
    };

    config.set(key, value)?;
    config.save(&path)?;
    if !cli.quiet {
        println!("Set {} = {} in {}", key, value, path.display());
    }
    Ok(())
}

fn run_show(cli: &Cli) -> anyhow::Result<()> {
    let ctx = crate::AppContext::new(cli)?;

    if cli.output_format() == OutputFormat::Json {
        return print_json(&serde_json::json!({
            "config_file": ctx.config_path,
            "database": ctx.config.database,
            "migrations_dir": ctx.config.migrations_dir,
            "version_table": ctx.config.version_table,
        }));
    }

    match &ctx.config_path {
        Some(path) => println!("Config file: {}", path.display()),
        None => println!("Config file: (none, using defaults)"),
    }
    println!();
    for key in Config::keys() {
        let value = ctx.config.get(key).unwrap_or_default();
        println!("{} = {}", key, value);
    }
    Ok(())
}

fn run_path(cli: &Cli) -> anyhow::Result<()> {
    println!("{}", target_path(cli).display());
    Ok(())
}

fn run_init(cli: &Cli, force: bool) -> anyhow::Result<()> {
    let path = cli
        .config
        .clone()
        .unwrap_or_else(|| PathBuf::from(CONFIG_FILE_NAME));

    if path.exists() && !force {
        anyhow::bail!(
            "Config file already exists at {}. Use --force to overwrite.",
            path.display()
        );
    }

    Config::default().save(&path)?;
    if !cli.quiet {
        println!("Created config file at {}", path.display());
    }
    Ok(())
}
