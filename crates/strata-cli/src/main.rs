//! Strata CLI - Command line interface for schema migrations

use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

mod commands;
mod config;
mod output;
mod scaffold;

use commands::{completions, generate, migrate, status};
use config::Config;
use output::OutputFormat;
use strata_core::{Migrator, StepRegistry};
use strata_storage::SqliteDatabase;

#[derive(Parser)]
#[command(name = "strata")]
#[command(author, version, about = "Sequential schema migrations for SQLite databases")]
pub struct Cli {
    /// Config file (default: ./strata.toml, then the user config directory)
    #[arg(short, long, global = true, env = "STRATA_CONFIG")]
    pub config: Option<PathBuf>,

    /// Database file
    #[arg(short, long, global = true, env = "STRATA_DATABASE")]
    pub database: Option<PathBuf>,

    /// Directory holding the numbered migration files
    #[arg(short, long, global = true, env = "STRATA_MIGRATIONS_DIR")]
    pub migrations_dir: Option<PathBuf>,

    /// Output format: text, json
    #[arg(short, long, default_value = "text", global = true)]
    pub format: String,

    /// Verbosity level (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress output except errors
    #[arg(short, long, global = true)]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    pub fn output_format(&self) -> OutputFormat {
        OutputFormat::from(self.format.as_str())
    }
}

#[derive(Subcommand)]
pub enum Commands {
    /// Migrate the database schema to another version
    Migrate(migrate::MigrateArgs),
    /// Show the current and latest schema versions
    Status,
    /// List the discovered migrations
    List,
    /// Create a new, empty migration file
    Generate(generate::GenerateArgs),
    /// Manage the config file
    Config(commands::config::ConfigArgs),
    /// Generate shell completions
    Completions(completions::CompletionsArgs),
}

/// Application context with resolved configuration
pub struct AppContext {
    pub config: Config,
    pub config_path: Option<PathBuf>,
}

impl AppContext {
    pub fn new(cli: &Cli) -> anyhow::Result<Self> {
        let (mut config, config_path) = Config::load(cli.config.as_deref())?;

        if let Some(database) = &cli.database {
            config.database = database.clone();
        }
        if let Some(dir) = &cli.migrations_dir {
            config.migrations_dir = dir.clone();
        }

        tracing::debug!(
            "Using database {:?} and migrations in {:?}",
            config.database,
            config.migrations_dir
        );

        Ok(Self {
            config,
            config_path,
        })
    }

    pub fn registry(&self) -> anyhow::Result<StepRegistry> {
        StepRegistry::from_dir(&self.config.migrations_dir).with_context(|| {
            format!(
                "failed to load migrations from {}",
                self.config.migrations_dir.display()
            )
        })
    }

    pub fn open_database(&self) -> anyhow::Result<SqliteDatabase> {
        if let Some(parent) = self.config.database.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let db = SqliteDatabase::open(&self.config.database)
            .and_then(|db| db.with_version_table(&self.config.version_table))
            .with_context(|| format!("failed to open {}", self.config.database.display()))?;
        Ok(db)
    }

    pub fn migrator(&self) -> anyhow::Result<Migrator<SqliteDatabase>> {
        let registry = self.registry()?;
        let db = self.open_database()?;
        Ok(Migrator::new(db, registry))
    }
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Set up logging based on verbosity
    let filter = match cli.verbose {
        0 if cli.quiet => "error",
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| filter.into()))
        .init();

    tracing::debug!("Starting strata CLI");

    match &cli.command {
        Commands::Migrate(args) => migrate::run(args, &cli, &AppContext::new(&cli)?)?,
        Commands::Status => status::run_status(&cli, &AppContext::new(&cli)?)?,
        Commands::List => status::run_list(&cli, &AppContext::new(&cli)?)?,
        Commands::Generate(args) => generate::run(args, &cli, &AppContext::new(&cli)?)?,
        Commands::Config(args) => commands::config::run(args, &cli)?,
        Commands::Completions(args) => completions::run(args)?,
    }

    Ok(())
}
