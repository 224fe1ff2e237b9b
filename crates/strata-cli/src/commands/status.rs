//! Status and list commands

use serde::Serialize;

use crate::output::{print_json, OutputFormat};
use crate::{AppContext, Cli};
use strata_core::Version;

#[derive(Serialize)]
struct StatusReport {
    database: String,
    migrations_dir: String,
    current_version: Version,
    latest_version: Version,
    pending: Vec<Version>,
}

#[derive(Serialize)]
struct ListedStep<'a> {
    ordinal: Version,
    name: &'a str,
    location: &'a str,
    applied: bool,
}

pub fn run_status(cli: &Cli, ctx: &AppContext) -> anyhow::Result<()> {
    let migrator = ctx.migrator()?;
    let current_version = migrator.current_version()?;
    let latest_version = migrator.max_version();
    let pending = pending_versions(current_version, latest_version);

    if current_version > latest_version {
        tracing::warn!(
            "Database is at version {} but only {} migration(s) are available",
            current_version,
            latest_version
        );
    }

    let report = StatusReport {
        database: ctx.config.database.display().to_string(),
        migrations_dir: ctx.config.migrations_dir.display().to_string(),
        current_version,
        latest_version,
        pending,
    };

    if cli.output_format() == OutputFormat::Json {
        return print_json(&report);
    }

    println!("Database:          {}", report.database);
    println!("Migrations:        {}", report.migrations_dir);
    println!("Current version:   {}", report.current_version);
    println!("Latest version:    {}", report.latest_version);
    if report.pending.is_empty() {
        println!("Pending:           none");
    } else {
        println!("Pending:           {} step(s)", report.pending.len());
    }
    Ok(())
}

fn pending_versions(current_version: Version, latest_version: Version) -> Vec<Version> {
    (current_version.saturating_add(1)..=latest_version).collect()
}

pub fn run_list(cli: &Cli, ctx: &AppContext) -> anyhow::Result<()> {
    let migrator = ctx.migrator()?;
    let current_version = migrator.current_version()?;

    let steps: Vec<ListedStep<'_>> = migrator
        .registry()
        .steps()
        .iter()
        .map(|step| ListedStep {
            ordinal: step.ordinal,
            name: &step.name,
            location: &step.location,
            applied: step.ordinal <= current_version,
        })
        .collect();
    tracing::info!("Found {} migrations", steps.len());

    if cli.output_format() == OutputFormat::Json {
        return print_json(&steps);
    }

    if steps.is_empty() {
        println!(
            "No migrations found in {}. Create one with 'strata generate <name>'",
            ctx.config.migrations_dir.display()
        );
        return Ok(());
    }

    println!("Migrations ({} found, database at version {}):", steps.len(), current_version);
    for step in &steps {
        let marker = if step.applied { "x" } else { " " };
        println!("  [{}] {:03}  {}", marker, step.ordinal, step.name);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pending_versions() {
        assert_eq!(pending_versions(1, 3), vec![2, 3]);
        assert!(pending_versions(3, 3).is_empty());
        assert!(pending_versions(5, 3).is_empty());
        assert!(pending_versions(Version::MAX, 3).is_empty());
    }
}
