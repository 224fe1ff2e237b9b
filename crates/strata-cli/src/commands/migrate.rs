//! Migrate command

use clap::Args;
use serde::Serialize;

use crate::output::{print_json, OutputFormat};
use crate::{AppContext, Cli};
use strata_core::{MigrationPlan, RunResult, Version};

#[derive(Args)]
pub struct MigrateArgs {
    /// Target version (default: latest, 0 reverts everything)
    #[arg(long = "version", short = 't', value_name = "VERSION", allow_negative_numbers = true)]
    pub target: Option<i64>,

    /// Show the steps that would run without applying them
    #[arg(long)]
    pub dry_run: bool,
}

#[derive(Serialize)]
struct PlannedStep<'a> {
    ordinal: Version,
    name: &'a str,
    location: &'a str,
}

#[derive(Serialize)]
struct DryRunReport<'a> {
    dry_run: bool,
    #[serde(flatten)]
    plan: &'a MigrationPlan,
    steps: Vec<PlannedStep<'a>>,
}

pub fn run(args: &MigrateArgs, cli: &Cli, ctx: &AppContext) -> anyhow::Result<()> {
    let format = cli.output_format();
    let migrator = ctx.migrator()?;

    if args.dry_run {
        let plan = migrator.plan(args.target)?;
        let steps = plan
            .ordinals
            .iter()
            .map(|&ordinal| {
                migrator.registry().describe(ordinal).map(|step| PlannedStep {
                    ordinal,
                    name: &step.name,
                    location: &step.location,
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        if format == OutputFormat::Json {
            return print_json(&DryRunReport {
                dry_run: true,
                plan: &plan,
                steps,
            });
        }

        print_plan(&plan, &steps);
        return Ok(());
    }

    let echo_diag = !cli.quiet && format == OutputFormat::Text;
    let migrator = migrator.on_diag(move |ordinal, text| {
        if echo_diag {
            println!("  [{:03}] {}", ordinal, text);
        }
    });

    let result = migrator.migrate(args.target)?;
    tracing::info!(
        "Schema moved from v{} to v{}",
        result.source_version,
        result.final_version
    );

    match format {
        OutputFormat::Json => print_json(&result)?,
        OutputFormat::Text if !cli.quiet => print_result(&result),
        OutputFormat::Text => {}
    }
    Ok(())
}

fn print_plan(plan: &MigrationPlan, steps: &[PlannedStep<'_>]) {
    let Some(direction) = plan.direction else {
        println!(
            "Nothing to do: database is already at version {}",
            plan.source_version
        );
        return;
    };

    println!(
        "Would migrate {} from version {} to version {} ({} step(s)):",
        direction,
        plan.source_version,
        plan.target_version,
        plan.len()
    );
    for step in steps {
        println!("  {:03}  {}  ({})", step.ordinal, step.name, step.location);
    }
}

fn print_result(result: &RunResult) {
    println!("migrated {} step(s)", result.steps_executed);
    println!("current database version: {}", result.final_version);
}
