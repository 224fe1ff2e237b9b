//! Generate command

use clap::Args;

use crate::output::{print_json, OutputFormat};
use crate::scaffold::generate_step;
use crate::{AppContext, Cli};

#[derive(Args)]
pub struct GenerateArgs {
    /// Short description used in the file name, e.g. "create users"
    pub name: String,
}

pub fn run(args: &GenerateArgs, cli: &Cli, ctx: &AppContext) -> anyhow::Result<()> {
    let registry = ctx.registry()?;
    let path = generate_step(&ctx.config.migrations_dir, &registry, &args.name)?;

    match cli.output_format() {
        OutputFormat::Json => print_json(&serde_json::json!({ "created": path }))?,
        OutputFormat::Text if !cli.quiet => println!("Created migration: {}", path.display()),
        OutputFormat::Text => {}
    }
    Ok(())
}
