use anyhow::{Context, Result};
use clap::Args;
use memokit_lib::derive_key;
use serde_json::Value;

use crate::output::{print_json, print_value, OutputFormat};

#[derive(Args)]
pub struct KeyArgs {
    /// Function name used in the key prefix
    #[arg(long)]
    pub name: String,

    /// Definition location hashed with the arguments (defaults to the name)
    #[arg(long)]
    pub location: Option<String>,

    /// Call arguments as JSON: an array for positionals, an object for keywords
    #[arg(long, default_value = "null")]
    pub args: String,
}

pub fn run(args: &KeyArgs, format: &OutputFormat) -> Result<()> {
    let key = build_key(args)?;
    match format {
        OutputFormat::Table => print_value(&key),
        OutputFormat::Json => print_json(&serde_json::json!({ "key": key })),
    }
    Ok(())
}

fn build_key(args: &KeyArgs) -> Result<String> {
    let call_args: Value = serde_json::from_str(&args.args)
        .with_context(|| format!("--args is not valid JSON: {}", args.args))?;
    let location = args.location.as_deref().unwrap_or(&args.name);
    Ok(derive_key(&args.name, location, &call_args)?)
}
