use anyhow::{bail, Result};
use clap::Args;
use memokit_lib::compute_digest;

use crate::output::{print_json, print_value, OutputFormat};

#[derive(Args)]
pub struct DigestArgs {
    /// Positional parts, hashed in order
    pub parts: Vec<String>,

    /// Keyword part as NAME=VALUE (repeatable)
    #[arg(long = "kw")]
    pub keywords: Vec<String>,
}

pub fn run(args: &DigestArgs, format: &OutputFormat) -> Result<()> {
    let keywords = args
        .keywords
        .iter()
        .map(|kw| parse_keyword(kw))
        .collect::<Result<Vec<_>>>()?;
    let digest = compute_digest(&args.parts, &keywords)?;

    match format {
        OutputFormat::Table => print_value(&digest),
        OutputFormat::Json => print_json(&serde_json::json!({ "digest": digest })),
    }
    Ok(())
}

fn parse_keyword(raw: &str) -> Result<(String, String)> {
    match raw.split_once('=') {
        Some((name, value)) if !name.is_empty() => Ok((name.to_string(), value.to_string())),
        _ => bail!("invalid keyword '{}': expected NAME=VALUE", raw),
    }
}
