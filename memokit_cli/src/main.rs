mod commands;
mod output;

use anyhow::Result;
use clap::{Parser, Subcommand};

use crate::output::OutputFormat;

#[derive(Parser)]
#[command(name = "memokit")]
#[command(about = "Inspect memokit cache keys and SQLite cache stores")]
struct Cli {
    /// Output format: table or json
    #[arg(long, default_value = "table", global = true)]
    output: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the digest of a list of call parts
    Digest(commands::digest::DigestArgs),
    /// Print the cache key a memoized function would use
    Key(commands::key::KeyArgs),
    /// Read and maintain a SQLite cache store
    Cache(commands::cache::CacheArgs),
}

fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("memokit=info".parse()?),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let format = match cli.output.as_str() {
        "json" => OutputFormat::Json,
        _ => OutputFormat::Table,
    };

    match &cli.command {
        Commands::Digest(args) => commands::digest::run(args, &format)?,
        Commands::Key(args) => commands::key::run(args, &format)?,
        Commands::Cache(args) => commands::cache::run(args, &format)?,
    }

    Ok(())
}
