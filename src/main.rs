// topnews CLI.
// Prints the top N upstream items as JSON, or a status-coded error, per requested count.

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Parser;
use serde_json::json;

use topnews::{Aggregator, Config, HttpUpstream, RetryPolicy, Retrying, logging};

/// Fetch the top N items from the upstream API.
///
/// Counts are served in order through one cache, so a repeated count within
/// the TTL is answered without upstream requests.
#[derive(Parser)]
#[command(name = "topnews")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Numbers of items to fetch, one result per count
    #[arg(default_values_t = [10], allow_negative_numbers = true)]
    counts: Vec<i64>,

    /// YAML configuration file
    #[arg(short, long, env = "TOPNEWS_CONFIG")]
    config: Option<PathBuf>,

    /// Emit logs as JSON lines
    #[arg(long)]
    json_logs: bool,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();
    logging::init(cli.verbose, cli.json_logs);

    let config = Config::load(cli.config.as_deref()).context("invalid configuration")?;
    let upstream = HttpUpstream::new(&config.upstream).context("failed to build HTTP client")?;
    let upstream = Retrying::new(upstream, RetryPolicy::from(&config.retry));
    let aggregator = Aggregator::from_config(upstream, &config.cache, &config.aggregator)?;

    let mut exit = ExitCode::SUCCESS;
    for count in cli.counts {
        match aggregator.get_top_items(count).await {
            Ok(items) => println!("{}", serde_json::to_string_pretty(&items)?),
            Err(err) => {
                let body = json!({
                    "count": count,
                    "status": err.status_code(),
                    "detail": err.to_string(),
                });
                eprintln!("{}", body);
                exit = ExitCode::FAILURE;
            }
        }
    }

    Ok(exit)
}
