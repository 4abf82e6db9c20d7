//! Sample application binary
//!
//! Usage:
//!   transmission-sample --text hello --text world --color 3
//!   transmission-sample --config config/sample.toml --log-level debug

use anyhow::{anyhow, Result};
use clap::Parser;
use std::path::PathBuf;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;
use transmission::RouterConfig;
use transmission_sample::{run_session, Script};

#[derive(Parser, Debug)]
#[command(name = "transmission-sample")]
#[command(about = "Drive the sample transformers and print the transmission log")]
#[command(version)]
struct Args {
    /// Path to router configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Log filter used when RUST_LOG is unset (e.g. info, transmission=debug)
    #[arg(short, long, default_value = "info")]
    log_level: String,

    /// Enable JSON logging format
    #[arg(long)]
    json_logs: bool,

    /// Text to type into the input, once per occurrence
    #[arg(short, long, default_value = "hello")]
    text: Vec<String>,

    /// Palette index to select after typing
    #[arg(long)]
    color: Option<usize>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(&args)?;

    let config = match &args.config {
        Some(path) => {
            info!("Configuration: {}", path.display());
            RouterConfig::from_file(path).map_err(|e| {
                error!("Failed to load configuration: {}", e);
                e
            })?
        }
        None => RouterConfig::default(),
    };

    let script = Script {
        inputs: args.text,
        color: args.color,
    };
    for line in run_session(config, &script).await? {
        println!("{line}");
    }
    Ok(())
}

fn init_logging(args: &Args) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&args.log_level))
        .map_err(|e| anyhow!("invalid log filter '{}': {}", args.log_level, e))?;

    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    let installed = if args.json_logs {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
    installed.map_err(|e| anyhow!("failed to install log subscriber: {e}"))
}
