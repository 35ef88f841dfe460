//! Upload Bench - storage upload benchmark server
//!
//! Serves `GET /upload/{target}` and reports how long each chunked upload took.

use clap::Parser;
use std::path::PathBuf;
use tracing::info;
use upload_bench::{config::Config, logging, server::Server};

/// Upload Bench - chunked multipart upload benchmark
#[derive(Parser, Debug)]
#[command(name = "upload-bench")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "config.yaml")]
    config: PathBuf,

    /// Log level (trace, debug, info, warn, error); overrides the config file
    #[arg(short, long)]
    log_level: Option<String>,

    /// Bind address; overrides `server.address`
    #[arg(short, long)]
    address: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let mut config = Config::load(&args.config)?;
    if let Some(address) = args.address {
        config.server.address = address;
    }

    logging::init_subscriber(&config.logging, args.log_level.as_deref())?;

    info!("Starting Upload Bench v{}", upload_bench::VERSION);
    info!("Loaded configuration from {:?}", args.config);

    let server = Server::new(config).await?;
    server
        .run_until(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!("Failed to listen for shutdown signal: {}", e);
            }
        })
        .await?;

    Ok(())
}
