//! Greyhound point-cloud streaming server.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::EnvFilter;

use greyhound_server::{App, Configuration};

/// Streaming point-cloud server
#[derive(Parser, Debug)]
#[command(name = "greyhound", version, about)]
struct Args {
    /// Path to a JSON configuration file
    #[arg(short = 'c', long = "config")]
    config: Option<PathBuf>,

    /// Override the HTTP listen port
    #[arg(short = 'p', long = "port")]
    port: Option<u16>,

    /// Additional search roots for resource resolution
    #[arg(short = 'd', long = "data")]
    data: Vec<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => {
            tracing::info!(path = %path.display(), "using configuration file");
            Configuration::load(Some(path)).context("failed to load configuration")?
        }
        None => {
            tracing::info!("using default configuration");
            Configuration::default()
        }
    };
    if let Some(port) = args.port {
        config.http.port = port;
    }
    config.paths.extend(args.data);

    for path in &config.paths {
        tracing::info!(path = %path.display(), "search root");
    }

    let app = App::start(config)
        .await
        .context("failed to start listeners")?;
    tracing::info!(addr = %app.addr(), "serving");
    tracing::info!("Press Ctrl+C to exit");

    tokio::signal::ctrl_c()
        .await
        .context("failed to wait for Ctrl+C")?;

    tracing::info!("received interrupt signal, shutting down...");
    app.stop().await;
    Ok(())
}
