//! Headless host bridge binary for stdin/stdout JSON communication.
//!
//! This binary reads `CommandEnvelope` messages as newline-delimited JSON
//! from stdin, dispatches them through the host command channel, and writes
//! `ResponseEnvelope` and `EventEnvelope` messages to stdout.
//!
//! All tracing/diagnostic output goes to stderr so that stdout remains a
//! clean JSON protocol channel.

use clap::Parser;
use sightsync::SightConfig;
use sightsync::description::HttpDescriptionClient;
use sightsync::host::stdio::run_stdio_bridge;
use std::path::PathBuf;
use std::sync::Arc;

/// JSON-lines bridge between a native shell and the sightsync controller.
#[derive(Parser)]
#[command(name = "sightsync-host", version, about)]
struct Args {
    /// Path to TOML configuration file.
    #[arg(short, long, env = "SIGHTSYNC_CONFIG")]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("sightsync=info")),
        )
        .init();

    let args = Args::parse();
    let config = SightConfig::load(args.config.as_deref())?;
    let describer = Arc::new(HttpDescriptionClient::new(&config.description)?);

    tracing::info!(endpoint = %describer.endpoint(), "sightsync-host starting");

    run_stdio_bridge(&config, describer).await.map_err(|e| {
        tracing::error!(error = %e, "sightsync-host exited with error");
        anyhow::anyhow!("sightsync-host failed: {e}")
    })?;

    tracing::info!("sightsync-host shut down cleanly");
    Ok(())
}
