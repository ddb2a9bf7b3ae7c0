//! CLI binary for sightsync.

use anyhow::Context as _;
use clap::{Parser, Subcommand};
use sightsync::capture::{CapturedImage, NoCamera};
use sightsync::controller::ControllerEvent;
use sightsync::description::{DescriptionService, HttpDescriptionClient};
use sightsync::narration::SilentSpeech;
use sightsync::playback::CpalAudioOutput;
use sightsync::{Capabilities, ControllerNotice, ControllerRuntime, Mode, SightConfig};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc};
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// sightsync: spoken descriptions of photos.
#[derive(Parser)]
#[command(name = "sightsync", version, about)]
struct Cli {
    /// Path to TOML configuration file.
    #[arg(short, long, env = "SIGHTSYNC_CONFIG")]
    config: Option<PathBuf>,

    /// Subcommand to run.
    #[command(subcommand)]
    command: Command,
}

/// Available commands.
#[derive(Subcommand)]
enum Command {
    /// Upload an image and play the spoken description.
    Describe {
        /// Image file to describe.
        path: PathBuf,

        /// Write the returned audio to this file instead of playing it.
        #[arg(long)]
        save: Option<PathBuf>,

        /// Only check that a description comes back.
        #[arg(long)]
        no_play: bool,
    },

    /// Check that the description backend is reachable.
    Health,

    /// List available audio output devices.
    Devices,

    /// Write the default configuration file.
    InitConfig {
        /// Overwrite an existing file.
        #[arg(long)]
        force: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("sightsync=info,reqwest=warn,symphonia=warn")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Command::Describe {
            path,
            save,
            no_play,
        } => {
            let config = SightConfig::load(cli.config.as_deref())?;
            run_describe(&config, path, save, no_play).await
        }
        Command::Health => {
            let config = SightConfig::load(cli.config.as_deref())?;
            run_health(&config).await
        }
        Command::Devices => list_devices(),
        Command::InitConfig { force } => init_config(cli.config, force),
    }
}

async fn run_describe(
    config: &SightConfig,
    path: PathBuf,
    save: Option<PathBuf>,
    no_play: bool,
) -> anyhow::Result<()> {
    let image = CapturedImage::from_path(&path)?;
    let client = HttpDescriptionClient::new(&config.description)?;
    println!(
        "Uploading {} ({} bytes) to {}",
        path.display(),
        image.len(),
        client.endpoint()
    );

    if no_play || save.is_some() {
        let audio = client.describe(&image).await?;
        info!(bytes = audio.bytes.len(), mime_type = %audio.mime_type, "description received");
        if let Some(save) = save {
            std::fs::write(&save, &audio.bytes)
                .with_context(|| format!("failed to write {}", save.display()))?;
            println!("Saved audio to {}", save.display());
        }
        return Ok(());
    }

    let (playback_tx, playback_rx) = mpsc::unbounded_channel();
    let capabilities = Capabilities {
        camera: Box::new(NoCamera),
        speech: Box::new(SilentSpeech),
        audio: Box::new(CpalAudioOutput::new(&config.audio, playback_tx)),
        describer: Arc::new(client),
    };
    let (controller, runtime) = ControllerRuntime::new(config, capabilities, playback_rx, 8);
    let mut notices = controller.subscribe();

    let cancel = CancellationToken::new();
    let runtime_task = tokio::spawn(runtime.run(cancel.clone()));
    let cancel_clone = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("received Ctrl+C, stopping...");
            cancel_clone.cancel();
        }
    });

    let state = controller.send(ControllerEvent::SelectImage(image)).await?;
    if state.mode != Mode::Processing {
        controller.send(ControllerEvent::Submit).await?;
    }

    let mut failure = None;
    let mut started = false;
    loop {
        tokio::select! {
            () = cancel.cancelled() => break,
            notice = notices.recv() => match notice {
                Ok(ControllerNotice::Status(text)) => println!("{text}"),
                Ok(ControllerNotice::Error { message, .. }) => {
                    failure = Some(message);
                    break;
                }
                Ok(ControllerNotice::StateChanged(state)) => match state.mode {
                    Mode::PlayingResult => started = true,
                    Mode::ImageReady if started => break,
                    _ => {}
                },
                Err(broadcast::error::RecvError::Lagged(_)) => {}
                Err(broadcast::error::RecvError::Closed) => break,
            },
        }
    }

    cancel.cancel();
    let _ = runtime_task.await;
    match failure {
        Some(message) => anyhow::bail!(message),
        None => Ok(()),
    }
}

async fn run_health(config: &SightConfig) -> anyhow::Result<()> {
    let client = HttpDescriptionClient::new(&config.description)?;
    let url = config.description.health_url();
    if client.health().await? {
        println!("Backend healthy at {url}");
        Ok(())
    } else {
        anyhow::bail!("backend at {url} is not healthy")
    }
}

fn list_devices() -> anyhow::Result<()> {
    println!("Output devices:");
    for name in CpalAudioOutput::list_output_devices()? {
        println!("  - {name}");
    }
    Ok(())
}

fn init_config(path: Option<PathBuf>, force: bool) -> anyhow::Result<()> {
    let path = path.unwrap_or_else(SightConfig::default_config_path);
    if path.exists() && !force {
        anyhow::bail!(
            "{} already exists (pass --force to overwrite)",
            path.display()
        );
    }
    SightConfig::default().save_to_file(&path)?;
    println!("Wrote {}", path.display());
    Ok(())
}
