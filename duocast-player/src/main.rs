//! Duocast player - main entry point
//!
//! Headless player for generated two-host audio programs: asks the backend
//! for a chunked script, then streams it segment by segment through the
//! playback engine, rendering the status feed to the log.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use duocast_common::events::{PlayerEvent, StatusLevel};
use duocast_player::audio::format_duration;
use duocast_player::backend::{BackendClient, ScriptSource};
use duocast_player::playback::{ClockOutput, PlaybackController};
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Command-line arguments for duocast-player
#[derive(Parser, Debug)]
#[command(name = "duocast-player")]
#[command(about = "Segment-streaming player for generated audio programs")]
#[command(version)]
struct Args {
    /// Generation backend base URL
    #[arg(short, long, default_value = "http://localhost:8080", env = "DUOCAST_BACKEND")]
    backend: String,

    /// Program topic
    #[arg(short, long)]
    topic: String,

    /// Target program length in minutes
    #[arg(short, long, default_value = "3", env = "DUOCAST_MINUTES")]
    minutes: u32,

    /// Per-request timeout in seconds (the backend's limit on a hung
    /// synthesis call)
    #[arg(long, default_value = "120", env = "DUOCAST_TIMEOUT_SECS")]
    timeout_secs: u64,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "duocast_player=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();

    info!("Backend: {}", args.backend);
    info!("Topic: '{}' ({} minutes)", args.topic, args.minutes);

    let client = BackendClient::new(&args.backend, Duration::from_secs(args.timeout_secs))
        .context("Failed to build backend client")?;

    let catalog = client
        .generate_catalog(&args.topic, args.minutes)
        .await
        .context("Failed to generate script catalog")?;

    let controller = PlaybackController::spawn(Arc::new(client), Arc::new(ClockOutput::new()));
    let mut events = controller.subscribe();

    controller.load_catalog(catalog);

    // Render the status feed until playback completes
    loop {
        match events.recv().await {
            Ok(event) => {
                let status = event.status();
                match status.level {
                    StatusLevel::Info => info!("{}", status.message),
                    StatusLevel::Error => error!("{}", status.message),
                }
                if matches!(event, PlayerEvent::PlaybackComplete { .. }) {
                    break;
                }
            }
            Err(tokio::sync::broadcast::error::RecvError::Lagged(skipped)) => {
                info!("Status feed lagged, skipped {} events", skipped);
            }
            Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
        }
    }

    let summary = controller.snapshot().await;
    info!(
        "Listened {} across {} segments ({} of {} words)",
        format_duration(summary.total_listened_seconds),
        summary.listened.len(),
        summary.words_spoken,
        summary.total_words
    );

    controller.shutdown();
    Ok(())
}
