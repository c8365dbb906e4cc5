//! driftplay - demo entry point
//!
//! Runs the crossfade scheduler against simulated player handles: loads a
//! playlist (JSON file or a built-in sample pair), wires two simulated
//! decoders onto the notice channel, and logs diagnostic events and render
//! plan changes until Ctrl+C.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::signal;
use tracing::{debug, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use driftplay::player::{notice_channel, SimMedia, SimulatedPlayer};
use driftplay::{Clip, CrossfadeScheduler, EngineConfig, Playlist, SlotId, TransitionMode};

/// Command-line arguments for driftplay
#[derive(Parser, Debug)]
#[command(name = "driftplay")]
#[command(about = "Ambient looping video presentation engine (simulated playback)")]
#[command(version)]
struct Args {
    /// Playlist JSON file (array of {url, title, declared_duration_ms})
    #[arg(short, long, env = "DRIFTPLAY_PLAYLIST")]
    playlist: Option<PathBuf>,

    /// Engine configuration TOML file
    #[arg(short, long, env = "DRIFTPLAY_CONFIG")]
    config: Option<PathBuf>,

    /// Override the transition mode (cut or crossfade)
    #[arg(short, long)]
    mode: Option<String>,

    /// Simulated media duration for clips without a declared one, seconds
    #[arg(long, default_value = "30")]
    clip_seconds: u64,
}

/// Built-in sample playlist used when no file is given
fn sample_playlist() -> Result<Playlist> {
    let clips = vec![
        Clip::new("https://example.com/loops/coastline-dusk.mov", "Coastline at Dusk")
            .with_duration(30_000),
        Clip::new("https://example.com/loops/city-overpass.mov", "City Overpass")
            .with_duration(30_000),
    ];
    Ok(Playlist::new(clips)?)
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "driftplay=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => EngineConfig::from_toml_file(path)
            .with_context(|| format!("failed to load config from {}", path.display()))?,
        None => EngineConfig::default(),
    };
    if let Some(mode) = &args.mode {
        config.mode = mode.parse::<TransitionMode>()?;
    }

    let playlist = match &args.playlist {
        Some(path) => Playlist::from_json_file(path)
            .with_context(|| format!("failed to load playlist from {}", path.display()))?,
        None => sample_playlist()?,
    };

    info!(
        mode = %config.mode,
        clips = playlist.len(),
        "starting driftplay"
    );

    // Two simulated decoders stand in for the real playback engine
    let media = Arc::new(SimMedia::new(args.clip_seconds * 1000));
    let (notice_tx, notice_rx) = notice_channel();
    let player_a = SimulatedPlayer::new(SlotId::A, notice_tx.clone(), media.clone())
        .with_prepare_latency(std::time::Duration::from_millis(250));
    let player_b = SimulatedPlayer::new(SlotId::B, notice_tx, media)
        .with_prepare_latency(std::time::Duration::from_millis(250));

    let (scheduler, handle) = CrossfadeScheduler::new(
        config,
        playlist,
        Box::new(player_a),
        Box::new(player_b),
        notice_rx,
    )?;

    // Log the diagnostic stream
    let mut events = handle.subscribe_events();
    tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            info!(?event, "engine event");
        }
    });

    // Log render plan changes (the compositor collaborator would draw these)
    let mut render = handle.render_plan();
    tokio::spawn(async move {
        while render.changed().await.is_ok() {
            let plan = *render.borrow_and_update();
            debug!(?plan, "render plan updated");
        }
    });

    let session = tokio::spawn(scheduler.run());

    signal::ctrl_c().await.context("failed to listen for Ctrl+C")?;
    info!("received Ctrl+C, shutting down");
    handle.shutdown();

    session.await.context("scheduler task panicked")??;
    info!("session ended");
    Ok(())
}
