//! pimatrix
//!
//! Drives test patterns to a HUB75 RGB matrix panel: loads the TOML
//! configuration, runs the scan-out engine on a dedicated thread, and
//! feeds it frames until a signal or the requested duration ends the
//! session.

mod config;
mod patterns;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use pimatrix_hw::{FrameBuffer, FramePair, Hub75Engine};

use config::Config;
use patterns::Pattern;

/// Pattern animation rate. Decoupled from the panel refresh rate: the
/// engine rescans the last published frame until a new one arrives.
const PATTERN_TICK: Duration = Duration::from_millis(33);

#[derive(Parser)]
#[command(name = "pimatrix")]
#[command(about = "Test-pattern driver for HUB75 RGB matrix panels")]
#[command(version)]
struct Cli {
    /// Configuration file (TOML); defaults apply when absent
    #[arg(short, long)]
    config: Option<String>,

    /// Test pattern to display
    #[arg(short, long, default_value = "solid", value_enum)]
    pattern: Pattern,

    /// Stop after this many seconds (default: run until signalled)
    #[arg(short, long)]
    duration: Option<u64>,

    /// Override the configured target frame rate
    #[arg(long)]
    fps_limit: Option<u32>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(default_level.parse()?))
        .init();

    let config = match &cli.config {
        Some(path) => {
            let config = Config::load(path).context("Failed to load configuration")?;
            info!("Loaded configuration from: {}", path);
            config
        }
        None => Config::default(),
    };

    let mut matrix = config.into_matrix_config()?;
    if let Some(fps) = cli.fps_limit {
        matrix.frame_rate = fps;
    }
    let width = matrix.width;
    let height = matrix.height;

    let engine = Hub75Engine::new(&matrix).context("Failed to open the matrix hardware")?;

    let frames = Arc::new(FramePair::new(width, height));
    let shutdown = Arc::new(AtomicBool::new(false));

    // Scan-out runs on its own OS thread; its timing must not share a
    // scheduler with the async tasks below.
    let scan_frames = frames.clone();
    let scan_shutdown = shutdown.clone();
    let scan_thread = std::thread::Builder::new()
        .name("scanout".to_string())
        .spawn(move || {
            let mut engine = engine;
            engine.run(&scan_frames, &scan_shutdown)
        })
        .context("Failed to spawn the scan-out thread")?;

    // Frame producer: render the pattern and publish at its own cadence.
    let producer_frames = frames.clone();
    let producer_shutdown = shutdown.clone();
    let pattern = cli.pattern;
    let producer = tokio::spawn(async move {
        let mut scratch = FrameBuffer::new(width, height);
        let mut ticker = tokio::time::interval(PATTERN_TICK);
        let mut tick: u64 = 0;
        while !producer_shutdown.load(Ordering::Relaxed) {
            ticker.tick().await;
            pattern.render(&mut scratch, tick);
            producer_frames.publish(&scratch);
            tick += 1;
        }
    });

    let mut sigterm = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())?;
    let mut sigint = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::interrupt())?;

    tokio::select! {
        _ = sigterm.recv() => {
            info!("Received SIGTERM, shutting down");
        }
        _ = sigint.recv() => {
            info!("Received SIGINT, shutting down");
        }
        _ = run_for(cli.duration) => {
            info!("Requested duration elapsed, shutting down");
        }
    }

    shutdown.store(true, Ordering::Relaxed);
    producer.abort();

    // The scan thread notices the flag at the next frame boundary and
    // tears the hardware down in order.
    match scan_thread.join() {
        Ok(Ok(())) => Ok(()),
        Ok(Err(e)) => {
            warn!("scan-out ended with an error: {}", e);
            Err(e.into())
        }
        Err(_) => Err(anyhow!("scan-out thread panicked")),
    }
}

/// Resolves after the requested number of seconds, or never.
async fn run_for(duration: Option<u64>) {
    match duration {
        Some(secs) => tokio::time::sleep(Duration::from_secs(secs)).await,
        None => std::future::pending().await,
    }
}
