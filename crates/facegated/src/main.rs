use anyhow::{Context, Result};
use clap::Parser;
use facegate_core::{Config, DecisionLoop, ScrfdDetector};
use facegate_hw::Camera;
use facegate_store::GalleryStore;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::signal::unix::{signal, SignalKind};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "facegated", about = "Face-recognition access-control daemon", version)]
struct Args {
    /// Gallery database (created if absent)
    db_path: PathBuf,
    /// SCRFD face detector ONNX model
    detector_model: PathBuf,
}

type Gate = DecisionLoop<Camera, ScrfdDetector, GalleryStore>;

/// Acquire the store, detector and camera. Any failure aborts startup.
fn open_gate(args: &Args, config: &Config) -> Result<Gate> {
    let store = GalleryStore::open(&args.db_path)
        .with_context(|| format!("failed to open gallery {}", args.db_path.display()))?;
    let enrolled = store.identity_count().context("failed to read gallery")?;

    let detector = ScrfdDetector::load(&args.detector_model, config.detector_confidence)
        .with_context(|| format!("failed to load detector {}", args.detector_model.display()))?;

    let mut camera = Camera::open(&config.camera_device)
        .with_context(|| format!("failed to open camera {}", config.camera_device))?;
    let dark_frames = camera
        .warm_up(config.warmup_frames)
        .context("camera warm-up failed")?;

    tracing::info!(
        db = %args.db_path.display(),
        enrolled,
        camera = %camera.device_path,
        width = camera.width,
        height = camera.height,
        dark_frames,
        "gate ready"
    );

    Ok(DecisionLoop::new(camera, detector, store, config.policy(), config.timing()))
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let args = Args::parse();
    let config = Config::load().context("failed to load configuration")?;
    tracing::info!(?config, "facegated starting");

    let mut gate = open_gate(&args, &config)?;

    let stop = Arc::new(AtomicBool::new(false));
    let loop_stop = Arc::clone(&stop);
    let mut worker = tokio::task::spawn_blocking(move || gate.run(&loop_stop));

    let mut sigterm = signal(SignalKind::terminate()).context("failed to install SIGTERM handler")?;
    tokio::select! {
        res = tokio::signal::ctrl_c() => {
            res.context("failed to listen for SIGINT")?;
            tracing::info!("SIGINT received");
        }
        _ = sigterm.recv() => tracing::info!("SIGTERM received"),
        res = &mut worker => {
            res.context("decision loop panicked")?;
            tracing::warn!("decision loop exited on its own");
            return Ok(());
        }
    }

    // The loop notices the flag after its current iteration; the camera,
    // detector and store are released when it returns.
    stop.store(true, Ordering::Relaxed);
    worker.await.context("decision loop panicked")?;
    tracing::info!("facegated shut down");
    Ok(())
}
