use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use facegate_core::{Config, EnrollOutcome, Enrollment, Gallery, ScrfdDetector};
use facegate_hw::Camera;
use facegate_store::GalleryStore;
use std::io::{BufRead, Write};
use std::path::{Path, PathBuf};

mod operator;

use operator::LineInput;

#[derive(Parser)]
#[command(name = "facegate", about = "facegate enrollment and audit CLI", version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Enroll a new identity from the camera
    Enroll {
        /// Gallery database
        db_path: PathBuf,
        /// SCRFD face detector ONNX model
        detector_model: PathBuf,
        /// Name to enroll (prompted for when omitted)
        #[arg(short, long)]
        name: Option<String>,
    },
    /// List enrolled identities
    List {
        db_path: PathBuf,
        #[arg(long)]
        json: bool,
    },
    /// Show recent access events
    Events {
        db_path: PathBuf,
        #[arg(short, long, default_value_t = 20)]
        limit: usize,
        #[arg(long)]
        json: bool,
    },
    /// Show recent alerts
    Alerts {
        db_path: PathBuf,
        #[arg(short, long, default_value_t = 20)]
        limit: usize,
        /// Only alerts not yet resolved
        #[arg(long)]
        unresolved: bool,
        #[arg(long)]
        json: bool,
    },
    /// List V4L2 capture devices
    Devices,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Enroll {
            db_path,
            detector_model,
            name,
        } => enroll(&db_path, &detector_model, name),
        Commands::List { db_path, json } => list(&db_path, json),
        Commands::Events { db_path, limit, json } => events(&db_path, limit, json),
        Commands::Alerts {
            db_path,
            limit,
            unresolved,
            json,
        } => alerts(&db_path, limit, unresolved, json),
        Commands::Devices => {
            let devices = Camera::list_devices();
            if devices.is_empty() {
                println!("No V4L2 capture devices found");
            }
            for dev in devices {
                println!("{}  {} ({}, {})", dev.path, dev.name, dev.driver, dev.bus);
            }
            Ok(())
        }
    }
}

fn open_store(db_path: &Path) -> Result<GalleryStore> {
    let store =
        GalleryStore::open(db_path).with_context(|| format!("failed to open gallery {}", db_path.display()))?;
    tracing::debug!(db = %db_path.display(), "gallery opened");
    Ok(store)
}

fn prompt_name() -> Result<String> {
    print!("Name: ");
    std::io::stdout().flush()?;
    let mut line = String::new();
    std::io::stdin().lock().read_line(&mut line).context("failed to read name")?;
    Ok(line.trim().to_string())
}

fn enroll(db_path: &Path, detector_model: &Path, name: Option<String>) -> Result<()> {
    let name = match name {
        Some(name) => name.trim().to_string(),
        None => prompt_name()?,
    };
    if name.is_empty() {
        bail!("name must not be empty");
    }

    let config = Config::load().context("failed to load configuration")?;
    let mut store = open_store(db_path)?;
    let detector = ScrfdDetector::load(detector_model, config.detector_confidence)
        .with_context(|| format!("failed to load detector {}", detector_model.display()))?;
    let mut camera = Camera::open(&config.camera_device)
        .with_context(|| format!("failed to open camera {}", config.camera_device))?;
    let dark_frames = camera
        .warm_up(config.warmup_frames)
        .context("camera warm-up failed")?;
    tracing::info!(
        camera = %camera.device_path,
        width = camera.width,
        height = camera.height,
        dark_frames,
        "camera ready"
    );

    println!("Enrolling {name}. Face the camera, press Enter to capture or q then Enter to cancel.");
    let mut operator = LineInput::stdin();
    let mut flow = Enrollment::new(camera, detector, config.timing());

    let outcome = flow.run(&name, &mut store, &mut operator).context("enrollment failed")?;
    match &outcome {
        EnrollOutcome::Enrolled { id, .. } => {
            tracing::info!(id = *id, name = %name, db = %db_path.display(), "enrollment complete")
        }
        EnrollOutcome::Cancelled => tracing::info!(name = %name, "enrollment cancelled by operator"),
    }
    println!("{}", outcome_summary(&name, &outcome));
    Ok(())
}

fn outcome_summary(name: &str, outcome: &EnrollOutcome) -> String {
    match outcome {
        EnrollOutcome::Enrolled { id, descriptor } => {
            format!("Enrolled {name} (id {id}, {} bins)", descriptor.len())
        }
        EnrollOutcome::Cancelled => "Enrollment cancelled".to_string(),
    }
}

fn list(db_path: &Path, json: bool) -> Result<()> {
    let store = open_store(db_path)?;
    let identities = store.all_identities().context("failed to read gallery")?;
    tracing::debug!(count = identities.len(), "identities loaded");

    if json {
        let rows: Vec<_> = identities
            .iter()
            .map(|i| serde_json::json!({ "id": i.id, "name": i.name, "bins": i.descriptor.len() }))
            .collect();
        println!("{}", serde_json::to_string_pretty(&rows)?);
        return Ok(());
    }

    if identities.is_empty() {
        println!("No identities enrolled");
    }
    for identity in &identities {
        println!("{:>5}  {}", identity.id, identity.name);
    }
    Ok(())
}

fn events(db_path: &Path, limit: usize, json: bool) -> Result<()> {
    let records = open_store(db_path)?
        .recent_events(limit)
        .context("failed to read events")?;

    if json {
        println!("{}", serde_json::to_string_pretty(&records)?);
        return Ok(());
    }
    for event in &records {
        println!("{}  {:<16} {}", event.timestamp, event.name, event.description);
    }
    Ok(())
}

fn alerts(db_path: &Path, limit: usize, unresolved: bool, json: bool) -> Result<()> {
    let records = open_store(db_path)?
        .recent_alerts(limit, unresolved)
        .context("failed to read alerts")?;

    if json {
        println!("{}", serde_json::to_string_pretty(&records)?);
        return Ok(());
    }
    for alert in &records {
        let state = if alert.resolved { "resolved" } else { "open" };
        println!("{}  [{state}] {}", alert.timestamp, alert.message);
    }
    Ok(())
}
