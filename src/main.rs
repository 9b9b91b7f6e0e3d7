//! CLI entry point for rust-tether
//!
//! # Usage
//!
//! ```bash
//! tether --mock detect
//! tether --mock tree --json
//! tether --mock live --frames 48 --capture-at 24
//! tether --config config/tether.toml monitor --duration 60
//! ```
//!
//! Without `--mock` a hardware driver backend is required; none is compiled
//! into this build.

use anyhow::Result;
use clap::{Parser, Subcommand};
use rust_tether::config::TetherConfig;
use rust_tether::logging;
use rust_tether::{AppError, AppResult, ChannelBridge, Notification, TetherCamera};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tether_core::DriverBackend;
use tether_driver_mock::MockCamera;
use tokio::task::block_in_place;
use tokio::time::{timeout, Instant};

#[derive(Parser)]
#[command(name = "tether")]
#[command(about = "Tethered camera control", long_about = None)]
struct Cli {
    /// Configuration file (defaults to config/tether.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Drive the simulated camera instead of hardware
    #[arg(long, global = true)]
    mock: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List attached cameras
    Detect,
    /// List transports known to the driver
    Ports,
    /// Print driver library and tool versions
    Version,
    /// Print the camera summary
    Summary,
    /// Dump the configuration tree
    Tree {
        #[arg(long)]
        json: bool,
    },
    /// Show capability flags for the connected model
    Capabilities {
        #[arg(long)]
        json: bool,
    },
    /// Capture one image and save it under the storage root
    Capture,
    /// Set one configuration widget
    Set { name: String, value: String },
    /// Watch for files added on the camera body
    Monitor {
        /// Seconds to watch
        #[arg(long, default_value = "30")]
        duration: u64,
    },
    /// Stream live preview frames
    Live {
        /// Frames to receive before stopping
        #[arg(long, default_value = "48")]
        frames: usize,

        /// Request a capture after this many frames
        #[arg(long)]
        capture_at: Option<usize>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = load_config(cli.config.as_deref())?;
    logging::init_from_config(&config).map_err(AppError::Logging)?;

    let (backend, mock) = select_backend(cli.mock)?;
    let camera = TetherCamera::new(backend, &config);

    match cli.command {
        Commands::Detect => block_in_place(|| detect(&camera)),
        Commands::Ports => block_in_place(|| ports(&camera)),
        Commands::Version => {
            println!("tether {}", env!("CARGO_PKG_VERSION"));
            println!("driver: {}", camera.library_version());
            Ok(())
        }
        command => {
            block_in_place(|| camera.open())?;
            let result = run_session(&camera, mock.as_ref(), command).await;
            block_in_place(|| camera.shutdown());
            result
        }
    }
}

fn load_config(path: Option<&Path>) -> AppResult<TetherConfig> {
    let config = match path {
        Some(path) => TetherConfig::load_from(path)?,
        None => TetherConfig::load()?,
    };
    config.validate().map_err(AppError::Configuration)?;
    Ok(config)
}

fn select_backend(mock: bool) -> AppResult<(Arc<dyn DriverBackend>, Option<MockCamera>)> {
    if mock {
        let camera = MockCamera::new();
        Ok((camera.backend(), Some(camera)))
    } else {
        Err(AppError::NoBackend)
    }
}

fn detect(camera: &TetherCamera) -> Result<()> {
    let cameras = camera.autodetect()?;
    if cameras.is_empty() {
        println!("No cameras detected");
    }
    for detected in cameras {
        println!("{}", detected);
    }
    Ok(())
}

fn ports(camera: &TetherCamera) -> Result<()> {
    for port in camera.port_info()? {
        println!("{}\t{}", port.name, port.path);
    }
    Ok(())
}

async fn run_session(
    camera: &TetherCamera,
    mock: Option<&MockCamera>,
    command: Commands,
) -> Result<()> {
    match command {
        Commands::Summary => println!("{}", block_in_place(|| camera.summary())?),
        Commands::Tree { json } => {
            if json {
                println!("{}", block_in_place(|| camera.config_json())?);
            } else {
                print!("{}", block_in_place(|| camera.config_text())?);
            }
        }
        Commands::Capabilities { json } => {
            let report = block_in_place(|| camera.list_capabilities())?;
            if json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                print!("{}", report.render_text());
            }
        }
        Commands::Capture => {
            let path = block_in_place(|| camera.capture())?;
            println!("Saved {}", path.display());
        }
        Commands::Set { name, value } => {
            let written = block_in_place(|| camera.set_config_value(&name, &value))?;
            println!("{} = {:?}", name, written);
        }
        Commands::Monitor { duration } => {
            monitor(camera, mock, Duration::from_secs(duration)).await?;
        }
        Commands::Live { frames, capture_at } => live(camera, frames, capture_at).await?,
        Commands::Detect | Commands::Ports | Commands::Version => {}
    }
    Ok(())
}

async fn monitor(camera: &TetherCamera, mock: Option<&MockCamera>, duration: Duration) -> Result<()> {
    let (bridge, mut rx) = ChannelBridge::new();
    camera.start_event_monitor(bridge)?;
    println!("Watching for new files for {}s", duration.as_secs());

    if let Some(mock) = mock {
        let remote = mock.shoot_on_body("IMG_BODY.JPG");
        println!("Simulated shutter press: {}", remote);
    }

    let deadline = Instant::now() + duration;
    loop {
        let remaining = deadline.saturating_duration_since(Instant::now());
        match timeout(remaining, rx.recv()).await {
            Ok(Some(Notification::FileCaptured(path))) => println!("New file {}", path.display()),
            Ok(Some(Notification::CaptureFailed(status))) => eprintln!("Download failed: {}", status),
            Ok(Some(_)) => {}
            Ok(None) | Err(_) => break,
        }
    }

    camera.stop_event_monitor();
    Ok(())
}

async fn live(camera: &TetherCamera, frames: usize, capture_at: Option<usize>) -> Result<()> {
    let (bridge, mut rx) = ChannelBridge::new();
    block_in_place(|| camera.start_live_preview(bridge))?;

    let mut received = 0usize;
    let mut awaiting_capture = false;
    while received < frames || awaiting_capture {
        let notification = match timeout(Duration::from_secs(5), rx.recv()).await {
            Ok(Some(notification)) => notification,
            Ok(None) => break,
            Err(_) => {
                eprintln!("No preview frame for 5s");
                break;
            }
        };
        match notification {
            Notification::Frame(frame) => {
                received += 1;
                tracing::debug!(frame = received, bytes = frame.len(), "Preview frame");
                if capture_at == Some(received) {
                    camera.request_capture();
                    awaiting_capture = true;
                }
            }
            Notification::LiveCapture(path) => {
                println!("Captured {}", path.display());
                awaiting_capture = false;
            }
            Notification::CaptureFailed(status) => {
                eprintln!("Capture failed: {}", status);
                awaiting_capture = false;
            }
            Notification::FileCaptured(_) => {}
        }
    }

    block_in_place(|| camera.stop_live_preview());
    println!("Received {} frames", received);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use tether_driver_mock::TimingConfig;

    #[tokio::test(flavor = "multi_thread", worker_threads = 1)]
    async fn slow_capture_leaves_runtime_responsive() {
        let dir = tempfile::tempdir().unwrap();
        let mock = MockCamera::builder()
            .timing(TimingConfig {
                capture_time: Duration::from_millis(300),
                ..TimingConfig::instant()
            })
            .build();
        let mut config = TetherConfig::default();
        config.storage.root = dir.path().to_path_buf();
        let camera = Arc::new(TetherCamera::new(mock.backend(), &config));
        camera.open().unwrap();

        let ticks = Arc::new(AtomicU32::new(0));
        let ticker = {
            let ticks = Arc::clone(&ticks);
            tokio::spawn(async move {
                loop {
                    tokio::time::sleep(Duration::from_millis(10)).await;
                    ticks.fetch_add(1, Ordering::SeqCst);
                }
            })
        };
        // the only worker runs the session; the ticker needs it handed off
        let session = {
            let camera = Arc::clone(&camera);
            tokio::spawn(async move { run_session(&camera, None, Commands::Capture).await })
        };
        session.await.unwrap().unwrap();
        ticker.abort();

        assert!(ticks.load(Ordering::SeqCst) >= 5);
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 1);
        camera.shutdown();
    }
}
