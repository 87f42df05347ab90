//! # Teleop Bridge
//!
//! Drive a tank-steer vehicle with a gamepad over Bluetooth LE.
//!
//! This application reads a DualShock/DualSense controller and sends motor
//! and jump commands to the vehicle firmware.

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::{info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

use teleop_bridge::config::{Config, LinkKind, LoggingConfig};
use teleop_bridge::controller::gamepad::EvdevSource;
use teleop_bridge::controller::shared::SharedState;
use teleop_bridge::controller::state::ControllerState;
use teleop_bridge::controller::status::LogObserver;
use teleop_bridge::session::run_session;
use teleop_bridge::transport::{BleTransport, SerialTransport, Transport};

/// Config file used when neither an argument nor the environment names one
const DEFAULT_CONFIG_PATH: &str = "config/default.toml";

/// Environment variable naming the config file
const CONFIG_ENV_VAR: &str = "TELEOP_BRIDGE_CONFIG";

/// File name prefix of the daily log files
const LOG_FILE_PREFIX: &str = "teleop-bridge.log";

/// Main entry point for Teleop Bridge application
///
/// # Control Flow
///
/// 1. **Initialization**
///    - Load configuration and set up logging
///    - Connect to the vehicle over the configured link
///
/// 2. **Session**
///    - Read the gamepad on a background task, reconnecting when it drops
///    - Send commands every `dispatch.period_ms`
///    - Ctrl+C or the PS button requests exit
///
/// 3. **Shutdown**
///    - Close the link
///    - Report why the session ended; exit non-zero unless the operator asked
///
/// # Errors
///
/// Returns error if:
/// - The configuration is invalid
/// - The vehicle cannot be found or connected
///
/// # Examples
///
/// ```bash
/// cargo run --release -- config/default.toml
/// ```
///
/// Expected output:
/// ```text
/// INFO teleop_bridge: Teleop Bridge v0.1.0 starting...
/// INFO teleop_bridge::transport::ble: Scanning for BLE device "ESP32_BLE_MAKAIZO"...
/// INFO teleop_bridge::transport::ble: BLE connected: ESP32_BLE_MAKAIZO (24:0A:C4:00:00:01)
/// INFO teleop_bridge::controller::gamepad: Found Sony gamepad at: /dev/input/event5
/// ```
#[tokio::main]
async fn main() -> Result<ExitCode> {
    let path = resolve_config_path(std::env::args_os().nth(1), std::env::var_os(CONFIG_ENV_VAR));
    let config = match &path {
        Some(path) => Config::load(path)
            .with_context(|| format!("Failed to load config from {}", path.display()))?,
        None => Config::default(),
    };

    // Must outlive every log call
    let _log_guard = init_logging(&config.logging);

    info!("Teleop Bridge v{} starting...", env!("CARGO_PKG_VERSION"));
    match &path {
        Some(path) => info!("Loaded config from {}", path.display()),
        None => info!("No config file found, using defaults"),
    }

    let link = open_link(&config).await?;
    info!("Vehicle link ready: {}", link.describe());

    let state = Arc::new(SharedState::new(
        ControllerState::with_deadzone(config.controller.deadzone),
        Arc::new(LogObserver),
    ));

    let signal_state = Arc::clone(&state);
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("Received Ctrl+C, shutting down...");
                signal_state.request_exit();
            }
            Err(e) => warn!("Ctrl+C handler unavailable: {}", e),
        }
    });

    log_controls();

    let source = EvdevSource::new(config.device_path());
    let outcome = run_session(state, link, source, &config).await;

    if outcome.is_success() {
        Ok(ExitCode::SUCCESS)
    } else {
        eprintln!("{}", outcome);
        Ok(ExitCode::FAILURE)
    }
}

/// First CLI argument, else the environment variable, else the default file if present
fn resolve_config_path(arg: Option<OsString>, env: Option<OsString>) -> Option<PathBuf> {
    arg.filter(|path| !path.is_empty())
        .or(env.filter(|path| !path.is_empty()))
        .map(PathBuf::from)
        .or_else(|| {
            let default = Path::new(DEFAULT_CONFIG_PATH);
            default.exists().then(|| default.to_path_buf())
        })
}

/// Set up stderr logging and, when `log_dir` is set, a daily log file
///
/// `RUST_LOG` overrides the configured level.
fn init_logging(config: &LoggingConfig) -> Option<WorkerGuard> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level));
    let stderr_layer = fmt::layer().with_writer(std::io::stderr);

    if config.log_dir.is_empty() {
        tracing_subscriber::registry()
            .with(filter)
            .with(stderr_layer)
            .init();
        return None;
    }

    let appender = tracing_appender::rolling::daily(&config.log_dir, LOG_FILE_PREFIX);
    let (writer, guard) = tracing_appender::non_blocking(appender);

    tracing_subscriber::registry()
        .with(filter)
        .with(stderr_layer)
        .with(fmt::layer().with_ansi(false).with_writer(writer))
        .init();

    Some(guard)
}

/// Connect to the vehicle over the configured link
async fn open_link(config: &Config) -> Result<Box<dyn Transport>> {
    let link: Box<dyn Transport> = match config.link.kind {
        LinkKind::Ble => {
            let settings = config.ble_settings()?;
            Box::new(
                BleTransport::discover(&settings)
                    .await
                    .context("Failed to connect to vehicle over BLE")?,
            )
        }
        LinkKind::Serial => Box::new(
            SerialTransport::open(&config.link.serial_port, config.link.baud_rate)
                .context("Failed to open serial link to vehicle")?,
        ),
    };
    Ok(link)
}

fn log_controls() {
    info!("Controls:");
    info!("  Left stick        drive (left wheel in split mode)");
    info!("  Right stick       right wheel (split mode only)");
    info!("  L1 / L2 (hold)    slow 3/4 / super slow 1/2");
    info!("  R1                jump");
    info!("  D-Pad up/down     jump level +1 / -1");
    info!("  D-Pad left/right  toggle split mode");
    info!("  PS or Ctrl+C      exit");
}
