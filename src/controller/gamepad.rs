//! # Gamepad Module
//!
//! Gamepad detection, connection and event reading using the Linux evdev
//! interface.
//!
//! ## Controller Detection
//!
//! Sony controllers are preferred when several gamepads are present:
//! - Vendor ID: 0x054c (Sony)
//! - Product IDs: 0x05c4 / 0x09cc (DualShock 4), 0x0ce6 (DualSense)
//!
//! Any other device exposing both a left stick Y axis and an R1 button is
//! accepted as a fallback.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use evdev::{AbsoluteAxisType, Device, EventStream, Key};
use tracing::{debug, info};

use super::mapper::translate;
use super::source::InputSource;
use super::state::ControllerEvent;
use crate::error::{BridgeError, Result};

/// Sony vendor ID
const SONY_VENDOR_ID: u16 = 0x054c;

/// Sony gamepad product IDs (DualShock 4 v1, DualShock 4 v2, DualSense)
const SONY_GAMEPAD_PRODUCT_IDS: &[u16] = &[0x05c4, 0x09cc, 0x0ce6];

/// Gamepad handle
///
/// Represents an open evdev gamepad device.
pub struct Gamepad {
    device: Device,
    device_path: String,
}

impl std::fmt::Debug for Gamepad {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Gamepad")
            .field("device_path", &self.device_path)
            .finish_non_exhaustive()
    }
}

impl Gamepad {
    /// Open a gamepad
    ///
    /// With `Some(path)` that device is opened directly. With `None`, all
    /// `/dev/input/event*` devices are scanned and the first Sony gamepad is
    /// chosen, else the first generic gamepad.
    ///
    /// # Errors
    ///
    /// - `ControllerNotFound`: No gamepad found on the system
    /// - `InputSourceUnavailable`: The given device could not be opened
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use teleop_bridge::controller::gamepad::Gamepad;
    ///
    /// let gamepad = Gamepad::open(None)?;
    /// println!("Connected to gamepad at: {}", gamepad.device_path());
    /// # Ok::<(), Box<dyn std::error::Error>>(())
    /// ```
    pub fn open(device_path: Option<&str>) -> Result<Self> {
        match device_path {
            Some(path) => Self::open_path(Path::new(path)),
            None => Self::detect(Path::new("/dev/input")),
        }
    }

    /// Open a specific event device
    fn open_path(path: &Path) -> Result<Self> {
        let device = Device::open(path).map_err(|e| {
            BridgeError::InputSourceUnavailable(format!("Failed to open {}: {}", path.display(), e))
        })?;

        info!("Opened gamepad at: {}", path.display());
        Ok(Self {
            device,
            device_path: path.to_string_lossy().to_string(),
        })
    }

    /// Scan an input directory for a gamepad
    fn detect(input_dir: &Path) -> Result<Self> {
        if !input_dir.exists() {
            return Err(BridgeError::InputSourceUnavailable(format!(
                "{} directory not found",
                input_dir.display()
            )));
        }

        let mut paths: Vec<PathBuf> = std::fs::read_dir(input_dir)
            .map_err(|e| {
                BridgeError::InputSourceUnavailable(format!(
                    "Failed to read {}: {}",
                    input_dir.display(),
                    e
                ))
            })?
            .filter_map(|entry| entry.ok().map(|entry| entry.path()))
            .filter(|path| {
                path.file_name()
                    .map(|name| name.to_string_lossy().starts_with("event"))
                    .unwrap_or(false)
            })
            .collect();

        // Sort for deterministic device selection when multiple gamepads are connected
        paths.sort();

        let mut fallback: Option<(Device, PathBuf)> = None;

        for path in paths {
            let device = match Device::open(&path) {
                Ok(device) => device,
                Err(e) => {
                    // Permission denied or other errors - skip device
                    debug!("Could not open {}: {}", path.display(), e);
                    continue;
                }
            };

            let id = device.input_id();
            debug!(
                "Found input device: {} (vendor: 0x{:04x}, product: 0x{:04x})",
                path.display(),
                id.vendor(),
                id.product()
            );

            if !is_gamepad(&device) {
                continue;
            }

            if is_sony_gamepad(id.vendor(), id.product()) {
                info!("Found Sony gamepad at: {}", path.display());
                return Ok(Self {
                    device,
                    device_path: path.to_string_lossy().to_string(),
                });
            }

            if fallback.is_none() {
                fallback = Some((device, path));
            }
        }

        match fallback {
            Some((device, path)) => {
                info!("Found gamepad at: {}", path.display());
                Ok(Self {
                    device,
                    device_path: path.to_string_lossy().to_string(),
                })
            }
            None => Err(BridgeError::ControllerNotFound),
        }
    }

    /// Get the device path of this gamepad
    pub fn device_path(&self) -> &str {
        &self.device_path
    }

    /// Get gamepad name from evdev
    pub fn name(&self) -> Option<&str> {
        self.device.name()
    }

    /// Convert into an async event stream on the tokio reactor
    pub fn into_event_stream(self) -> Result<EventStream> {
        let path = self.device_path;
        self.device.into_event_stream().map_err(|e| {
            BridgeError::InputSourceUnavailable(format!("Failed to stream {}: {}", path, e))
        })
    }
}

/// Whether a vendor/product pair is a known Sony gamepad
fn is_sony_gamepad(vendor: u16, product: u16) -> bool {
    vendor == SONY_VENDOR_ID && SONY_GAMEPAD_PRODUCT_IDS.contains(&product)
}

/// Whether the device exposes the inputs needed to drive
fn is_gamepad(device: &Device) -> bool {
    let has_stick = device
        .supported_absolute_axes()
        .map_or(false, |axes| axes.contains(AbsoluteAxisType::ABS_Y));
    let has_trigger = device
        .supported_keys()
        .map_or(false, |keys| keys.contains(Key::BTN_TR));
    has_stick && has_trigger
}

/// [`InputSource`] backed by an evdev gamepad
#[derive(Default)]
pub struct EvdevSource {
    device_path: Option<String>,
    stream: Option<EventStream>,
}

impl std::fmt::Debug for EvdevSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EvdevSource")
            .field("device_path", &self.device_path)
            .field("connected", &self.stream.is_some())
            .finish()
    }
}

impl EvdevSource {
    /// Create a source. An empty or missing path means auto-detect.
    #[must_use]
    pub fn new(device_path: Option<String>) -> Self {
        Self {
            device_path: device_path.filter(|path| !path.is_empty()),
            stream: None,
        }
    }
}

#[async_trait]
impl InputSource for EvdevSource {
    async fn connect(&mut self) -> Result<()> {
        // Directory scan and device open block
        let device_path = self.device_path.clone();
        let gamepad = tokio::task::spawn_blocking(move || Gamepad::open(device_path.as_deref()))
            .await
            .map_err(|e| {
                BridgeError::InputSourceUnavailable(format!("Gamepad scan failed: {}", e))
            })??;
        if let Some(name) = gamepad.name() {
            info!("Gamepad name: {}", name);
        }
        self.stream = Some(gamepad.into_event_stream()?);
        Ok(())
    }

    async fn next_event(&mut self) -> Result<Option<ControllerEvent>> {
        let stream = self.stream.as_mut().ok_or_else(|| {
            BridgeError::InputSourceUnavailable("gamepad not connected".to_string())
        })?;

        let event = stream.next_event().await.map_err(|e| {
            BridgeError::InputSourceUnavailable(format!("Failed to read event: {}", e))
        })?;

        Ok(translate(&event))
    }

    fn disconnect(&mut self) {
        if self.stream.take().is_some() {
            debug!("Released gamepad");
        }
    }
}
