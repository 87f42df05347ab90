//! # Configuration Module
//!
//! Handles loading and validating configuration from TOML files.

use serde::de::Error;
use serde::Deserialize;
use std::fs;
use std::path::Path;
use std::time::Duration;
use uuid::Uuid;

use crate::controller::ingest::IngestSettings;
use crate::error::{BridgeError, Result};
use crate::transport::BleSettings;

/// Main configuration structure
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct Config {
    #[serde(default)]
    pub link: LinkConfig,
    #[serde(default)]
    pub controller: ControllerConfig,
    #[serde(default)]
    pub dispatch: DispatchConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Which physical link carries commands to the vehicle
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LinkKind {
    Ble,
    Serial,
}

/// Vehicle link configuration
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct LinkConfig {
    #[serde(default = "default_link_kind")]
    pub kind: LinkKind,

    #[serde(default = "default_device_name")]
    pub device_name: String,

    #[serde(default = "default_service_uuid")]
    pub service_uuid: String,

    #[serde(default = "default_characteristic_uuid")]
    pub characteristic_uuid: String,

    #[serde(default = "default_scan_timeout_s")]
    pub scan_timeout_s: u64,

    #[serde(default = "default_serial_port")]
    pub serial_port: String,

    #[serde(default = "default_baud_rate")]
    pub baud_rate: u32,
}

/// Controller configuration
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct ControllerConfig {
    #[serde(default)]
    pub device_path: String,

    #[serde(default = "default_deadzone")]
    pub deadzone: i32,

    #[serde(default = "default_reconnect_interval_ms")]
    pub reconnect_interval_ms: u64,

    #[serde(default)]
    pub max_reconnect_attempts: u32,
}

/// Dispatch loop configuration
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct DispatchConfig {
    #[serde(default = "default_period_ms")]
    pub period_ms: u64,
}

/// Logging configuration
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,

    #[serde(default)]
    pub log_dir: String,
}

// Default value functions
fn default_link_kind() -> LinkKind { LinkKind::Ble }
fn default_device_name() -> String { "ESP32_BLE_MAKAIZO".to_string() }
fn default_service_uuid() -> String { "12345678-1234-1234-1234-1234567890ab".to_string() }
fn default_characteristic_uuid() -> String { "abcdefab-1234-5678-1234-abcdefabcdef".to_string() }
fn default_scan_timeout_s() -> u64 { 10 }
fn default_serial_port() -> String { "/dev/ttyUSB0".to_string() }
fn default_baud_rate() -> u32 { 115200 }

fn default_deadzone() -> i32 { 20 }
fn default_reconnect_interval_ms() -> u64 { 1000 }

fn default_period_ms() -> u64 { 50 }

fn default_log_level() -> String { "info".to_string() }

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            kind: default_link_kind(),
            device_name: default_device_name(),
            service_uuid: default_service_uuid(),
            characteristic_uuid: default_characteristic_uuid(),
            scan_timeout_s: default_scan_timeout_s(),
            serial_port: default_serial_port(),
            baud_rate: default_baud_rate(),
        }
    }
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            device_path: String::new(),
            deadzone: default_deadzone(),
            reconnect_interval_ms: default_reconnect_interval_ms(),
            max_reconnect_attempts: 0,
        }
    }
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            period_ms: default_period_ms(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            log_dir: String::new(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            link: LinkConfig::default(),
            controller: ControllerConfig::default(),
            dispatch: DispatchConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

/// Shorthand for a validation failure
fn invalid(msg: impl std::fmt::Display) -> BridgeError {
    BridgeError::Config(toml::de::Error::custom(msg))
}

impl Config {
    /// Load configuration from a TOML file
    ///
    /// Missing sections and keys take their default values.
    ///
    /// # Errors
    ///
    /// Returns error if:
    /// - File cannot be read
    /// - TOML parsing fails
    /// - Validation fails
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use teleop_bridge::config::Config;
    ///
    /// let config = Config::load("config/default.toml")?;
    /// # Ok::<(), Box<dyn std::error::Error>>(())
    /// ```
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        Self::from_toml(&contents)
    }

    /// Parse and validate configuration from a TOML string
    pub fn from_toml(contents: &str) -> Result<Self> {
        let config: Config = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration values
    ///
    /// # Errors
    ///
    /// Returns error if any configuration value is out of valid range
    pub fn validate(&self) -> Result<()> {
        // Link
        match self.link.kind {
            LinkKind::Ble if self.link.device_name.is_empty() => {
                return Err(invalid("device_name cannot be empty for a ble link"));
            }
            LinkKind::Serial if self.link.serial_port.is_empty() => {
                return Err(invalid("serial_port cannot be empty for a serial link"));
            }
            _ => {}
        }

        for (name, value) in [
            ("service_uuid", &self.link.service_uuid),
            ("characteristic_uuid", &self.link.characteristic_uuid),
        ] {
            if Uuid::parse_str(value).is_err() {
                return Err(invalid(format!("{} is not a valid UUID: {}", name, value)));
            }
        }

        if self.link.scan_timeout_s == 0 || self.link.scan_timeout_s > 120 {
            return Err(invalid("scan_timeout_s must be between 1 and 120"));
        }

        if ![9600, 57600, 115200, 230400, 460800, 921600].contains(&self.link.baud_rate) {
            return Err(invalid(
                "baud_rate must be one of: 9600, 57600, 115200, 230400, 460800, 921600",
            ));
        }

        // Controller
        if !(0..=127).contains(&self.controller.deadzone) {
            return Err(invalid("deadzone must be between 0 and 127"));
        }

        if self.controller.reconnect_interval_ms == 0
            || self.controller.reconnect_interval_ms > 60000
        {
            return Err(invalid("reconnect_interval_ms must be between 1 and 60000"));
        }

        // Dispatch
        if self.dispatch.period_ms < 10 || self.dispatch.period_ms > 1000 {
            return Err(invalid("period_ms must be between 10 and 1000"));
        }

        // Logging
        if !["trace", "debug", "info", "warn", "error"].contains(&self.logging.level.as_str()) {
            return Err(invalid(
                "log level must be one of: trace, debug, info, warn, error",
            ));
        }

        Ok(())
    }

    /// BLE discovery settings
    pub fn ble_settings(&self) -> Result<BleSettings> {
        let parse = |value: &str| Uuid::parse_str(value).map_err(|e| invalid(e));
        Ok(BleSettings {
            device_name: self.link.device_name.clone(),
            service_uuid: parse(&self.link.service_uuid)?,
            characteristic_uuid: parse(&self.link.characteristic_uuid)?,
            scan_timeout: Duration::from_secs(self.link.scan_timeout_s),
        })
    }

    /// Ingestion task settings
    #[must_use]
    pub fn ingest_settings(&self) -> IngestSettings {
        IngestSettings {
            reconnect_interval: Duration::from_millis(self.controller.reconnect_interval_ms),
            max_reconnect_attempts: self.controller.max_reconnect_attempts,
        }
    }

    /// Dispatch tick period
    #[must_use]
    pub fn dispatch_period(&self) -> Duration {
        Duration::from_millis(self.dispatch.period_ms)
    }

    /// Controller device path, `None` for auto-detect
    #[must_use]
    pub fn device_path(&self) -> Option<String> {
        Some(self.controller.device_path.clone()).filter(|path| !path.is_empty())
    }
}
