//! # Error Types
//!
//! Custom error types for Teleop Bridge using `thiserror`.

use thiserror::Error;

/// Main error type for Teleop Bridge
#[derive(Debug, Error)]
pub enum BridgeError {
    /// The controller cannot currently be read (unplugged, out of range, permission).
    #[error("Input source unavailable: {0}")]
    InputSourceUnavailable(String),

    /// No gamepad matched during device discovery
    #[error("No gamepad found")]
    ControllerNotFound,

    /// The controller stayed unavailable for the whole reconnect budget
    #[error("Input device lost after {attempts} reconnect attempts")]
    InputDeviceLost { attempts: u32 },

    /// A command write to the vehicle did not complete
    #[error("Transport write failed: {0}")]
    Transport(String),

    /// The vehicle could not be found or connected at startup
    #[error("Vehicle link not found: {0}")]
    LinkNotFound(String),

    /// A command carried a value the vehicle protocol cannot represent
    #[error("Invalid command state: {0}")]
    InvalidCommandState(String),

    /// A background task panicked or was cancelled
    #[error("Background task failed: {0}")]
    TaskFailed(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] toml::de::Error),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Bluetooth LE stack errors
    #[error("BLE error: {0}")]
    Ble(#[from] btleplug::Error),
}

impl BridgeError {
    /// Returns `true` if the error must end the session.
    ///
    /// Input-side errors are recovered locally by the ingestion task with a
    /// neutral fallback and a reconnect backoff.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        !matches!(
            self,
            BridgeError::InputSourceUnavailable(_) | BridgeError::ControllerNotFound
        )
    }
}

/// Result type alias for Teleop Bridge
pub type Result<T> = std::result::Result<T, BridgeError>;
