//! # Serial Transport
//!
//! Wired link to the vehicle firmware over a USB serial adapter, for bench
//! testing without Bluetooth.
//!
//! A byte stream has no write boundaries, so each command is followed by a
//! `\n` for the firmware's line reader.

use async_trait::async_trait;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio_serial::{SerialPortBuilderExt, SerialStream};
use tracing::{debug, info};

use super::Transport;
use crate::error::{BridgeError, Result};

/// Default serial device
pub const DEFAULT_SERIAL_PORT: &str = "/dev/ttyUSB0";

/// ESP32 default UART baud rate
pub const DEFAULT_BAUD_RATE: u32 = 115_200;

/// Appended to every command on the wire
pub const LINE_TERMINATOR: u8 = b'\n';

/// Serial link to the vehicle
pub struct SerialTransport<P = SerialStream> {
    /// Serial port handle
    port: P,
    /// Device path (e.g., /dev/ttyUSB0)
    device_path: String,
}

impl<P> std::fmt::Debug for SerialTransport<P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SerialTransport")
            .field("device_path", &self.device_path)
            .finish_non_exhaustive()
    }
}

impl SerialTransport {
    /// Open a serial port with 8N1 settings
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use teleop_bridge::transport::SerialTransport;
    ///
    /// #[tokio::main]
    /// async fn main() -> anyhow::Result<()> {
    ///     let link = SerialTransport::open("/dev/ttyUSB0", 115_200)?;
    ///     Ok(())
    /// }
    /// ```
    pub fn open(path: &str, baud_rate: u32) -> Result<Self> {
        debug!("Trying to open serial port: {}", path);

        let port = tokio_serial::new(path, baud_rate)
            .data_bits(tokio_serial::DataBits::Eight)
            .parity(tokio_serial::Parity::None)
            .stop_bits(tokio_serial::StopBits::One)
            .flow_control(tokio_serial::FlowControl::None)
            .open_native_async()
            .map_err(|e| BridgeError::LinkNotFound(format!("Failed to open {}: {}", path, e)))?;

        info!("Opened serial link at {} ({} baud)", path, baud_rate);
        Ok(Self::from_port(port, path))
    }
}

impl<P> SerialTransport<P> {
    /// Wrap an already open port
    pub fn from_port(port: P, device_path: impl Into<String>) -> Self {
        Self {
            port,
            device_path: device_path.into(),
        }
    }

    /// Get the device path of the opened serial port
    pub fn device_path(&self) -> &str {
        &self.device_path
    }
}

#[async_trait]
impl<P> Transport for SerialTransport<P>
where
    P: AsyncWrite + Unpin + Send,
{
    async fn send(&mut self, payload: &[u8]) -> Result<()> {
        let mut line = Vec::with_capacity(payload.len() + 1);
        line.extend_from_slice(payload);
        line.push(LINE_TERMINATOR);

        self.port
            .write_all(&line)
            .await
            .map_err(|e| BridgeError::Transport(format!("Failed to write command: {}", e)))?;

        self.port
            .flush()
            .await
            .map_err(|e| BridgeError::Transport(format!("Failed to flush serial port: {}", e)))?;

        debug!("Sent serial command ({} bytes)", line.len());
        Ok(())
    }

    fn describe(&self) -> String {
        self.device_path.clone()
    }
}
