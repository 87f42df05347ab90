//! # Bluetooth LE Transport
//!
//! Writes commands to the vehicle's GATT command characteristic.
//!
//! The vehicle (an ESP32) advertises under a fixed local name. Discovery scans
//! the first Bluetooth adapter until a peripheral with that name shows up or
//! the scan timeout expires.

use std::time::Duration;

use async_trait::async_trait;
use btleplug::api::{
    Central, CentralEvent, CharPropFlags, Characteristic, Manager as _, Peripheral as _,
    ScanFilter, WriteType,
};
use btleplug::platform::{Adapter, Manager, Peripheral};
use futures::stream::StreamExt;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::Transport;
use crate::error::{BridgeError, Result};

/// Local name advertised by the vehicle firmware
pub const DEFAULT_DEVICE_NAME: &str = "ESP32_BLE_MAKAIZO";

/// Vehicle command service UUID
pub const DEFAULT_SERVICE_UUID: Uuid = Uuid::from_u128(0x12345678_1234_1234_1234_1234567890ab);

/// Vehicle command characteristic UUID
pub const DEFAULT_CHARACTERISTIC_UUID: Uuid =
    Uuid::from_u128(0xabcdefab_1234_5678_1234_abcdefabcdef);

/// Default discovery timeout
pub const DEFAULT_SCAN_TIMEOUT: Duration = Duration::from_secs(10);

/// Where to find the vehicle
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BleSettings {
    pub device_name: String,
    pub service_uuid: Uuid,
    pub characteristic_uuid: Uuid,
    pub scan_timeout: Duration,
}

impl Default for BleSettings {
    fn default() -> Self {
        Self {
            device_name: DEFAULT_DEVICE_NAME.to_string(),
            service_uuid: DEFAULT_SERVICE_UUID,
            characteristic_uuid: DEFAULT_CHARACTERISTIC_UUID,
            scan_timeout: DEFAULT_SCAN_TIMEOUT,
        }
    }
}

/// Connected BLE link to the vehicle
pub struct BleTransport {
    peripheral: Peripheral,
    characteristic: Characteristic,
    write_type: WriteType,
    description: String,
}

impl std::fmt::Debug for BleTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BleTransport")
            .field("peer", &self.description)
            .field("characteristic", &self.characteristic.uuid)
            .finish_non_exhaustive()
    }
}

impl BleTransport {
    /// Scan for the vehicle, connect and locate the command characteristic
    ///
    /// # Errors
    ///
    /// - `LinkNotFound`: no adapter, no matching peripheral within the scan
    ///   timeout, or the peripheral lacks the command characteristic
    /// - `Ble`: the Bluetooth stack failed
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use teleop_bridge::transport::{BleSettings, BleTransport, Transport};
    ///
    /// #[tokio::main]
    /// async fn main() -> anyhow::Result<()> {
    ///     let mut link = BleTransport::discover(&BleSettings::default()).await?;
    ///     link.send(b"M,0,0").await?;
    ///     Ok(())
    /// }
    /// ```
    pub async fn discover(settings: &BleSettings) -> Result<Self> {
        info!("Scanning for BLE device \"{}\"...", settings.device_name);

        let manager = Manager::new().await?;
        let adapter = manager
            .adapters()
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| BridgeError::LinkNotFound("No Bluetooth adapters found".to_string()))?;

        let peripheral = Self::scan(&adapter, settings).await?;
        let description = format!("{} ({})", settings.device_name, peripheral.address());
        info!("Found device: {}", description);

        peripheral.connect().await?;
        peripheral.discover_services().await?;

        let characteristic = peripheral
            .characteristics()
            .into_iter()
            .find(|c| {
                c.uuid == settings.characteristic_uuid && c.service_uuid == settings.service_uuid
            })
            .ok_or_else(|| {
                BridgeError::LinkNotFound(format!(
                    "{} has no characteristic {} in service {}",
                    description, settings.characteristic_uuid, settings.service_uuid
                ))
            })?;

        let write_type = write_type_for(characteristic.properties);
        debug!(
            "Command characteristic {} ({:?})",
            characteristic.uuid, write_type
        );

        info!("BLE connected: {}", description);
        Ok(Self {
            peripheral,
            characteristic,
            write_type,
            description,
        })
    }

    /// Wait for a peripheral advertising the configured name
    async fn scan(adapter: &Adapter, settings: &BleSettings) -> Result<Peripheral> {
        let mut events = adapter.events().await?;
        adapter.start_scan(ScanFilter::default()).await?;

        let search = async {
            // Peripherals the adapter already knows may never emit a discovery event
            for peripheral in adapter.peripherals().await? {
                if has_name(&peripheral, &settings.device_name).await? {
                    return Ok(Some(peripheral));
                }
            }

            while let Some(event) = events.next().await {
                if let CentralEvent::DeviceDiscovered(id) | CentralEvent::DeviceUpdated(id) = event
                {
                    let peripheral = adapter.peripheral(&id).await?;
                    if has_name(&peripheral, &settings.device_name).await? {
                        return Ok(Some(peripheral));
                    }
                }
            }
            Ok::<_, BridgeError>(None)
        };

        let found = tokio::time::timeout(settings.scan_timeout, search).await;

        if let Err(e) = adapter.stop_scan().await {
            warn!("Failed to stop BLE scan: {}", e);
        }

        match found {
            Ok(Ok(Some(peripheral))) => Ok(peripheral),
            Ok(Err(e)) => Err(e),
            Ok(Ok(None)) | Err(_) => Err(BridgeError::LinkNotFound(format!(
                "\"{}\" not found within {}s",
                settings.device_name,
                settings.scan_timeout.as_secs()
            ))),
        }
    }

    /// Disconnect from the vehicle
    pub async fn disconnect(&self) -> Result<()> {
        info!("Disconnecting from {}...", self.description);
        self.peripheral.disconnect().await?;
        Ok(())
    }
}

/// Whether a peripheral advertises the given local name
async fn has_name(peripheral: &Peripheral, name: &str) -> Result<bool> {
    let local_name = peripheral
        .properties()
        .await?
        .and_then(|properties| properties.local_name);
    Ok(local_name.as_deref() == Some(name))
}

/// Acknowledged writes when the characteristic supports them
fn write_type_for(properties: CharPropFlags) -> WriteType {
    if properties.contains(CharPropFlags::WRITE) {
        WriteType::WithResponse
    } else {
        WriteType::WithoutResponse
    }
}

#[async_trait]
impl Transport for BleTransport {
    async fn send(&mut self, payload: &[u8]) -> Result<()> {
        self.peripheral
            .write(&self.characteristic, payload, self.write_type)
            .await
            .map_err(|e| BridgeError::Transport(format!("GATT write failed: {}", e)))?;

        debug!("Sent BLE command ({} bytes)", payload.len());
        Ok(())
    }

    fn describe(&self) -> String {
        self.description.clone()
    }

    async fn close(&mut self) -> Result<()> {
        self.disconnect().await
    }
}
