//! # Transport Module
//!
//! Delivery of encoded commands to the vehicle.
//!
//! This module handles:
//! - The [`Transport`] abstraction consumed by the dispatcher
//! - Bluetooth LE GATT writes to the vehicle's command characteristic
//! - A wired serial alternative for bench testing
//!
//! Connection setup happens before the session starts. A transport that
//! fails a write is not retried; the session ends.

pub mod ble;
pub mod serial;

use async_trait::async_trait;

use crate::error::Result;

pub use ble::{BleSettings, BleTransport};
pub use serial::SerialTransport;

/// A sink for encoded commands
#[async_trait]
pub trait Transport: Send {
    /// Write one encoded command as a single atomic write
    async fn send(&mut self, payload: &[u8]) -> Result<()>;

    /// Human-readable peer description for logs
    fn describe(&self) -> String;

    /// Tear down the link at the end of a session
    async fn close(&mut self) -> Result<()> {
        Ok(())
    }
}

#[async_trait]
impl<T: Transport + ?Sized> Transport for Box<T> {
    async fn send(&mut self, payload: &[u8]) -> Result<()> {
        (**self).send(payload).await
    }

    fn describe(&self) -> String {
        (**self).describe()
    }

    async fn close(&mut self) -> Result<()> {
        (**self).close().await
    }
}
