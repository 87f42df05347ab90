//! Trait abstraction for controller event sources to enable testing

use async_trait::async_trait;

use super::state::ControllerEvent;
use crate::error::Result;

/// A provider of interpreted controller events.
///
/// Implementations own the physical device. The ingestion task drives the
/// lifecycle: `connect`, then `next_event` until it fails, then `disconnect`
/// and `connect` again after a backoff.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait InputSource: Send {
    /// Acquire the device. Fails with a recoverable error if it is absent.
    async fn connect(&mut self) -> Result<()>;

    /// Wait for the next raw event.
    ///
    /// Returns `Ok(None)` for raw events that carry no meaning, and an error
    /// once the device can no longer be read.
    async fn next_event(&mut self) -> Result<Option<ControllerEvent>>;

    /// Release the device. Safe to call when not connected.
    fn disconnect(&mut self);
}
