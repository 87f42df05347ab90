//! # Status Notifications
//!
//! Human-readable reports for level and drive-mode changes. These are an
//! operator side channel and never reach the vehicle.

use tracing::info;

use super::state::{DriveMode, StatusChange, JUMP_TIME_PER_LEVEL_MS};

/// Receives status changes produced by controller input.
#[cfg_attr(test, mockall::automock)]
pub trait StatusObserver: Send + Sync {
    /// Called after the change has been applied to the state.
    fn on_status(&self, change: StatusChange);
}

/// Observer that writes status lines to the log at `info` level.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogObserver;

impl StatusObserver for LogObserver {
    fn on_status(&self, change: StatusChange) {
        info!("{}", status_line(change));
    }
}

/// Formats a status change for the operator.
///
/// # Examples
///
/// ```
/// use teleop_bridge::controller::state::StatusChange;
/// use teleop_bridge::controller::status::status_line;
///
/// assert_eq!(status_line(StatusChange::Level(3)), "Jump level 3 (jump time 60ms)");
/// ```
#[must_use]
pub fn status_line(change: StatusChange) -> String {
    match change {
        StatusChange::Level(level) => format!(
            "Jump level {} (jump time {}ms)",
            level,
            u32::from(level) * JUMP_TIME_PER_LEVEL_MS
        ),
        StatusChange::Mode(DriveMode::Split) => {
            "Drive mode: split (each stick drives its own wheel)".to_string()
        }
        StatusChange::Mode(DriveMode::Normal) => {
            "Drive mode: normal (left stick drives both wheels)".to_string()
        }
    }
}
