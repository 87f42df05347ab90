//! # Command Protocol Definitions
//!
//! Constants and types for the vehicle command protocol.
//!
//! ## Format
//!
//! Every command is a single ASCII line without terminator, sent as one
//! write:
//!
//! ```text
//! M,<left>,<right>   left/right: -255..=255, base 10, '-' for reverse
//! J,<level>          level: 1..=10
//! ```

use std::fmt;

use crate::controller::state::{LEVEL_MAX, LEVEL_MIN, PWM_MAX};

/// Tag of a motion command
pub const MOTION_TAG: char = 'M';

/// Tag of an action (jump) command
pub const ACTION_TAG: char = 'J';

/// Field separator
pub const FIELD_SEPARATOR: char = ',';

/// Lowest PWM value the firmware accepts
pub const PWM_VALUE_MIN: i32 = -PWM_MAX;

/// Highest PWM value the firmware accepts
pub const PWM_VALUE_MAX: i32 = PWM_MAX;

/// Lowest jump level the firmware accepts
pub const LEVEL_VALUE_MIN: u8 = LEVEL_MIN;

/// Highest jump level the firmware accepts
pub const LEVEL_VALUE_MAX: u8 = LEVEL_MAX;

/// Longest encoded command: `M,-255,-255`
pub const MAX_COMMAND_LEN: usize = 11;

/// A command for the vehicle
///
/// Compared by value: two motion commands with the same PWM pair are the
/// same command.
///
/// # Examples
///
/// ```
/// use teleop_bridge::command::Command;
///
/// assert_eq!(Command::motion(-128, 255).to_string(), "M,-128,255");
/// assert_eq!(Command::action(3).to_string(), "J,3");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Command {
    /// Drive both motors
    Motion { left: i32, right: i32 },
    /// Fire the jump actuator
    Action { level: u8 },
}

impl Command {
    /// Motion command from a `(left, right)` PWM pair
    #[must_use]
    pub fn motion(left: i32, right: i32) -> Self {
        Command::Motion { left, right }
    }

    /// Action command at the given jump level
    #[must_use]
    pub fn action(level: u8) -> Self {
        Command::Action { level }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Command::Motion { left, right } => {
                write!(f, "{MOTION_TAG}{FIELD_SEPARATOR}{left}{FIELD_SEPARATOR}{right}")
            }
            Command::Action { level } => write!(f, "{ACTION_TAG}{FIELD_SEPARATOR}{level}"),
        }
    }
}
