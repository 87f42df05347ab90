//! # Vehicle Command Module
//!
//! Text command protocol understood by the vehicle firmware.
//!
//! This module handles:
//! - Motion commands carrying the left/right motor PWM (`M,<left>,<right>`)
//! - Action commands carrying the jump level (`J,<level>`)
//! - Range validation before anything is put on the link

pub mod protocol;
pub mod encoder;

pub use encoder::encode_command;
pub use protocol::Command;
