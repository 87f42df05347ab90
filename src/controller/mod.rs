//! # Controller Module
//!
//! Gamepad input handling.
//!
//! This module handles:
//! - Gamepad detection and connection via evdev
//! - Translating raw evdev events into drive events
//! - The controller state and its PWM derivation
//! - Sharing that state between the ingestion task and the dispatcher
//! - Reconnecting after the gamepad goes away

pub mod gamepad;
pub mod ingest;
pub mod mapper;
pub mod shared;
pub mod source;
pub mod state;
pub mod status;
