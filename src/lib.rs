//! # Teleop Bridge Library
//!
//! Drive a tank-steer vehicle with a gamepad over Bluetooth LE.
//!
//! This library reads a DualShock/DualSense controller through evdev, turns
//! stick and button state into `M,<left>,<right>` motor commands and
//! `J,<level>` jump commands, and writes them to the vehicle firmware over BLE
//! or a serial cable.

pub mod command;
pub mod config;
pub mod controller;
pub mod dispatch;
pub mod error;
pub mod session;
pub mod transport;
