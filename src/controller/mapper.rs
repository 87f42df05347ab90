//! # Controller Input Mapper Module
//!
//! Translates raw evdev events from a DualShock 4 / DualSense controller into
//! [`ControllerEvent`]s.
//!
//! ## Event Codes
//!
//! | evdev Code | Type | Value | Event |
//! |------------|------|-------|-------|
//! | ABS_Y | EV_ABS | 0-255 | Left stick Y (left wheel) |
//! | ABS_RY | EV_ABS | 0-255 | Right stick Y (right wheel) |
//! | ABS_HAT0Y | EV_ABS | -1 / 1 | Jump level up / down |
//! | ABS_HAT0X | EV_ABS | -1 / 1 | Toggle split mode |
//! | BTN_TL | EV_KEY | 0 / 1 | L1, slow modifier |
//! | BTN_TL2 | EV_KEY | 0 / 1 | L2, super slow modifier |
//! | BTN_TR | EV_KEY | 0 / 1 | R1, jump |
//! | BTN_MODE | EV_KEY | 1 | PS, end session |
//!
//! Everything else (sync reports, gyro, other buttons, D-Pad release) is
//! dropped.
//!
//! ## Usage
//!
//! ```
//! use evdev::{AbsoluteAxisType, EventType, InputEvent};
//! use teleop_bridge::controller::mapper::translate;
//! use teleop_bridge::controller::state::{ControllerEvent, LevelDirection};
//!
//! // D-Pad up
//! let raw = InputEvent::new(EventType::ABSOLUTE, AbsoluteAxisType::ABS_HAT0Y.0, -1);
//! assert_eq!(translate(&raw), Some(ControllerEvent::Level(LevelDirection::Increase)));
//! ```
//!
//! On a live gamepad, [`EvdevSource`](super::gamepad::EvdevSource) reads the
//! device asynchronously and applies `translate` to every event.

use evdev::{AbsoluteAxisType, InputEvent, InputEventKind, Key};

use super::state::{
    Action, ControllerEvent, Direction, LevelDirection, Modifier, Stick,
};

/// D-Pad released.
pub const DPAD_RELEASED: i32 = 0;
/// D-Pad pressed negative direction (left or up).
pub const DPAD_NEGATIVE: i32 = -1;
/// D-Pad pressed positive direction (right or down).
pub const DPAD_POSITIVE: i32 = 1;

/// Translates one evdev event.
///
/// Returns `None` for events that carry no meaning for the vehicle.
#[must_use]
pub fn translate(event: &InputEvent) -> Option<ControllerEvent> {
    match event.kind() {
        InputEventKind::AbsAxis(axis) => translate_axis(axis, event.value()),
        InputEventKind::Key(key) => translate_key(key, event.value() != 0),
        _ => None,
    }
}

/// Translates an absolute axis event.
fn translate_axis(axis: AbsoluteAxisType, value: i32) -> Option<ControllerEvent> {
    match axis {
        AbsoluteAxisType::ABS_Y => Some(ControllerEvent::Axis {
            stick: Stick::LeftY,
            raw: value,
        }),
        AbsoluteAxisType::ABS_RY => Some(ControllerEvent::Axis {
            stick: Stick::RightY,
            raw: value,
        }),

        // D-Pad up is -1
        AbsoluteAxisType::ABS_HAT0Y => match value {
            DPAD_NEGATIVE => Some(ControllerEvent::Level(LevelDirection::Increase)),
            DPAD_POSITIVE => Some(ControllerEvent::Level(LevelDirection::Decrease)),
            _ => None,
        },
        AbsoluteAxisType::ABS_HAT0X => match value {
            DPAD_NEGATIVE => Some(ControllerEvent::ModeToggle(Direction::Negative)),
            DPAD_POSITIVE => Some(ControllerEvent::ModeToggle(Direction::Positive)),
            _ => None,
        },

        _ => None,
    }
}

/// Translates a key/button event.
fn translate_key(key: Key, pressed: bool) -> Option<ControllerEvent> {
    match key {
        Key::BTN_TL => Some(ControllerEvent::Modifier {
            modifier: Modifier::Slow,
            pressed,
        }),
        Key::BTN_TL2 => Some(ControllerEvent::Modifier {
            modifier: Modifier::SuperSlow,
            pressed,
        }),
        Key::BTN_TR => Some(ControllerEvent::Action {
            action: Action::Jump,
            pressed,
        }),
        Key::BTN_MODE if pressed => Some(ControllerEvent::Exit),
        _ => None,
    }
}
