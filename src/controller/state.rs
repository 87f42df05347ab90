//! # Controller State Module
//!
//! Interpreted state of the gamepad and the rules that mutate it.
//!
//! Raw device events are translated into [`ControllerEvent`]s by the
//! [`mapper`](super::mapper) module and applied here. The dispatcher samples
//! the state on every tick through [`ControllerState::compute_motor_pwms`] and
//! [`ControllerState::consume_action`].
//!
//! ## Drive Controls
//!
//! | Input | Event | Effect |
//! |-------|-------|--------|
//! | Left stick Y | `Axis(LeftY)` | Left wheel (both wheels in normal mode) |
//! | Right stick Y | `Axis(RightY)` | Right wheel (split mode only) |
//! | L1 (held) | `Modifier(Slow)` | 3/4 speed |
//! | L2 (held) | `Modifier(SuperSlow)` | 1/2 speed |
//! | R1 (press) | `Action(Jump)` | One jump command |
//! | D-Pad up/down | `Level` | Jump level +1 / -1 (1-10) |
//! | D-Pad left/right | `ModeToggle` | Toggle split mode |
//! | PS | `Exit` | End the session |
//!
//! ## PWM Derivation
//!
//! ```text
//! axis  -> deadzone (|axis| < D => 0)
//!       -> axis * 255 / 127 (truncated toward zero)
//!       -> clamp to [-255, 255]
//!       -> right = left unless split mode
//!       -> slow: * 3 / 4, else super slow: / 2
//! ```

/// Raw axis value reported at rest by the stick sensor.
pub const AXIS_CENTER: i32 = 128;
/// Lowest stored axis deflection (stick pulled toward the operator).
pub const AXIS_MIN: i32 = -128;
/// Highest stored axis deflection; also the full-scale value for PWM scaling.
pub const AXIS_MAX: i32 = 127;

/// Output ceiling for motor PWM magnitudes.
pub const PWM_MAX: i32 = 255;

/// Default deadzone in raw axis units.
pub const DEFAULT_DEADZONE: i32 = 20;

/// Lowest jump level.
pub const LEVEL_MIN: u8 = 1;
/// Highest jump level.
pub const LEVEL_MAX: u8 = 10;

/// Jump duration represented by one level step on the vehicle firmware.
pub const JUMP_TIME_PER_LEVEL_MS: u32 = 20;

/// Analog stick axes that drive the wheels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stick {
    /// Left stick vertical axis.
    LeftY,
    /// Right stick vertical axis.
    RightY,
}

/// Held buttons that scale the output speed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Modifier {
    /// 3/4 speed while held.
    Slow,
    /// 1/2 speed while held. Ignored when `Slow` is also held.
    SuperSlow,
}

/// Edge-triggered buttons that produce a one-shot command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    /// Fire the jump actuator at the current level.
    Jump,
}

/// Direction of a jump level change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LevelDirection {
    Increase,
    Decrease,
}

/// Non-neutral direction of a D-Pad edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Negative,
    Positive,
}

/// A single interpreted controller event.
///
/// Every raw device event that carries meaning maps to exactly one variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControllerEvent {
    /// Stick moved; `raw` is the sensor value (0-255, 128 at rest).
    Axis { stick: Stick, raw: i32 },
    /// Speed modifier pressed or released.
    Modifier { modifier: Modifier, pressed: bool },
    /// Action button pressed or released.
    Action { action: Action, pressed: bool },
    /// Jump level step.
    Level(LevelDirection),
    /// Drive mode toggle.
    ModeToggle(Direction),
    /// Operator asked to end the session.
    Exit,
}

/// Wheel coupling mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriveMode {
    /// Left stick drives both wheels.
    Normal,
    /// Each stick drives its own wheel.
    Split,
}

/// Observable change produced by applying an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusChange {
    /// Jump level changed to the contained value.
    Level(u8),
    /// Drive mode flipped to the contained mode.
    Mode(DriveMode),
}

/// Interpreted state of the physical controller.
///
/// Holds no I/O and no synchronization; share it through
/// [`SharedState`](super::shared::SharedState).
///
/// # Examples
///
/// ```
/// use teleop_bridge::controller::state::{ControllerEvent, ControllerState, Stick};
///
/// let mut state = ControllerState::new();
/// state.apply(ControllerEvent::Axis { stick: Stick::LeftY, raw: 1 });
///
/// // Stick pushed fully away from the operator, both wheels forward
/// assert_eq!(state.compute_motor_pwms(), (255, 255));
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControllerState {
    left_axis: i32,
    right_axis: i32,
    slow_active: bool,
    super_slow_active: bool,
    action_pending: bool,
    exit_requested: bool,
    split_mode: bool,
    level: u8,
    deadzone: i32,
}

impl Default for ControllerState {
    /// Creates a state at rest: sticks centered, nothing held, level 1.
    fn default() -> Self {
        Self {
            left_axis: 0,
            right_axis: 0,
            slow_active: false,
            super_slow_active: false,
            action_pending: false,
            exit_requested: false,
            split_mode: false,
            level: LEVEL_MIN,
            deadzone: DEFAULT_DEADZONE,
        }
    }
}

impl ControllerState {
    /// Creates a state at rest with the default deadzone.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a state at rest with a custom deadzone (raw axis units).
    ///
    /// The deadzone is clamped to `0..=AXIS_MAX`.
    #[must_use]
    pub fn with_deadzone(deadzone: i32) -> Self {
        Self {
            deadzone: deadzone.clamp(0, AXIS_MAX),
            ..Self::default()
        }
    }

    /// Applies one interpreted event.
    ///
    /// Returns the status change to report, if the event produced one.
    pub fn apply(&mut self, event: ControllerEvent) -> Option<StatusChange> {
        match event {
            ControllerEvent::Axis { stick, raw } => {
                self.apply_axis_event(stick, raw);
                None
            }
            ControllerEvent::Modifier { modifier, pressed } => {
                self.apply_modifier_event(modifier, pressed);
                None
            }
            ControllerEvent::Action { action, pressed } => {
                self.apply_action_event(action, pressed);
                None
            }
            ControllerEvent::Level(direction) => self.apply_level_event(direction),
            ControllerEvent::ModeToggle(direction) => {
                Some(self.apply_mode_toggle_event(direction))
            }
            ControllerEvent::Exit => {
                self.request_exit();
                None
            }
        }
    }

    /// Stores a stick deflection.
    ///
    /// The sensor reports 0 at full forward, so the value is inverted around
    /// [`AXIS_CENTER`]: pushing away from the operator is positive.
    pub fn apply_axis_event(&mut self, stick: Stick, raw: i32) {
        let value = (-(raw - AXIS_CENTER)).clamp(AXIS_MIN, AXIS_MAX);
        match stick {
            Stick::LeftY => self.left_axis = value,
            Stick::RightY => self.right_axis = value,
        }
    }

    /// Tracks a held speed modifier.
    pub fn apply_modifier_event(&mut self, modifier: Modifier, pressed: bool) {
        match modifier {
            Modifier::Slow => self.slow_active = pressed,
            Modifier::SuperSlow => self.super_slow_active = pressed,
        }
    }

    /// Latches an action on press. Releases are ignored.
    pub fn apply_action_event(&mut self, action: Action, pressed: bool) {
        match action {
            Action::Jump if pressed => self.action_pending = true,
            Action::Jump => {}
        }
    }

    /// Steps the jump level, saturating at [`LEVEL_MIN`] and [`LEVEL_MAX`].
    ///
    /// Returns `Some` only when the level actually changed.
    pub fn apply_level_event(&mut self, direction: LevelDirection) -> Option<StatusChange> {
        let next = match direction {
            LevelDirection::Increase => self.level.saturating_add(1).min(LEVEL_MAX),
            LevelDirection::Decrease => self.level.saturating_sub(1).max(LEVEL_MIN),
        };

        if next == self.level {
            return None;
        }

        self.level = next;
        Some(StatusChange::Level(next))
    }

    /// Flips split mode. Either direction toggles.
    pub fn apply_mode_toggle_event(&mut self, _direction: Direction) -> StatusChange {
        self.split_mode = !self.split_mode;
        StatusChange::Mode(self.drive_mode())
    }

    /// Marks the session for termination. Irreversible.
    pub fn request_exit(&mut self) {
        self.exit_requested = true;
    }

    /// Returns and clears the pending action.
    ///
    /// One press yields `true` exactly once.
    pub fn consume_action(&mut self) -> bool {
        std::mem::take(&mut self.action_pending)
    }

    /// Recenters both sticks.
    ///
    /// Used when the input device goes away. Modifiers, drive mode and level
    /// are kept.
    pub fn neutralize_axes(&mut self) {
        self.left_axis = 0;
        self.right_axis = 0;
    }

    /// Derives the `(left, right)` motor PWM pair from the current state.
    ///
    /// # Examples
    ///
    /// ```
    /// use teleop_bridge::controller::state::{ControllerState, Modifier, Stick};
    ///
    /// let mut state = ControllerState::new();
    /// state.apply_axis_event(Stick::LeftY, 128 - 64);
    /// state.apply_modifier_event(Modifier::Slow, true);
    ///
    /// // 64 * 255 / 127 = 128, then 128 * 3 / 4 = 96
    /// assert_eq!(state.compute_motor_pwms(), (96, 96));
    /// ```
    #[must_use]
    pub fn compute_motor_pwms(&self) -> (i32, i32) {
        let mut left = self.scale_axis(self.left_axis);
        let mut right = self.scale_axis(self.right_axis);

        if !self.split_mode {
            right = left;
        }

        if self.slow_active {
            left = left * 3 / 4;
            right = right * 3 / 4;
        } else if self.super_slow_active {
            left /= 2;
            right /= 2;
        }

        (left, right)
    }

    /// Deadzone, scale to PWM range with truncation, clamp.
    fn scale_axis(&self, axis: i32) -> i32 {
        let axis = if axis.abs() < self.deadzone { 0 } else { axis };
        (axis * PWM_MAX / AXIS_MAX).clamp(-PWM_MAX, PWM_MAX)
    }

    /// Current jump level (1-10).
    #[must_use]
    pub fn current_level(&self) -> u8 {
        self.level
    }

    /// Whether the operator asked to end the session.
    #[must_use]
    pub fn exit_requested(&self) -> bool {
        self.exit_requested
    }

    /// Current wheel coupling mode.
    #[must_use]
    pub fn drive_mode(&self) -> DriveMode {
        if self.split_mode {
            DriveMode::Split
        } else {
            DriveMode::Normal
        }
    }

    /// Stored left stick deflection.
    #[must_use]
    pub fn left_axis(&self) -> i32 {
        self.left_axis
    }

    /// Stored right stick deflection.
    #[must_use]
    pub fn right_axis(&self) -> i32 {
        self.right_axis
    }

    /// Deadzone in raw axis units.
    #[must_use]
    pub fn deadzone(&self) -> i32 {
        self.deadzone
    }
}
