//! # Shared Controller State
//!
//! [`SharedState`] is the single synchronization point between the ingestion
//! task (writer) and the dispatcher (reader). The whole [`ControllerState`] sits
//! behind one mutex; at a 20 Hz tick the lock is never contended for long.
//!
//! The dispatcher always samples the latest state. Transitions that happen
//! and revert between two ticks are never seen.
//!
//! The exit flag is mirrored into a `watch` channel so tasks parked on I/O can
//! wake up when the session ends.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::watch;

use super::state::{ControllerEvent, ControllerState};
use super::status::StatusObserver;

/// Mutex-guarded controller state shared by the ingestion and dispatch tasks.
///
/// # Examples
///
/// ```
/// use std::sync::Arc;
/// use teleop_bridge::controller::shared::SharedState;
/// use teleop_bridge::controller::state::{Action, ControllerEvent, ControllerState};
/// use teleop_bridge::controller::status::LogObserver;
///
/// let shared = SharedState::new(ControllerState::new(), Arc::new(LogObserver));
/// shared.apply(ControllerEvent::Action { action: Action::Jump, pressed: true });
///
/// assert_eq!(shared.take_action(), Some(1));
/// assert_eq!(shared.take_action(), None);
/// ```
pub struct SharedState {
    state: Mutex<ControllerState>,
    exit_tx: watch::Sender<bool>,
    observer: Arc<dyn StatusObserver>,
}

impl std::fmt::Debug for SharedState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SharedState")
            .field("state", &*self.lock())
            .finish_non_exhaustive()
    }
}

impl SharedState {
    /// Wraps an initial state. `observer` receives level and mode changes.
    pub fn new(state: ControllerState, observer: Arc<dyn StatusObserver>) -> Self {
        let (exit_tx, _) = watch::channel(state.exit_requested());
        Self {
            state: Mutex::new(state),
            exit_tx,
            observer,
        }
    }

    /// Locks the state. A panic in another holder does not invalidate plain data.
    fn lock(&self) -> MutexGuard<'_, ControllerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Applies an event and notifies the observer outside the lock.
    pub fn apply(&self, event: ControllerEvent) {
        let (change, exit) = {
            let mut state = self.lock();
            let change = state.apply(event);
            (change, state.exit_requested())
        };

        if exit {
            self.exit_tx.send_replace(true);
        }

        if let Some(change) = change {
            self.observer.on_status(change);
        }
    }

    /// Sets the exit flag and wakes every exit subscriber.
    pub fn request_exit(&self) {
        self.lock().request_exit();
        self.exit_tx.send_replace(true);
    }

    /// Whether the session has been asked to end.
    #[must_use]
    pub fn exit_requested(&self) -> bool {
        self.lock().exit_requested()
    }

    /// Receiver that flips to `true` once exit is requested.
    #[must_use]
    pub fn subscribe_exit(&self) -> watch::Receiver<bool> {
        self.exit_tx.subscribe()
    }

    /// Current `(left, right)` motor PWM pair.
    #[must_use]
    pub fn compute_motor_pwms(&self) -> (i32, i32) {
        self.lock().compute_motor_pwms()
    }

    /// Consumes a pending action and returns the level it fires at.
    ///
    /// The level is read under the same lock as the consume, so a level change
    /// arriving right after the press cannot leak into this action.
    pub fn take_action(&self) -> Option<u8> {
        let mut state = self.lock();
        state.consume_action().then(|| state.current_level())
    }

    /// Current jump level.
    #[must_use]
    pub fn current_level(&self) -> u8 {
        self.lock().current_level()
    }

    /// Recenters both sticks after the input device went away.
    pub fn neutralize_axes(&self) {
        self.lock().neutralize_axes();
    }

    /// Owned copy of the current state.
    #[must_use]
    pub fn snapshot(&self) -> ControllerState {
        self.lock().clone()
    }
}
