//! # Command Dispatcher
//!
//! Samples the shared controller state on a fixed period and turns it into
//! link commands.
//!
//! Each tick:
//! 1. The motor PWM pair becomes a motion command, sent only when it differs
//!    from the last one sent.
//! 2. A pending jump is consumed and always sent, tagged with the jump level at
//!    the moment of consumption.
//!
//! A failed write ends the loop. Retrying is left to the transport.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, error, info};

use crate::command::{encode_command, Command};
use crate::controller::shared::SharedState;
use crate::error::Result;
use crate::transport::Transport;

/// Default tick period (20 Hz)
pub const DEFAULT_DISPATCH_PERIOD: Duration = Duration::from_millis(50);

/// Periodic command sender
pub struct Dispatcher<T> {
    transport: T,
    state: Arc<SharedState>,
    period: Duration,
    last_motion: Option<Command>,
    sent: u64,
}

impl<T> std::fmt::Debug for Dispatcher<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("period", &self.period)
            .field("last_motion", &self.last_motion)
            .field("sent", &self.sent)
            .finish_non_exhaustive()
    }
}

impl<T: Transport> Dispatcher<T> {
    /// Create a dispatcher writing to `transport`
    pub fn new(transport: T, state: Arc<SharedState>, period: Duration) -> Self {
        Self {
            transport,
            state,
            period,
            last_motion: None,
            sent: 0,
        }
    }

    /// Run one dispatch step
    ///
    /// # Errors
    ///
    /// - `Transport`: a write failed
    /// - `InvalidCommandState`: the state produced an out-of-range value
    pub async fn tick(&mut self) -> Result<()> {
        let (left, right) = self.state.compute_motor_pwms();
        let motion = Command::motion(left, right);

        if self.last_motion != Some(motion) {
            self.send(&motion).await?;
            self.last_motion = Some(motion);
        }

        if let Some(level) = self.state.take_action() {
            self.send(&Command::action(level)).await?;
        }

        Ok(())
    }

    async fn send(&mut self, command: &Command) -> Result<()> {
        let payload = encode_command(command)?;
        self.transport.send(&payload).await?;
        self.sent += 1;
        debug!("Sent {}", command);
        Ok(())
    }

    /// Tick every period until exit is requested or a write fails
    ///
    /// An in-flight write always completes before exit is observed.
    ///
    /// # Errors
    ///
    /// Returns the first error from [`Dispatcher::tick`].
    pub async fn run(&mut self) -> Result<()> {
        let mut ticker = interval(self.period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut exit_rx = self.state.subscribe_exit();

        info!(
            "Dispatching to {} every {}ms",
            self.transport.describe(),
            self.period.as_millis()
        );

        while !self.state.exit_requested() {
            tokio::select! {
                biased;

                // Re-checked by the loop condition
                _ = exit_rx.changed() => {}

                _ = ticker.tick() => {
                    if let Err(e) = self.tick().await {
                        error!("Dispatch stopped: {}", e);
                        return Err(e);
                    }
                }
            }
        }

        info!("Dispatcher stopped after {} commands", self.sent);
        Ok(())
    }

    /// Number of commands written so far
    pub fn commands_sent(&self) -> u64 {
        self.sent
    }

    /// Give back the transport, e.g. to close it
    pub fn into_transport(self) -> T {
        self.transport
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::controller::state::{
        Action, ControllerEvent, ControllerState, Direction, LevelDirection, Modifier, Stick,
    };
    use crate::controller::status::LogObserver;
    use crate::error::BridgeError;
    use crate::transport::mocks::MockTransport;
    use tokio::time::sleep;

    fn new_state() -> Arc<SharedState> {
        Arc::new(SharedState::new(ControllerState::new(), Arc::new(LogObserver)))
    }

    fn new_dispatcher(state: &Arc<SharedState>) -> (Dispatcher<MockTransport>, MockTransport) {
        let mock = MockTransport::new();
        let dispatcher = Dispatcher::new(mock.clone(), Arc::clone(state), DEFAULT_DISPATCH_PERIOD);
        (dispatcher, mock)
    }

    fn axis(stick: Stick, raw: i32) -> ControllerEvent {
        ControllerEvent::Axis { stick, raw }
    }

    fn jump(pressed: bool) -> ControllerEvent {
        ControllerEvent::Action { action: Action::Jump, pressed }
    }

    #[tokio::test]
    async fn test_identical_ticks_send_one_motion() {
        let state = new_state();
        let (mut dispatcher, mock) = new_dispatcher(&state);

        for _ in 0..10 {
            dispatcher.tick().await.unwrap();
        }

        assert_eq!(mock.sent(), vec!["M,0,0"]);
        assert_eq!(dispatcher.commands_sent(), 1);
    }

    #[tokio::test]
    async fn test_motion_resent_only_on_change() {
        let state = new_state();
        let (mut dispatcher, mock) = new_dispatcher(&state);

        dispatcher.tick().await.unwrap();
        state.apply(axis(Stick::LeftY, 0));
        dispatcher.tick().await.unwrap();
        dispatcher.tick().await.unwrap();
        state.apply(axis(Stick::LeftY, 128));
        dispatcher.tick().await.unwrap();

        assert_eq!(mock.sent(), vec!["M,0,0", "M,255,255", "M,0,0"]);
    }

    #[tokio::test]
    async fn test_full_forward_ignores_right_stick() {
        let state = new_state();
        let (mut dispatcher, mock) = new_dispatcher(&state);

        // Raw 1 is +127 after inversion
        state.apply(axis(Stick::LeftY, 1));
        state.apply(axis(Stick::RightY, 255));
        dispatcher.tick().await.unwrap();
        state.apply(axis(Stick::RightY, 128));
        dispatcher.tick().await.unwrap();

        assert_eq!(mock.sent(), vec!["M,255,255"]);
    }

    #[tokio::test]
    async fn test_slow_modifier_scenario() {
        let state = new_state();
        let (mut dispatcher, mock) = new_dispatcher(&state);

        // Raw 64 is +64 after inversion
        state.apply(axis(Stick::LeftY, 64));
        state.apply(ControllerEvent::Modifier { modifier: Modifier::Slow, pressed: true });
        dispatcher.tick().await.unwrap();

        assert_eq!(mock.sent(), vec!["M,96,96"]);
    }

    #[tokio::test]
    async fn test_split_mode_drives_wheels_independently() {
        let state = new_state();
        let (mut dispatcher, mock) = new_dispatcher(&state);

        state.apply(ControllerEvent::ModeToggle(Direction::Negative));
        state.apply(axis(Stick::LeftY, 1));
        state.apply(axis(Stick::RightY, 255));
        dispatcher.tick().await.unwrap();

        assert_eq!(mock.sent(), vec!["M,255,-255"]);
    }

    #[tokio::test]
    async fn test_action_sent_every_press() {
        let state = new_state();
        let (mut dispatcher, mock) = new_dispatcher(&state);

        for _ in 0..3 {
            state.apply(jump(true));
            state.apply(jump(false));
            dispatcher.tick().await.unwrap();
        }

        assert_eq!(mock.sent(), vec!["M,0,0", "J,1", "J,1", "J,1"]);
    }

    #[tokio::test]
    async fn test_action_sent_once_per_press() {
        let state = new_state();
        let (mut dispatcher, mock) = new_dispatcher(&state);

        state.apply(jump(true));
        for _ in 0..5 {
            dispatcher.tick().await.unwrap();
        }

        assert_eq!(mock.sent(), vec!["M,0,0", "J,1"]);
    }

    #[tokio::test]
    async fn test_action_carries_level_at_consumption() {
        let state = new_state();
        let (mut dispatcher, mock) = new_dispatcher(&state);

        state.apply(ControllerEvent::Level(LevelDirection::Increase));
        state.apply(ControllerEvent::Level(LevelDirection::Increase));
        state.apply(jump(true));
        dispatcher.tick().await.unwrap();
        state.apply(ControllerEvent::Level(LevelDirection::Increase));
        dispatcher.tick().await.unwrap();

        assert_eq!(mock.sent(), vec!["M,0,0", "J,3"]);
    }

    #[tokio::test]
    async fn test_write_failure_is_returned() {
        let state = new_state();
        let (mut dispatcher, mock) = new_dispatcher(&state);
        mock.set_fail_after(1);

        dispatcher.tick().await.unwrap();
        state.apply(jump(true));
        let err = dispatcher.tick().await.unwrap_err();

        assert!(matches!(err, BridgeError::Transport(_)));
        assert_eq!(mock.sent(), vec!["M,0,0"]);
    }

    #[tokio::test]
    async fn test_failed_motion_is_retried_next_tick() {
        let state = new_state();
        let (mut dispatcher, mock) = new_dispatcher(&state);
        mock.set_fail_after(0);

        assert!(dispatcher.tick().await.is_err());
        *mock.fail_after.lock().unwrap() = None;
        dispatcher.tick().await.unwrap();

        assert_eq!(mock.sent(), vec!["M,0,0"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_until_exit() {
        let state = new_state();
        let (dispatcher, mock) = new_dispatcher(&state);

        let task = tokio::spawn(async move {
            let mut dispatcher = dispatcher;
            dispatcher.run().await.map(|()| dispatcher.commands_sent())
        });

        sleep(Duration::from_millis(120)).await;
        state.apply(axis(Stick::LeftY, 0));
        sleep(Duration::from_millis(120)).await;
        state.request_exit();

        let sent = task.await.unwrap().unwrap();
        assert_eq!(sent, 2);
        assert_eq!(mock.sent(), vec!["M,0,0", "M,255,255"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_stops_on_write_failure() {
        let state = new_state();
        let (mut dispatcher, mock) = new_dispatcher(&state);
        mock.set_fail_after(1);

        let runner = tokio::spawn(async move { dispatcher.run().await });
        sleep(Duration::from_millis(60)).await;
        state.apply(axis(Stick::LeftY, 0));

        let result = runner.await.unwrap();
        assert!(matches!(result, Err(BridgeError::Transport(_))));
        assert!(!state.exit_requested());
    }

    #[tokio::test]
    async fn test_run_returns_immediately_after_exit() {
        let state = new_state();
        state.request_exit();
        let (mut dispatcher, mock) = new_dispatcher(&state);

        dispatcher.run().await.unwrap();
        assert!(mock.get_written_data().is_empty());
    }

    #[tokio::test]
    async fn test_into_transport() {
        let state = new_state();
        let (dispatcher, mock) = new_dispatcher(&state);

        let mut transport = dispatcher.into_transport();
        transport.close().await.unwrap();
        assert!(mock.is_closed());
    }
}
