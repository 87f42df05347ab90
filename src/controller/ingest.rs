//! # Event Ingestion Task
//!
//! Pulls events from an [`InputSource`] and applies them to the
//! [`SharedState`] as they arrive.
//!
//! When the source cannot be read, both sticks are recentered so the vehicle
//! stops, and the source is reacquired after a fixed backoff. Modifiers, drive
//! mode and jump level survive the outage.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::sleep;
use tracing::{debug, info, warn};

use super::shared::SharedState;
use super::source::InputSource;
use crate::error::{BridgeError, Result};

/// Default delay between reconnect attempts
pub const DEFAULT_RECONNECT_INTERVAL: Duration = Duration::from_millis(1000);

/// Ingestion task settings
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IngestSettings {
    /// Delay between reconnect attempts
    pub reconnect_interval: Duration,
    /// Consecutive failures before giving up. 0 retries forever.
    pub max_reconnect_attempts: u32,
}

impl Default for IngestSettings {
    fn default() -> Self {
        Self {
            reconnect_interval: DEFAULT_RECONNECT_INTERVAL,
            max_reconnect_attempts: 0,
        }
    }
}

/// Runs the ingestion loop until exit is requested.
///
/// # Errors
///
/// Returns `InputDeviceLost` after `max_reconnect_attempts` consecutive
/// failures, and any error for which [`BridgeError::is_fatal`] holds right
/// away. Exit is requested on the shared state before returning so the
/// dispatcher winds down as well.
pub async fn run_ingestion<S>(
    mut source: S,
    state: Arc<SharedState>,
    settings: IngestSettings,
) -> Result<()>
where
    S: InputSource,
{
    let mut exit_rx = state.subscribe_exit();
    let mut failures: u32 = 0;

    info!("Input ingestion started");

    while !state.exit_requested() {
        match source.connect().await {
            Ok(()) => {
                if failures > 0 {
                    info!("Gamepad reacquired after {} failed attempts", failures);
                }
                failures = 0;

                let lost = read_until_lost(&mut source, &state, &mut exit_rx).await;
                source.disconnect();

                match lost {
                    Some(e) if e.is_fatal() => return Err(abandon(&state, e)),
                    Some(e) => warn!("Gamepad lost: {}", e),
                    None => break,
                }
            }
            Err(e) if e.is_fatal() => return Err(abandon(&state, e)),
            Err(e) => debug!("Gamepad unavailable: {}", e),
        }

        state.neutralize_axes();
        failures += 1;

        if settings.max_reconnect_attempts > 0 && failures >= settings.max_reconnect_attempts {
            warn!("Giving up on gamepad after {} attempts", failures);
            state.request_exit();
            return Err(BridgeError::InputDeviceLost { attempts: failures });
        }

        if wait_or_exit(&mut exit_rx, settings.reconnect_interval).await {
            break;
        }
    }

    info!("Input ingestion stopped");
    Ok(())
}

/// Stops the vehicle and ends the session on an error reconnecting cannot fix.
fn abandon(state: &SharedState, error: BridgeError) -> BridgeError {
    warn!("Input source failed permanently: {}", error);
    state.neutralize_axes();
    state.request_exit();
    error
}

/// Applies events until the source fails or exit is requested.
///
/// Returns the read error, or `None` on exit.
async fn read_until_lost<S>(
    source: &mut S,
    state: &SharedState,
    exit_rx: &mut watch::Receiver<bool>,
) -> Option<BridgeError>
where
    S: InputSource,
{
    loop {
        tokio::select! {
            biased;

            _ = exit_rx.wait_for(|exit| *exit) => return None,

            event = source.next_event() => match event {
                Ok(Some(event)) => state.apply(event),
                Ok(None) => {}
                Err(e) => return Some(e),
            },
        }
    }
}

/// Sleeps for `delay`. Returns `true` if exit was requested meanwhile.
async fn wait_or_exit(exit_rx: &mut watch::Receiver<bool>, delay: Duration) -> bool {
    tokio::select! {
        _ = sleep(delay) => false,
        _ = exit_rx.wait_for(|exit| *exit) => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::controller::source::MockInputSource;
    use crate::controller::state::{
        ControllerEvent, ControllerState, DriveMode, Direction, LevelDirection, Modifier, Stick,
    };
    use crate::controller::status::LogObserver;
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::time::Instant;

    /// Source that replays a script, then blocks forever
    struct ScriptedSource {
        events: VecDeque<Result<Option<ControllerEvent>>>,
        connects: Arc<AtomicUsize>,
    }

    impl ScriptedSource {
        fn new(events: Vec<Result<Option<ControllerEvent>>>) -> Self {
            Self {
                events: events.into(),
                connects: Arc::new(AtomicUsize::new(0)),
            }
        }
    }

    #[async_trait]
    impl InputSource for ScriptedSource {
        async fn connect(&mut self) -> Result<()> {
            self.connects.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        async fn next_event(&mut self) -> Result<Option<ControllerEvent>> {
            match self.events.pop_front() {
                Some(event) => event,
                None => std::future::pending().await,
            }
        }

        fn disconnect(&mut self) {}
    }

    fn new_state() -> Arc<SharedState> {
        Arc::new(SharedState::new(ControllerState::new(), Arc::new(LogObserver)))
    }

    fn settings(max_reconnect_attempts: u32) -> IngestSettings {
        IngestSettings {
            reconnect_interval: Duration::from_secs(1),
            max_reconnect_attempts,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_events_applied_until_exit() {
        let state = new_state();
        let source = ScriptedSource::new(vec![
            Ok(Some(ControllerEvent::Axis { stick: Stick::LeftY, raw: 0 })),
            Ok(None),
            Ok(Some(ControllerEvent::Level(LevelDirection::Increase))),
        ]);

        let task = tokio::spawn(run_ingestion(source, Arc::clone(&state), settings(0)));
        sleep(Duration::from_millis(10)).await;

        assert_eq!(state.compute_motor_pwms(), (255, 255));
        assert_eq!(state.current_level(), 2);

        state.request_exit();
        let result = task.await.unwrap();
        assert!(result.is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn test_read_error_neutralizes_and_reconnects() {
        let state = new_state();
        let source = ScriptedSource::new(vec![
            Ok(Some(ControllerEvent::Axis { stick: Stick::LeftY, raw: 0 })),
            Ok(Some(ControllerEvent::Modifier { modifier: Modifier::Slow, pressed: true })),
            Ok(Some(ControllerEvent::ModeToggle(Direction::Positive))),
            Err(BridgeError::InputSourceUnavailable("unplugged".into())),
        ]);
        let connects = Arc::clone(&source.connects);

        let task = tokio::spawn(run_ingestion(source, Arc::clone(&state), settings(0)));
        sleep(Duration::from_millis(10)).await;

        // Stopped immediately, not reconnected yet
        assert_eq!(state.compute_motor_pwms(), (0, 0));
        assert_eq!(connects.load(Ordering::SeqCst), 1);

        // Modes survive the outage
        let snapshot = state.snapshot();
        assert_eq!(snapshot.drive_mode(), DriveMode::Split);

        sleep(Duration::from_millis(1000)).await;
        assert_eq!(connects.load(Ordering::SeqCst), 2);

        state.request_exit();
        assert!(task.await.unwrap().is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn test_gives_up_after_reconnect_budget() {
        let state = new_state();
        let mut source = MockInputSource::new();
        source
            .expect_connect()
            .times(3)
            .returning(|| Err(BridgeError::ControllerNotFound));

        let started = Instant::now();
        let result = run_ingestion(source, Arc::clone(&state), settings(3)).await;

        match result {
            Err(BridgeError::InputDeviceLost { attempts }) => assert_eq!(attempts, 3),
            other => panic!("Expected InputDeviceLost, got: {:?}", other),
        }
        assert!(state.exit_requested());
        // Two backoffs between three attempts
        let elapsed = started.elapsed();
        assert!(elapsed >= Duration::from_secs(2) && elapsed < Duration::from_secs(3));
    }

    #[tokio::test(start_paused = true)]
    async fn test_fatal_connect_error_is_not_retried() {
        let state = new_state();
        let mut source = MockInputSource::new();
        source
            .expect_connect()
            .times(1)
            .returning(|| Err(BridgeError::Io(std::io::ErrorKind::PermissionDenied.into())));

        let result = run_ingestion(source, Arc::clone(&state), settings(0)).await;

        assert!(matches!(result, Err(BridgeError::Io(_))));
        assert!(state.exit_requested());
    }

    #[tokio::test(start_paused = true)]
    async fn test_fatal_read_error_stops_vehicle() {
        let state = new_state();
        let source = ScriptedSource::new(vec![
            Ok(Some(ControllerEvent::Axis { stick: Stick::LeftY, raw: 0 })),
            Err(BridgeError::InvalidCommandState("axis out of range".into())),
        ]);
        let connects = Arc::clone(&source.connects);

        let result = run_ingestion(source, Arc::clone(&state), settings(0)).await;

        assert!(matches!(result, Err(BridgeError::InvalidCommandState(_))));
        assert_eq!(state.compute_motor_pwms(), (0, 0));
        assert_eq!(connects.load(Ordering::SeqCst), 1);
        assert!(state.exit_requested());
    }

    #[tokio::test(start_paused = true)]
    async fn test_exit_interrupts_backoff() {
        let state = new_state();
        let mut source = MockInputSource::new();
        source
            .expect_connect()
            .returning(|| Err(BridgeError::InputSourceUnavailable("absent".into())));

        let started = Instant::now();
        let task = tokio::spawn(run_ingestion(source, Arc::clone(&state), settings(0)));
        sleep(Duration::from_millis(100)).await;
        state.request_exit();

        assert!(task.await.unwrap().is_ok());
        assert!(started.elapsed() < Duration::from_secs(1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_exit_button_stops_ingestion() {
        let state = new_state();
        let source = ScriptedSource::new(vec![Ok(Some(ControllerEvent::Exit))]);

        let result = run_ingestion(source, Arc::clone(&state), settings(0)).await;

        assert!(result.is_ok());
        assert!(state.exit_requested());
    }

    #[tokio::test(start_paused = true)]
    async fn test_already_exited_never_connects() {
        let state = new_state();
        state.request_exit();
        let mut source = MockInputSource::new();
        source.expect_connect().times(0);

        assert!(run_ingestion(source, state, settings(0)).await.is_ok());
    }
}
