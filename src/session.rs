//! # Teleoperation Session
//!
//! Runs the ingestion task and the dispatcher side by side until one of them
//! ends the session, then reports why.
//!
//! Ingestion runs as its own tokio task and the dispatcher runs on the
//! caller's task. Whichever stops first requests exit on the shared state so
//! the other unwinds at its next iteration. Both are joined before returning.

use std::any::Any;
use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use tracing::{error, info, warn};

use crate::config::Config;
use crate::controller::ingest::{run_ingestion, IngestSettings};
use crate::controller::shared::SharedState;
use crate::controller::source::InputSource;
use crate::dispatch::Dispatcher;
use crate::error::{BridgeError, Result};
use crate::transport::Transport;

/// Why a session ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionOutcome {
    /// Exit was requested by the operator (button or Ctrl+C)
    OperatorExit,
    /// A write to the vehicle failed
    LinkLost(String),
    /// The controller stayed unavailable for the whole reconnect budget
    InputLost(String),
    /// An internal value went out of range or a task panicked
    InvariantViolation(String),
}

impl SessionOutcome {
    /// Whether the session ended because the operator asked it to
    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(self, SessionOutcome::OperatorExit)
    }

    /// Classify the error that ended a session
    #[must_use]
    pub fn from_error(error: &BridgeError) -> Self {
        match error {
            BridgeError::InputDeviceLost { .. }
            | BridgeError::InputSourceUnavailable(_)
            | BridgeError::ControllerNotFound => SessionOutcome::InputLost(error.to_string()),
            BridgeError::InvalidCommandState(_) | BridgeError::TaskFailed(_) => {
                SessionOutcome::InvariantViolation(error.to_string())
            }
            _ => SessionOutcome::LinkLost(error.to_string()),
        }
    }
}

impl fmt::Display for SessionOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionOutcome::OperatorExit => write!(f, "Session ended by operator"),
            SessionOutcome::LinkLost(reason) => write!(f, "Link to vehicle lost: {}", reason),
            SessionOutcome::InputLost(reason) => write!(f, "Controller lost: {}", reason),
            SessionOutcome::InvariantViolation(reason) => {
                write!(f, "Internal error, stopping: {}", reason)
            }
        }
    }
}

/// Run a session until exit or a fatal error
///
/// The transport is closed before returning. A close failure is logged and
/// does not change the outcome.
///
/// # Examples
///
/// ```no_run
/// use std::sync::Arc;
/// use teleop_bridge::config::Config;
/// use teleop_bridge::controller::gamepad::EvdevSource;
/// use teleop_bridge::controller::shared::SharedState;
/// use teleop_bridge::controller::state::ControllerState;
/// use teleop_bridge::controller::status::LogObserver;
/// use teleop_bridge::session::run_session;
/// use teleop_bridge::transport::SerialTransport;
///
/// #[tokio::main]
/// async fn main() -> anyhow::Result<()> {
///     let config = Config::default();
///     let state = Arc::new(SharedState::new(ControllerState::new(), Arc::new(LogObserver)));
///     let link = SerialTransport::open("/dev/ttyUSB0", 115_200)?;
///
///     let outcome = run_session(state, link, EvdevSource::new(None), &config).await;
///     println!("{}", outcome);
///     Ok(())
/// }
/// ```
pub async fn run_session<T, S>(
    state: Arc<SharedState>,
    transport: T,
    source: S,
    config: &Config,
) -> SessionOutcome
where
    T: Transport,
    S: InputSource + 'static,
{
    info!("Session started, link: {}", transport.describe());

    let ingestion = tokio::spawn(supervise_ingestion(
        source,
        Arc::clone(&state),
        config.ingest_settings(),
    ));

    let mut dispatcher = Dispatcher::new(transport, Arc::clone(&state), config.dispatch_period());
    let dispatched = dispatcher.run().await;

    // Dispatcher may have stopped on its own; wake ingestion either way
    state.request_exit();

    let ingested = match ingestion.await {
        Ok(result) => result,
        Err(e) => Err(BridgeError::TaskFailed(format!("ingestion: {}", e))),
    };

    let mut transport = dispatcher.into_transport();
    if let Err(e) = transport.close().await {
        warn!("Failed to close link: {}", e);
    }

    let outcome = classify(dispatched, ingested);
    if outcome.is_success() {
        info!("{}", outcome);
    } else {
        error!("{}", outcome);
    }
    outcome
}

/// Runs ingestion, turning a panic into a stopped vehicle and a session error
async fn supervise_ingestion<S>(
    source: S,
    state: Arc<SharedState>,
    settings: IngestSettings,
) -> Result<()>
where
    S: InputSource,
{
    let ingestion = run_ingestion(source, Arc::clone(&state), settings);

    match AssertUnwindSafe(ingestion).catch_unwind().await {
        Ok(result) => result,
        Err(payload) => {
            state.neutralize_axes();
            state.request_exit();
            Err(BridgeError::TaskFailed(format!(
                "ingestion panicked: {}",
                panic_message(payload.as_ref())
            )))
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    payload
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("unknown cause")
}

/// The dispatcher's error wins: it is what the vehicle saw last
fn classify(dispatched: Result<()>, ingested: Result<()>) -> SessionOutcome {
    match (dispatched, ingested) {
        (Err(e), _) | (Ok(()), Err(e)) => SessionOutcome::from_error(&e),
        (Ok(()), Ok(())) => SessionOutcome::OperatorExit,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::controller::source::MockInputSource;
    use crate::controller::state::{Action, ControllerEvent, ControllerState, Stick};
    use crate::controller::status::LogObserver;
    use crate::transport::mocks::MockTransport;
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::time::Duration;
    use tokio::time::sleep;

    /// Source that replays a script with a pause before each event, then blocks
    struct ScriptedSource {
        events: VecDeque<ControllerEvent>,
        pause: Duration,
    }

    impl ScriptedSource {
        fn new(events: Vec<ControllerEvent>) -> Self {
            Self {
                events: events.into(),
                pause: Duration::from_millis(100),
            }
        }
    }

    #[async_trait]
    impl InputSource for ScriptedSource {
        async fn connect(&mut self) -> Result<()> {
            Ok(())
        }

        async fn next_event(&mut self) -> Result<Option<ControllerEvent>> {
            sleep(self.pause).await;
            match self.events.pop_front() {
                Some(event) => Ok(Some(event)),
                None => std::future::pending().await,
            }
        }

        fn disconnect(&mut self) {}
    }

    /// Source whose first read panics
    struct PanickingSource;

    #[async_trait]
    impl InputSource for PanickingSource {
        async fn connect(&mut self) -> Result<()> {
            Ok(())
        }

        async fn next_event(&mut self) -> Result<Option<ControllerEvent>> {
            panic!("evdev buffer corrupted");
        }

        fn disconnect(&mut self) {}
    }

    fn new_state() -> Arc<SharedState> {
        Arc::new(SharedState::new(ControllerState::new(), Arc::new(LogObserver)))
    }

    #[test]
    fn test_outcome_from_error() {
        assert_eq!(
            SessionOutcome::from_error(&BridgeError::Transport("gone".into())),
            SessionOutcome::LinkLost("Transport write failed: gone".into())
        );
        assert!(matches!(
            SessionOutcome::from_error(&BridgeError::InputDeviceLost { attempts: 3 }),
            SessionOutcome::InputLost(_)
        ));
        assert!(matches!(
            SessionOutcome::from_error(&BridgeError::InvalidCommandState("x".into())),
            SessionOutcome::InvariantViolation(_)
        ));
    }

    #[test]
    fn test_outcome_messages() {
        assert_eq!(SessionOutcome::OperatorExit.to_string(), "Session ended by operator");
        assert!(SessionOutcome::LinkLost("gone".into())
            .to_string()
            .starts_with("Link to vehicle lost"));
        assert!(SessionOutcome::InputLost("gone".into())
            .to_string()
            .starts_with("Controller lost"));
        assert!(SessionOutcome::OperatorExit.is_success());
        assert!(!SessionOutcome::InvariantViolation("x".into()).is_success());
    }

    #[test]
    fn test_dispatch_error_takes_precedence() {
        let outcome = classify(
            Err(BridgeError::Transport("gone".into())),
            Err(BridgeError::InputDeviceLost { attempts: 1 }),
        );
        assert!(matches!(outcome, SessionOutcome::LinkLost(_)));
        assert_eq!(classify(Ok(()), Ok(())), SessionOutcome::OperatorExit);
    }

    #[tokio::test(start_paused = true)]
    async fn test_exit_button_ends_session() {
        let state = new_state();
        let mock = MockTransport::new();
        let source = ScriptedSource::new(vec![
            ControllerEvent::Axis { stick: Stick::LeftY, raw: 0 },
            ControllerEvent::Action { action: Action::Jump, pressed: true },
            ControllerEvent::Exit,
        ]);

        let outcome = run_session(state, mock.clone(), source, &Config::default()).await;

        assert_eq!(outcome, SessionOutcome::OperatorExit);
        assert_eq!(mock.sent(), vec!["M,0,0", "M,255,255", "J,1"]);
        assert!(mock.is_closed());
    }

    #[tokio::test(start_paused = true)]
    async fn test_external_exit_ends_session() {
        let state = new_state();
        let mock = MockTransport::new();
        let source = ScriptedSource::new(Vec::new());

        let stopper = Arc::clone(&state);
        tokio::spawn(async move {
            sleep(Duration::from_millis(500)).await;
            stopper.request_exit();
        });

        let outcome = run_session(state, mock.clone(), source, &Config::default()).await;
        assert_eq!(outcome, SessionOutcome::OperatorExit);
        assert_eq!(mock.sent(), vec!["M,0,0"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_write_failure_ends_session() {
        let state = new_state();
        let mock = MockTransport::new();
        mock.set_fail_after(1);
        let source = ScriptedSource::new(vec![ControllerEvent::Axis { stick: Stick::LeftY, raw: 0 }]);

        let outcome = run_session(Arc::clone(&state), mock.clone(), source, &Config::default()).await;

        assert!(matches!(outcome, SessionOutcome::LinkLost(_)));
        assert!(state.exit_requested());
        assert!(mock.is_closed());
    }

    #[tokio::test(start_paused = true)]
    async fn test_panicked_ingestion_is_invariant_violation() {
        let state = new_state();
        let mock = MockTransport::new();

        let outcome =
            run_session(Arc::clone(&state), mock.clone(), PanickingSource, &Config::default())
                .await;

        match outcome {
            SessionOutcome::InvariantViolation(msg) => {
                assert_eq!(
                    msg,
                    "Background task failed: ingestion panicked: evdev buffer corrupted"
                );
            }
            other => panic!("Expected InvariantViolation, got: {:?}", other),
        }
        assert!(state.exit_requested());
        assert_eq!(state.compute_motor_pwms(), (0, 0));
        assert!(mock.is_closed());
    }

    #[tokio::test(start_paused = true)]
    async fn test_lost_controller_ends_session() {
        let state = new_state();
        let mock = MockTransport::new();
        let mut source = MockInputSource::new();
        source
            .expect_connect()
            .times(2)
            .returning(|| Err(BridgeError::ControllerNotFound));

        let mut config = Config::default();
        config.controller.max_reconnect_attempts = 2;

        let outcome = run_session(state, mock.clone(), source, &config).await;

        match outcome {
            SessionOutcome::InputLost(msg) => assert!(msg.contains("2 reconnect attempts")),
            other => panic!("Expected InputLost, got: {:?}", other),
        }
        assert_eq!(mock.sent(), vec!["M,0,0"]);
    }
}
