//! # Command Encoder
//!
//! Validates commands and encodes them into link payloads.

use bytes::Bytes;

use super::protocol::*;
use crate::error::{BridgeError, Result};

/// Encode a command into the bytes of a single link write
///
/// # Errors
///
/// Returns `InvalidCommandState` if a PWM value or level is outside what the
/// firmware accepts. The controller state clamps every value, so this
/// indicates a bug rather than an operator error.
///
/// # Examples
///
/// ```
/// use teleop_bridge::command::{encode_command, Command};
///
/// let payload = encode_command(&Command::motion(96, 96))?;
/// assert_eq!(&payload[..], b"M,96,96");
/// # Ok::<(), teleop_bridge::error::BridgeError>(())
/// ```
pub fn encode_command(command: &Command) -> Result<Bytes> {
    validate_command(command)?;
    Ok(Bytes::from(command.to_string()))
}

/// Check that every field of a command is in range
pub fn validate_command(command: &Command) -> Result<()> {
    match *command {
        Command::Motion { left, right } => {
            for (side, value) in [("left", left), ("right", right)] {
                if !(PWM_VALUE_MIN..=PWM_VALUE_MAX).contains(&value) {
                    return Err(BridgeError::InvalidCommandState(format!(
                        "{} PWM {} outside {}..={}",
                        side, value, PWM_VALUE_MIN, PWM_VALUE_MAX
                    )));
                }
            }
        }
        Command::Action { level } => {
            if !(LEVEL_VALUE_MIN..=LEVEL_VALUE_MAX).contains(&level) {
                return Err(BridgeError::InvalidCommandState(format!(
                    "jump level {} outside {}..={}",
                    level, LEVEL_VALUE_MIN, LEVEL_VALUE_MAX
                )));
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_motion() {
        let payload = encode_command(&Command::motion(-128, 255)).unwrap();
        assert_eq!(&payload[..], b"M,-128,255");
    }

    #[test]
    fn test_encode_action() {
        let payload = encode_command(&Command::action(3)).unwrap();
        assert_eq!(&payload[..], b"J,3");
    }

    #[test]
    fn test_encoded_is_ascii_without_terminator() {
        let payload = encode_command(&Command::motion(-255, 7)).unwrap();
        assert!(payload.is_ascii());
        assert!(!payload.ends_with(b"\n"));
        assert!(payload.len() <= MAX_COMMAND_LEN);
    }

    #[test]
    fn test_boundary_values_accepted() {
        assert!(encode_command(&Command::motion(-255, 255)).is_ok());
        assert!(encode_command(&Command::action(1)).is_ok());
        assert!(encode_command(&Command::action(10)).is_ok());
    }

    #[test]
    fn test_out_of_range_pwm_rejected() {
        let err = encode_command(&Command::motion(0, 256)).unwrap_err();
        match err {
            BridgeError::InvalidCommandState(msg) => assert!(msg.contains("right PWM 256")),
            other => panic!("Expected InvalidCommandState, got: {:?}", other),
        }

        assert!(matches!(
            encode_command(&Command::motion(-256, 0)),
            Err(BridgeError::InvalidCommandState(_))
        ));
    }

    #[test]
    fn test_out_of_range_level_rejected() {
        for level in [0, 11, 255] {
            assert!(matches!(
                encode_command(&Command::action(level)),
                Err(BridgeError::InvalidCommandState(_))
            ));
        }
    }

    #[test]
    fn test_invalid_state_is_fatal() {
        let err = validate_command(&Command::action(0)).unwrap_err();
        assert!(err.is_fatal());
    }
}
