//! Error taxonomy shared by the step tracker, timer manager, bridge and session.

use serde::{Deserialize, Serialize};
use std::fmt;

/// How the session should react to a failure reported by the realtime bridge.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum BridgeErrorKind {
    /// Transient upstream failure; the session logs it and re-sends its last instruction.
    Recoverable,
    /// The upstream connection is unusable; the session moves to `Closing`.
    Fatal,
}

impl fmt::Display for BridgeErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BridgeErrorKind::Recoverable => write!(f, "recoverable"),
            BridgeErrorKind::Fatal => write!(f, "fatal"),
        }
    }
}

/// Errors produced by session operations.
///
/// Step and timer errors never escape the dispatch boundary: they are turned
/// into function-call failure results for the speech model. Only fatal bridge
/// errors and `SessionClosed` reach the caller of the session.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SessionError {
    #[error("Step {index} does not exist (recipe has {total} steps)")]
    InvalidStepIndex { index: i64, total: usize },
    #[error("There are no more steps in this recipe")]
    NoMoreSteps,
    #[error("Timer duration must be positive, got {0} seconds")]
    InvalidDuration(i64),
    #[error("Timer '{0}' not found")]
    TimerNotFound(String),
    #[error("Timer '{id}' has already {status}")]
    TimerAlreadyTerminal { id: String, status: String },
    #[error("Session is closed")]
    SessionClosed,
    #[error("Realtime bridge error ({kind}): {message}")]
    Bridge {
        kind: BridgeErrorKind,
        message: String,
    },
}

impl SessionError {
    /// Shorthand for a fatal bridge error.
    pub fn fatal(message: impl Into<String>) -> Self {
        SessionError::Bridge {
            kind: BridgeErrorKind::Fatal,
            message: message.into(),
        }
    }

    /// Stable machine-readable identifier, used in function-call results and control events.
    pub fn code(&self) -> &'static str {
        match self {
            SessionError::InvalidStepIndex { .. } => "invalid_step_index",
            SessionError::NoMoreSteps => "no_more_steps",
            SessionError::InvalidDuration(_) => "invalid_duration",
            SessionError::TimerNotFound(_) => "timer_not_found",
            SessionError::TimerAlreadyTerminal { .. } => "timer_already_terminal",
            SessionError::SessionClosed => "session_closed",
            SessionError::Bridge { .. } => "bridge_error",
        }
    }
}
