//! Session lifecycle types.

use std::fmt::{Display, Formatter};
use std::process::ExitStatus;

use chrono::{DateTime, Utc};

/// Lifecycle state of one connection's interpreter session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Run directory, pipes, and interpreter are being set up.
    Provisioning,
    /// Commands are accepted and output is fanned in.
    Running,
    /// Teardown in progress; no further commands are handled.
    Closing,
    /// Interpreter terminated and resources released.
    Closed,
}

impl SessionState {
    /// Determine whether a lifecycle transition is permitted.
    #[must_use]
    pub fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Provisioning, Self::Running | Self::Closing)
                | (Self::Running, Self::Closing)
                | (Self::Closing, Self::Closed)
        )
    }
}

impl Display for SessionState {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Provisioning => "provisioning",
            Self::Running => "running",
            Self::Closing => "closing",
            Self::Closed => "closed",
        };
        f.write_str(name)
    }
}

/// First event that moved a session out of `Running`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CloseCause {
    /// The client connection closed.
    ConnectionClosed,
    /// The interpreter's stdin could not be written.
    StdinClosed,
    /// The interpreter's stdout reached EOF or failed.
    StdoutClosed,
    /// The interpreter process exited on its own.
    InterpreterExited,
    /// The server is shutting down.
    Shutdown,
}

impl Display for CloseCause {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let text = match self {
            Self::ConnectionClosed => "connection closed",
            Self::StdinClosed => "interpreter stdin closed",
            Self::StdoutClosed => "interpreter stdout closed",
            Self::InterpreterExited => "interpreter exited",
            Self::Shutdown => "server shutdown",
        };
        f.write_str(text)
    }
}

/// Outcome of a finished session.
#[derive(Debug, Clone)]
pub struct SessionReport {
    /// Session identifier used in log spans.
    pub session_id: String,
    /// Why the session left `Running`.
    pub cause: CloseCause,
    /// Interpreter exit status; `None` when it never started or could not be reaped.
    pub exit_status: Option<ExitStatus>,
    /// When provisioning began.
    pub started_at: DateTime<Utc>,
    /// When the session reached `Closed`.
    pub ended_at: DateTime<Utc>,
}

impl SessionReport {
    /// Whether the interpreter is known to have terminated.
    #[must_use]
    pub fn interpreter_terminated(&self) -> bool {
        self.exit_status.is_some()
    }
}
