//! DAP error types.

use thiserror::Error;

/// Errors from DAP client operations.
///
/// Adapter-reported failures (`success: false`) are not errors; they come
/// back as a normal [`Response`](crate::protocol::Response).
#[derive(Debug, Error)]
pub enum DapError {
    /// Underlying I/O failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Transport-level framing or write error.
    #[error("transport error: {0}")]
    Transport(String),

    /// The transport is not connected; nothing was sent.
    #[error("not connected to debug adapter")]
    NotConnected,

    /// The adapter connection was lost while the request was in flight.
    #[error("connection lost: {0}")]
    ConnectionLost(String),

    /// Request timed out waiting for a response.
    #[error("request timed out: {command}")]
    Timeout {
        /// The command that timed out.
        command: String,
    },

    /// The caller cancelled the request.
    #[error("request cancelled: {command}")]
    Cancelled {
        /// The command that was cancelled.
        command: String,
    },

    /// Adapter sent an invalid or unparseable message.
    #[error("adapter sent invalid response: {0}")]
    InvalidResponse(String),

    /// The adapter returned no frames for the thread.
    #[error("thread {thread_id} has an empty call stack")]
    EmptyStack {
        /// The thread that was inspected.
        thread_id: i64,
    },

    /// No frame with the requested id is on the current call stack.
    #[error("stack frame {0} not found")]
    FrameNotFound(i64),

    /// Session has already been terminated.
    #[error("session already terminated")]
    Terminated,

    /// A session registry lookup failed.
    #[error("no session registered with id {0:?}")]
    UnknownSession(String),

    /// A session id is already taken in the registry.
    #[error("session {0:?} already exists")]
    DuplicateSession(String),
}

impl DapError {
    /// Whether this error means the channel to the adapter is gone.
    pub fn is_connection_error(&self) -> bool {
        matches!(
            self,
            DapError::NotConnected | DapError::ConnectionLost(_) | DapError::Io(_)
        )
    }
}

/// Structural problems with a breakpoint specification.
///
/// These never reach the protocol layer.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BreakpointError {
    /// A required field is absent.
    #[error("breakpoint is missing required field '{0}'")]
    MissingField(&'static str),

    /// A field is present but has the wrong type or value.
    #[error("invalid breakpoint field '{field}': {message}")]
    InvalidField {
        /// The field name.
        field: &'static str,
        /// What is wrong with it.
        message: String,
    },

    /// The hit condition does not match the supported grammar.
    #[error("invalid hit condition {0:?}: expected N, >N, >=N, <N, <=N, ==N or %N")]
    InvalidHitCondition(String),

    /// An element of a batch is not a mapping.
    #[error("breakpoint at index {index} must be an object, got {found}")]
    NotAMapping {
        /// Position in the batch.
        index: usize,
        /// JSON type name that was found instead.
        found: &'static str,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_transport_display() {
        let err = DapError::Transport("connection reset".into());
        assert_eq!(err.to_string(), "transport error: connection reset");
    }

    #[test]
    fn error_timeout_display() {
        let err = DapError::Timeout {
            command: "evaluate".into(),
        };
        assert_eq!(err.to_string(), "request timed out: evaluate");
    }

    #[test]
    fn error_cancelled_display() {
        let err = DapError::Cancelled {
            command: "stackTrace".into(),
        };
        assert_eq!(err.to_string(), "request cancelled: stackTrace");
    }

    #[test]
    fn error_frame_not_found_names_id() {
        let err = DapError::FrameNotFound(42);
        assert_eq!(err.to_string(), "stack frame 42 not found");
        let empty = DapError::EmptyStack { thread_id: 3 };
        assert_ne!(err.to_string(), empty.to_string());
    }

    #[test]
    fn error_from_io_error_is_connection_error() {
        let io_err = std::io::Error::new(std::io::ErrorKind::BrokenPipe, "pipe broken");
        let err: DapError = io_err.into();
        assert!(matches!(err, DapError::Io(_)));
        assert!(err.is_connection_error());
    }

    #[test]
    fn connection_error_classification() {
        assert!(DapError::NotConnected.is_connection_error());
        assert!(DapError::ConnectionLost("eof".into()).is_connection_error());
        assert!(!DapError::Timeout {
            command: "threads".into()
        }
        .is_connection_error());
        assert!(!DapError::FrameNotFound(1).is_connection_error());
    }

    #[test]
    fn breakpoint_error_display() {
        assert_eq!(
            BreakpointError::MissingField("line").to_string(),
            "breakpoint is missing required field 'line'"
        );
        let err = BreakpointError::NotAMapping {
            index: 2,
            found: "string",
        };
        assert_eq!(
            err.to_string(),
            "breakpoint at index 2 must be an object, got string"
        );
        assert!(BreakpointError::InvalidHitCondition("abc".into())
            .to_string()
            .contains(">=N"));
    }
}
