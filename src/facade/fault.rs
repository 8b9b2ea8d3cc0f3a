//! Fault classification for session calls
//!
//! Every failure coming back from the session is sorted into one of two
//! buckets. A connection fault means the session itself is unusable and must
//! be reported to its owner; an operation fault means a single command failed
//! against a session that is presumably still alive.

/// A failure reported by a session call
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SessionError {
    /// The session is not connected.
    #[error("session is not connected")]
    NotConnected,

    /// The underlying transport broke mid-call.
    #[error("transport failure: {detail}")]
    Transport { detail: String },

    /// A command was issued in an order the session cannot accept.
    #[error("illegal call sequence: {detail}")]
    IllegalState { detail: String },

    /// The target entity does not exist (yet).
    #[error("unknown entity '{id}'")]
    UnknownEntity { id: String },

    /// A command argument was rejected.
    #[error("invalid argument: {detail}")]
    InvalidArgument { detail: String },

    /// The session refused the command for another reason.
    #[error("command rejected: {detail}")]
    Rejected { detail: String },

    /// The reply did not have the shape the command expects.
    #[error("unexpected reply to {command}")]
    UnexpectedReply { command: String },
}

/// Verdict of the fault classifier
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fault {
    /// The session is unusable.
    Connection,
    /// Only this command failed.
    Operation,
}

/// Classify a session failure
pub fn classify(error: &SessionError) -> Fault {
    match error {
        SessionError::NotConnected
        | SessionError::Transport { .. }
        | SessionError::IllegalState { .. } => Fault::Connection,
        SessionError::UnknownEntity { .. }
        | SessionError::InvalidArgument { .. }
        | SessionError::Rejected { .. }
        | SessionError::UnexpectedReply { .. } => Fault::Operation,
    }
}

impl SessionError {
    pub fn fault(&self) -> Fault {
        classify(self)
    }

    pub fn is_connection_fault(&self) -> bool {
        self.fault() == Fault::Connection
    }
}

/// A connection fault escaping a batch operation
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("connection fault: {0}")]
pub struct ConnectionFault(pub SessionError);

impl ConnectionFault {
    pub fn error(&self) -> &SessionError {
        &self.0
    }
}

/// Split a session result by fault class.
///
/// Connection faults become the outer error so they can be propagated with
/// `?`; operation faults stay in the inner result for the caller to absorb.
pub fn escalate<T>(result: Result<T, SessionError>) -> Result<Result<T, SessionError>, ConnectionFault> {
    match result {
        Err(err) if err.is_connection_fault() => Err(ConnectionFault(err)),
        other => Ok(other),
    }
}
