use std::path::PathBuf;

use thiserror::Error;
use transport::{ProtocolError, Word};

use crate::state::SessionState;

/// Errors raised by the breakpoint and watchpoint registry.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RegistryError {
    /// The line carries no code in the file it was set on.
    #[error("line {line} of {} is not a breakable line", file.display())]
    InvalidLine { file: PathBuf, line: u32 },

    /// A watchpoint without a condition.
    #[error("watchpoint has no condition")]
    InvalidWatchpoint,

    /// A persisted record could not be parsed.
    #[error("malformed record {record:?}: {reason}")]
    MalformedRecord { record: String, reason: String },

    /// A field cannot be written to a legacy record without corrupting it.
    #[error("{0:?} cannot be stored in a legacy record")]
    UnrepresentableField(String),

    #[error("a watchpoint for {0:?} already exists")]
    DuplicateWatchpoint(String),

    #[error("no breakpoint at {}:{line}", file.display())]
    UnknownBreakpoint { file: PathBuf, line: u32 },

    #[error("no watchpoint for {0:?}")]
    UnknownWatchpoint(String),
}

impl RegistryError {
    pub(crate) fn malformed(record: &str, reason: impl ToString) -> Self {
        Self::MalformedRecord {
            record: record.to_string(),
            reason: reason.to_string(),
        }
    }
}

/// Errors surfaced to users of a [`Session`](crate::Session).
#[derive(Debug, Error)]
pub enum SessionError {
    /// The request does not make sense in the current state and was not sent.
    #[error("cannot send {word} while the session is {state}")]
    InvalidState { word: Word, state: SessionState },

    /// The session worker is gone.
    #[error("session is not connected")]
    NotConnected,

    #[error("session has terminated ({0})")]
    Terminated(SessionState),

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error(transparent)]
    Protocol(#[from] ProtocolError),
}

/// A breakpoint or watchpoint condition could not be evaluated.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("{message}")]
pub struct ConditionError {
    pub message: String,
}

impl ConditionError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}
