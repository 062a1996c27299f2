use std::thread::ThreadId;
use std::time::Duration;

use thiserror::Error;

use crate::engine::EngineError;

#[derive(Debug, Error)]
pub enum SqlCursorError {
    #[error("Programming error: {0}")]
    ProgrammingError(String),

    #[error("Operational error: {0}")]
    OperationalError(String),

    #[error("Interface error: {0}")]
    InterfaceError(String),

    #[error("Unsupported type: {0}")]
    UnsupportedType(String),

    #[error("database is locked (busy timeout of {timeout:?} elapsed)")]
    Busy { timeout: Duration },

    #[error(
        "SQLite objects created in a thread can only be used in that same thread. \
         The object was created in thread {created:?} and this is thread {current:?}"
    )]
    WrongThread { created: ThreadId, current: ThreadId },

    #[error("Cannot operate on a closed {0}.")]
    Closed(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),
}

/// The four reportable error classes a caller can branch on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Misuse of the API: parameter mismatch, invalid operation ordering, use after close.
    Programming,
    /// Failures reported by the engine, including lock timeouts.
    Operational,
    /// The engine rejected a bound value.
    Interface,
    /// No adaptation exists for a parameter value.
    UnsupportedType,
}

impl SqlCursorError {
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::ProgrammingError(_)
            | Self::WrongThread { .. }
            | Self::Closed(_)
            | Self::ConfigError(_) => ErrorKind::Programming,
            Self::OperationalError(_) | Self::Busy { .. } => ErrorKind::Operational,
            Self::InterfaceError(_) => ErrorKind::Interface,
            Self::UnsupportedType(_) => ErrorKind::UnsupportedType,
        }
    }

    #[must_use]
    pub fn is_busy(&self) -> bool {
        matches!(self, Self::Busy { .. })
    }

    pub(crate) fn programming(msg: impl Into<String>) -> Self {
        Self::ProgrammingError(msg.into())
    }
}

impl From<EngineError> for SqlCursorError {
    fn from(err: EngineError) -> Self {
        SqlCursorError::OperationalError(err.message)
    }
}

impl From<serde_json::Error> for SqlCursorError {
    fn from(err: serde_json::Error) -> Self {
        SqlCursorError::ConfigError(format!("invalid connection options: {err}"))
    }
}
