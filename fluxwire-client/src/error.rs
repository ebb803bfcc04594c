//! Cursor error types.

use fluxwire_protocol::{ProtocolError, UnknownFormat};
use std::fmt;
use thiserror::Error;

/// Nesting level at which a server-reported error was found.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorLevel {
    Response,
    Result,
    Series,
    Row,
}

impl fmt::Display for ErrorLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorLevel::Response => write!(f, "response"),
            ErrorLevel::Result => write!(f, "result"),
            ErrorLevel::Series => write!(f, "series"),
            ErrorLevel::Row => write!(f, "row"),
        }
    }
}

/// Errors surfaced while iterating a result stream.
#[derive(Debug, Error)]
pub enum CursorError {
    /// Malformed framing. The stream is unusable.
    #[error("protocol error: {0}")]
    Protocol(ProtocolError),

    /// The byte source failed. The stream is unusable.
    #[error("transport error: {0}")]
    Transport(#[source] std::io::Error),

    /// An inline error carried by a header. Only the node that carried it
    /// is lost; its parent can keep iterating.
    #[error("{message}")]
    Server { level: ErrorLevel, message: String },

    #[error("unknown format: {format}")]
    UnsupportedFormat { format: String },

    #[error("cursor is closed")]
    Closed,
}

impl CursorError {
    pub(crate) fn server(level: ErrorLevel, message: String) -> Self {
        CursorError::Server { level, message }
    }

    /// Returns whether the stream can no longer be read.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, CursorError::Server { .. })
    }

    /// Returns the server's message for an inline error.
    pub fn server_message(&self) -> Option<&str> {
        match self {
            CursorError::Server { message, .. } => Some(message),
            _ => None,
        }
    }

    /// Returns the level of an inline error.
    pub fn level(&self) -> Option<ErrorLevel> {
        match self {
            CursorError::Server { level, .. } => Some(*level),
            _ => None,
        }
    }
}

impl From<ProtocolError> for CursorError {
    fn from(err: ProtocolError) -> Self {
        match err {
            ProtocolError::Io(e) => CursorError::Transport(e),
            other => CursorError::Protocol(other),
        }
    }
}

impl From<std::io::Error> for CursorError {
    fn from(err: std::io::Error) -> Self {
        CursorError::Transport(err)
    }
}

impl From<UnknownFormat> for CursorError {
    fn from(err: UnknownFormat) -> Self {
        CursorError::UnsupportedFormat { format: err.0 }
    }
}
