//! Error types for the Strand sync engine.

use crate::ids::DocumentId;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Result type alias for Strand operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Coarse error classification carried over the wire.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    NotFound,
    DuplicateId,
    Unauthorized,
    ValidationFailed,
    UnknownMethod,
    UnknownPublication,
    ConnectionLost,
    ProtocolViolation,
    Internal,
}

impl ErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::NotFound => "not_found",
            ErrorKind::DuplicateId => "duplicate_id",
            ErrorKind::Unauthorized => "unauthorized",
            ErrorKind::ValidationFailed => "validation_failed",
            ErrorKind::UnknownMethod => "unknown_method",
            ErrorKind::UnknownPublication => "unknown_publication",
            ErrorKind::ConnectionLost => "connection_lost",
            ErrorKind::ProtocolViolation => "protocol_violation",
            ErrorKind::Internal => "internal",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error types for store, publication and method operations.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    /// Mutation targeted a document that does not exist.
    #[error("document not found: {id}")]
    NotFound { id: DocumentId },
    /// Insert reused an existing id.
    #[error("document already exists: {id}")]
    DuplicateId { id: DocumentId },
    /// Subscribe or invoke denied.
    #[error("unauthorized: {message}")]
    Unauthorized { message: String },
    /// Arguments rejected before any mutation.
    #[error("validation failed: {message}")]
    ValidationFailed { message: String },
    #[error("unknown method: {name}")]
    UnknownMethod { name: String },
    #[error("unknown publication: {name}")]
    UnknownPublication { name: String },
    /// The channel went away.
    #[error("connection lost")]
    ConnectionLost,
    /// Malformed or out-of-sequence message; the connection must be dropped.
    #[error("protocol violation: {message}")]
    ProtocolViolation { message: String },
    #[error("internal error: {message}")]
    Internal { message: String },
}

impl Error {
    pub fn not_found(id: DocumentId) -> Self {
        Error::NotFound { id }
    }

    pub fn duplicate_id(id: DocumentId) -> Self {
        Error::DuplicateId { id }
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Error::Unauthorized {
            message: message.into(),
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Error::ValidationFailed {
            message: message.into(),
        }
    }

    pub fn unknown_method(name: impl Into<String>) -> Self {
        Error::UnknownMethod { name: name.into() }
    }

    pub fn unknown_publication(name: impl Into<String>) -> Self {
        Error::UnknownPublication { name: name.into() }
    }

    pub fn protocol_violation(message: impl Into<String>) -> Self {
        Error::ProtocolViolation {
            message: message.into(),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Error::Internal {
            message: message.into(),
        }
    }

    /// Returns the wire classification of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::NotFound { .. } => ErrorKind::NotFound,
            Error::DuplicateId { .. } => ErrorKind::DuplicateId,
            Error::Unauthorized { .. } => ErrorKind::Unauthorized,
            Error::ValidationFailed { .. } => ErrorKind::ValidationFailed,
            Error::UnknownMethod { .. } => ErrorKind::UnknownMethod,
            Error::UnknownPublication { .. } => ErrorKind::UnknownPublication,
            Error::ConnectionLost => ErrorKind::ConnectionLost,
            Error::ProtocolViolation { .. } => ErrorKind::ProtocolViolation,
            Error::Internal { .. } => ErrorKind::Internal,
        }
    }

    #[inline]
    pub fn is_protocol_violation(&self) -> bool {
        matches!(self, Error::ProtocolViolation { .. })
    }
}
