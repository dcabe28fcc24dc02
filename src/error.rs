//! Error taxonomy shared by the event store and the document repository
//!
//! Every concrete error type in the crate maps onto one [`ErrorKind`], so
//! callers can decide how to react (retry on conflict, 404 on not found,
//! 5xx on everything else) without matching on individual variants.

use std::fmt;

/// Coarse classification of store failures
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// The persisted version differs from the version the caller loaded
    VersionConflict,
    /// An entity id is unknown to the repository
    NotFound,
    /// Marshalling or unmarshalling failed, or the log is inconsistent
    Serialization,
    /// The operating system refused a file or folder operation
    Io,
    /// A factory is missing or an entity was saved without an id
    Configuration,
    /// The caller passed a malformed batch or namespace
    InvalidInput,
}

impl ErrorKind {
    /// Whether the caller may reload state and try the operation again
    pub fn is_retryable(self) -> bool {
        matches!(self, ErrorKind::VersionConflict)
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorKind::VersionConflict => write!(f, "version_conflict"),
            ErrorKind::NotFound => write!(f, "not_found"),
            ErrorKind::Serialization => write!(f, "serialization"),
            ErrorKind::Io => write!(f, "io"),
            ErrorKind::Configuration => write!(f, "configuration"),
            ErrorKind::InvalidInput => write!(f, "invalid_input"),
        }
    }
}
