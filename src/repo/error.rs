//! Errors of the document repository

use std::fmt;
use std::io;
use std::path::PathBuf;

use thiserror::Error;
use uuid::Uuid;

use crate::error::ErrorKind;
use crate::types::Namespace;

/// Result type for DocumentRepo operations
pub type RepoResult<T> = Result<T, RepoError>;

/// Repository operation that failed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RepoOp {
    Find,
    FindAll,
    Save,
    Remove,
}

impl fmt::Display for RepoOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RepoOp::Find => write!(f, "find"),
            RepoOp::FindAll => write!(f, "find_all"),
            RepoOp::Save => write!(f, "save"),
            RepoOp::Remove => write!(f, "remove"),
        }
    }
}

#[derive(Debug, Error)]
pub enum RepoError {
    #[error("{op}: model not set (namespace '{namespace}')")]
    ModelNotSet { namespace: Namespace, op: RepoOp },

    #[error("save: could not save entity, missing entity id (namespace '{namespace}')")]
    MissingEntityId { namespace: Namespace },

    #[error("{op}: could not find entity {id} (namespace '{namespace}')")]
    EntityNotFound {
        namespace: Namespace,
        op: RepoOp,
        id: Uuid,
    },

    #[error("could not open repository folder {}: {source}", folder.display())]
    CouldNotOpen {
        folder: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("could not load collection (namespace '{namespace}'): {source}")]
    CouldNotLoad {
        namespace: Namespace,
        #[source]
        source: io::Error,
    },

    #[error("could not unmarshal collection (namespace '{namespace}'): {source}")]
    CouldNotUnmarshal {
        namespace: Namespace,
        #[source]
        source: serde_json::Error,
    },

    #[error("could not marshal collection (namespace '{namespace}'): {source}")]
    CouldNotMarshal {
        namespace: Namespace,
        #[source]
        source: serde_json::Error,
    },

    #[error("could not save collection (namespace '{namespace}'): {source}")]
    CouldNotSave {
        namespace: Namespace,
        #[source]
        source: io::Error,
    },
}

impl RepoError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            RepoError::ModelNotSet { .. } | RepoError::MissingEntityId { .. } => {
                ErrorKind::Configuration
            }
            RepoError::EntityNotFound { .. } => ErrorKind::NotFound,
            RepoError::CouldNotUnmarshal { .. } | RepoError::CouldNotMarshal { .. } => {
                ErrorKind::Serialization
            }
            RepoError::CouldNotOpen { .. }
            | RepoError::CouldNotLoad { .. }
            | RepoError::CouldNotSave { .. } => ErrorKind::Io,
        }
    }

    pub fn is_not_found(&self) -> bool {
        self.kind() == ErrorKind::NotFound
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_messages_name_namespace_and_op() {
        let err = RepoError::EntityNotFound {
            namespace: Namespace::new("shop/orders").unwrap(),
            op: RepoOp::Remove,
            id: Uuid::nil(),
        };
        let message = err.to_string();
        assert!(message.starts_with("remove:"));
        assert!(message.contains("shop/orders"));
        assert!(err.is_not_found());
    }

    #[test]
    fn test_kinds() {
        let ns = Namespace::default();
        assert_eq!(
            RepoError::ModelNotSet { namespace: ns.clone(), op: RepoOp::Find }.kind(),
            ErrorKind::Configuration
        );
        assert_eq!(
            RepoError::MissingEntityId { namespace: ns }.kind(),
            ErrorKind::Configuration
        );
    }
}
