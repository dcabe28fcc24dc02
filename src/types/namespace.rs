//! Namespace: the storage partition selected by the caller

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::error::ErrorKind;

/// Namespace used when the caller has no tenant / bounded context
pub const DEFAULT_NAMESPACE: &str = "default";

/// Errors raised while validating a namespace
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NamespaceError {
    #[error("namespace is empty")]
    Empty,
    #[error("namespace '{0}' must be relative")]
    Absolute(String),
    #[error("namespace '{namespace}' has an invalid segment '{segment}'")]
    InvalidSegment { namespace: String, segment: String },
}

impl NamespaceError {
    pub fn kind(&self) -> ErrorKind {
        ErrorKind::InvalidInput
    }
}

/// A `/`-separated relative path naming a tenant or bounded context
///
/// Each segment becomes one folder level below the store root, so a
/// namespace can never escape the root: empty, `.` and `..` segments are
/// rejected, as are backslashes.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Namespace(String);

impl Namespace {
    /// Validate and wrap a namespace string
    pub fn new(value: impl Into<String>) -> Result<Self, NamespaceError> {
        let value = value.into();
        if value.is_empty() {
            return Err(NamespaceError::Empty);
        }
        if value.starts_with('/') {
            return Err(NamespaceError::Absolute(value));
        }
        for segment in value.split('/') {
            let invalid = segment.is_empty()
                || segment == "."
                || segment == ".."
                || segment.contains('\\')
                || segment.contains('\0');
            if invalid {
                return Err(NamespaceError::InvalidSegment {
                    segment: segment.to_string(),
                    namespace: value,
                });
            }
        }
        Ok(Self(value))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Iterate over the path segments
    pub fn segments(&self) -> impl Iterator<Item = &str> {
        self.0.split('/')
    }

    /// Folder of this namespace below `root`
    pub fn folder_in(&self, root: &Path) -> PathBuf {
        self.segments().fold(root.to_path_buf(), |path, s| path.join(s))
    }
}

impl Default for Namespace {
    fn default() -> Self {
        Self(DEFAULT_NAMESPACE.to_string())
    }
}

impl fmt::Display for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for Namespace {
    type Err = NamespaceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<String> for Namespace {
    type Error = NamespaceError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl TryFrom<&str> for Namespace {
    type Error = NamespaceError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Namespace> for String {
    fn from(ns: Namespace) -> Self {
        ns.0
    }
}

impl AsRef<str> for Namespace {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_namespaces() {
        assert_eq!(Namespace::new("shop").unwrap().as_str(), "shop");
        let nested = Namespace::new("app/orders").unwrap();
        assert_eq!(nested.segments().collect::<Vec<_>>(), vec!["app", "orders"]);
        assert_eq!(Namespace::default().as_str(), DEFAULT_NAMESPACE);
    }

    #[test]
    fn test_rejects_escaping_namespaces() {
        assert_eq!(Namespace::new(""), Err(NamespaceError::Empty));
        assert!(matches!(Namespace::new("/etc"), Err(NamespaceError::Absolute(_))));
        assert!(matches!(
            Namespace::new("app/../etc"),
            Err(NamespaceError::InvalidSegment { .. })
        ));
        assert!(Namespace::new("app//orders").is_err());
        assert!(Namespace::new("app/").is_err());
        assert!(Namespace::new("a\\b").is_err());
    }

    #[test]
    fn test_folder_in() {
        let ns = Namespace::new("app/orders").unwrap();
        assert_eq!(
            ns.folder_in(Path::new("/data")),
            PathBuf::from("/data").join("app").join("orders")
        );
    }

    #[test]
    fn test_serde_validates() {
        let ns: Namespace = serde_json::from_str("\"tenant/a\"").unwrap();
        assert_eq!(ns.as_str(), "tenant/a");
        assert!(serde_json::from_str::<Namespace>("\"../x\"").is_err());
    }
}
