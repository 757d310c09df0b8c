//! Resource error types.

use std::io;
use thiserror::Error;

use crate::key::ResourceKey;

/// Resource error type.
///
/// Key-parsing and dispatch failures come from the key model and the
/// registry. Everything else is reported by the provider that handled the
/// operation.
#[derive(Debug, Error)]
pub enum ResourceError {
    /// Key text could not be parsed.
    #[error("malformed key '{key}': {reason}")]
    MalformedKey { key: String, reason: String },

    /// A `..` segment ascended above the root.
    #[error("path escapes root: {0}")]
    EscapesRoot(String),

    /// No provider is registered for the scheme.
    #[error("unknown scheme: {0}")]
    UnknownScheme(String),

    /// A provider is already registered for the scheme.
    #[error("scheme already registered: {0}")]
    DuplicateScheme(String),

    /// Resource not found.
    #[error("not found: {0}")]
    NotFound(String),

    /// Permission denied (includes writes to read-only providers).
    #[error("permission denied: {0}")]
    PermissionDenied(String),

    /// Expected a non-container resource.
    #[error("is a directory: {0}")]
    IsDirectory(String),

    /// Expected a container.
    #[error("not a directory: {0}")]
    NotDirectory(String),

    /// Resource already exists.
    #[error("already exists: {0}")]
    AlreadyExists(String),

    /// The parent container does not exist.
    #[error("parent missing: {0}")]
    ParentMissing(String),

    /// Container is not empty.
    #[error("not empty: {0}")]
    NotEmpty(String),

    /// The provider does not support the operation.
    #[error("unsupported: {0}")]
    Unsupported(String),

    /// Backend transport failure.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// A step of a composite operation failed.
    #[error("{operation} failed at {key}: {source}")]
    Composite {
        operation: &'static str,
        key: ResourceKey,
        #[source]
        source: Box<ResourceError>,
    },

    /// Failures collected by an operation run with [`ErrorMode::CollectAll`].
    #[error("{} operations failed", .0.len())]
    Multiple(Vec<ResourceError>),
}

/// How composite operations react to a failing step.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ErrorMode {
    /// Stop at the first failure and report it.
    #[default]
    FailFast,
    /// Keep going and report every failure at the end.
    CollectAll,
}

impl ResourceError {
    /// Create a MalformedKey error.
    pub fn malformed(key: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::MalformedKey {
            key: key.into(),
            reason: reason.into(),
        }
    }

    /// Create an EscapesRoot error.
    pub fn escapes_root(path: impl Into<String>) -> Self {
        Self::EscapesRoot(path.into())
    }

    /// Create a NotFound error.
    pub fn not_found(key: impl ToString) -> Self {
        Self::NotFound(key.to_string())
    }

    /// Create a PermissionDenied error.
    pub fn permission_denied(key: impl ToString) -> Self {
        Self::PermissionDenied(key.to_string())
    }

    /// Create an IsDirectory error.
    pub fn is_directory(key: impl ToString) -> Self {
        Self::IsDirectory(key.to_string())
    }

    /// Create a NotDirectory error.
    pub fn not_directory(key: impl ToString) -> Self {
        Self::NotDirectory(key.to_string())
    }

    /// Create an AlreadyExists error.
    pub fn already_exists(key: impl ToString) -> Self {
        Self::AlreadyExists(key.to_string())
    }

    /// Create a ParentMissing error.
    pub fn parent_missing(key: impl ToString) -> Self {
        Self::ParentMissing(key.to_string())
    }

    /// Create a NotEmpty error.
    pub fn not_empty(key: impl ToString) -> Self {
        Self::NotEmpty(key.to_string())
    }

    /// Create an Unsupported error.
    pub fn unsupported(what: impl Into<String>) -> Self {
        Self::Unsupported(what.into())
    }

    /// Create an Io error from any displayable backend failure.
    pub fn io(msg: impl Into<String>) -> Self {
        Self::Io(io::Error::other(msg.into()))
    }

    /// Wrap this error as the failing step of a composite operation.
    pub fn during(self, operation: &'static str, key: &ResourceKey) -> Self {
        Self::Composite {
            operation,
            key: key.clone(),
            source: Box::new(self),
        }
    }

    /// Map an I/O error onto the taxonomy, naming the key it happened on.
    ///
    /// Kinds without a taxonomy counterpart are kept as [`ResourceError::Io`].
    pub fn from_io(err: io::Error, key: &ResourceKey) -> Self {
        match err.kind() {
            io::ErrorKind::NotFound => Self::not_found(key),
            io::ErrorKind::PermissionDenied => Self::permission_denied(key),
            io::ErrorKind::AlreadyExists => Self::already_exists(key),
            io::ErrorKind::IsADirectory => Self::is_directory(key),
            io::ErrorKind::NotADirectory => Self::not_directory(key),
            io::ErrorKind::DirectoryNotEmpty => Self::not_empty(key),
            _ => Self::Io(err),
        }
    }

    /// Returns true if this is (or wraps) a NotFound error.
    pub fn is_not_found(&self) -> bool {
        match self {
            Self::NotFound(_) => true,
            Self::Composite { source, .. } => source.is_not_found(),
            _ => false,
        }
    }

    /// The innermost error of a composite chain.
    pub fn root_cause(&self) -> &ResourceError {
        match self {
            Self::Composite { source, .. } => source.root_cause(),
            other => other,
        }
    }
}

/// Convert ResourceError to std::io::Error for compatibility.
impl From<ResourceError> for io::Error {
    fn from(e: ResourceError) -> Self {
        match e {
            ResourceError::NotFound(msg) => io::Error::new(io::ErrorKind::NotFound, msg),
            ResourceError::UnknownScheme(msg) => io::Error::new(io::ErrorKind::NotFound, msg),
            ResourceError::AlreadyExists(msg) => io::Error::new(io::ErrorKind::AlreadyExists, msg),
            ResourceError::DuplicateScheme(msg) => {
                io::Error::new(io::ErrorKind::AlreadyExists, msg)
            }
            ResourceError::PermissionDenied(msg) => {
                io::Error::new(io::ErrorKind::PermissionDenied, msg)
            }
            ResourceError::EscapesRoot(msg) => io::Error::new(io::ErrorKind::PermissionDenied, msg),
            ResourceError::IsDirectory(msg) => io::Error::new(io::ErrorKind::IsADirectory, msg),
            ResourceError::NotDirectory(msg) => io::Error::new(io::ErrorKind::NotADirectory, msg),
            ResourceError::NotEmpty(msg) => io::Error::new(io::ErrorKind::DirectoryNotEmpty, msg),
            ResourceError::ParentMissing(msg) => io::Error::new(io::ErrorKind::NotFound, msg),
            ResourceError::Unsupported(msg) => io::Error::new(io::ErrorKind::Unsupported, msg),
            e @ ResourceError::MalformedKey { .. } => {
                io::Error::new(io::ErrorKind::InvalidInput, e.to_string())
            }
            ResourceError::Io(e) => e,
            other => io::Error::other(other.to_string()),
        }
    }
}

/// Resource result type.
pub type ResourceResult<T> = Result<T, ResourceError>;
