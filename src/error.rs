//! Misconfiguration errors.
//!
//! Every fallible operation in this crate returns [`anyhow::Result`]. Failures that
//! come from the storage layer or a table/model library (missing file, permission
//! denied, a corrupt Parquet footer) pass through untouched apart from `context`
//! annotations, so the original error stays reachable through
//! [`anyhow::Error::root_cause`].
//!
//! Mistakes in how an adapter was *configured* are different: they are detected
//! before any I/O and are never worth retrying. Those are raised as an
//! [`AdapterError`] inside the `anyhow::Error`, and callers can tell them apart with
//! [`is_misconfiguration`] or by downcasting:
//!
//! ```
//! use ironadapt::{AdapterRegistry, ErrorKind, AdapterError};
//! use ironadapt::type_token::TypeTag;
//!
//! let registry = AdapterRegistry::new();
//! let err = registry.resolve_loader("csv", TypeTag::of::<String>()).unwrap_err();
//! let kind = err.downcast_ref::<AdapterError>().map(|e| e.kind);
//! assert_eq!(kind, Some(ErrorKind::NotFound));
//! ```

use std::error::Error;
use std::fmt;

/// Category of an [`AdapterError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// No adapter (or value type) is registered under the requested key.
    NotFound,
    /// A different adapter already occupies the registry key.
    Duplicate,
    /// A parameter is unknown, has the wrong shape, or is out of range.
    InvalidParameter,
    /// The supplied fields select zero or several resolution modes.
    Ambiguous,
    /// An explicit identifier contradicts the collaborator's current state.
    Conflict,
    /// A collaborator the adapter needs (tracking client, object store) is absent.
    MissingCollaborator,
    /// A value handed to an erased adapter is not of the adapter's value type.
    TypeMismatch,
}

/// A configuration error raised before any I/O is attempted.
#[derive(Debug, Clone)]
pub struct AdapterError {
    pub kind: ErrorKind,
    pub message: String,
}

impl AdapterError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::NotFound, message)
    }

    pub fn invalid(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::InvalidParameter, message)
    }

    pub fn ambiguous(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Ambiguous, message)
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Conflict, message)
    }

    pub fn missing(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::MissingCollaborator, message)
    }

    /// All adapter errors are configuration problems; none of them is retryable.
    #[must_use]
    pub fn is_misconfiguration(&self) -> bool {
        true
    }
}

impl fmt::Display for AdapterError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}: {}", self.kind, self.message)
    }
}

impl Error for AdapterError {}

/// Whether `err` (or anything in its chain) is an [`AdapterError`].
#[must_use]
pub fn is_misconfiguration(err: &anyhow::Error) -> bool {
    err.chain()
        .any(|cause| cause.downcast_ref::<AdapterError>().is_some())
}

/// The [`ErrorKind`] of the first [`AdapterError`] in `err`'s chain, if any.
#[must_use]
pub fn error_kind(err: &anyhow::Error) -> Option<ErrorKind> {
    err.chain()
        .find_map(|cause| cause.downcast_ref::<AdapterError>())
        .map(|e| e.kind)
}
