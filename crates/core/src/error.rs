//! Error types for storage operations.

use std::fmt;

use serde::{Serialize, Serializer};

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Errors that stop an operation and surface to the caller.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// A listing page could not be fetched.
    #[error("listing failed for container {container}: {reason}")]
    ListingFailed { container: String, reason: String },

    /// The key filter pattern is not a valid regular expression.
    #[error("invalid pattern {pattern:?}: {source}")]
    InvalidPattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },

    /// Batch size outside `1..=1000`.
    #[error("invalid batch size {0} (must be between 1 and 1000)")]
    InvalidBatchSize(usize),

    /// More keys than a single delete request accepts.
    #[error("too many keys for one delete request: {0} (limit is 1000)")]
    BatchTooLarge(usize),

    /// Key cannot be mapped onto the backend.
    #[error("invalid object key: {0:?}")]
    InvalidKey(String),

    /// The request did not reach the backend or was rejected by it.
    #[error("transport error: {0}")]
    Transport(String),

    /// Object or container does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// Upload was rejected.
    #[error("upload failed for {key}: {reason}")]
    Upload { key: String, reason: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl StorageError {
    pub fn listing_failed(container: impl fmt::Display, reason: impl fmt::Display) -> Self {
        Self::ListingFailed {
            container: container.to_string(),
            reason: reason.to_string(),
        }
    }

    pub fn upload(key: impl fmt::Display, reason: impl fmt::Display) -> Self {
        Self::Upload {
            key: key.to_string(),
            reason: reason.to_string(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}

/// Why a single key could not be deleted.
///
/// Per-key failures never abort a bulk operation; they are recorded in the
/// returned report instead.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureReason {
    /// The backend reported the object as missing.
    NotFound,
    /// Any other backend-reported failure, with the backend's message.
    Backend(String),
}

impl FailureReason {
    pub fn backend(reason: impl fmt::Display) -> Self {
        Self::Backend(reason.to_string())
    }
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureReason::NotFound => write!(f, "not found"),
            FailureReason::Backend(reason) => write!(f, "{reason}"),
        }
    }
}

impl Serialize for FailureReason {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}
