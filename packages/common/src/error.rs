use thiserror::Error;

use crate::storage::StorageError;

/// Error taxonomy for asset and variant operations.
///
/// The variant determines how callers react: `Validation` and `NotFound` are
/// surfaced to the client and never retried, `Conflict` is a benign race in
/// the generation path, and `Transient` is infrastructure trouble that a
/// later sweep or retry may resolve.
#[derive(Debug, Error)]
pub enum AssetError {
    /// Malformed request parameters (bad path characters, missing dimension,
    /// out-of-range blur/quality/pad, malformed background hex).
    #[error("validation error: {0}")]
    Validation(String),

    /// Asset, variant, or path does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// Transformation-key uniqueness violation.
    #[error("conflict: {0}")]
    Conflict(String),

    /// Database or object-store I/O failure.
    #[error("transient infrastructure error: {0}")]
    Transient(String),
}

impl AssetError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }

    pub fn transient(msg: impl Into<String>) -> Self {
        Self::Transient(msg.into())
    }

    /// True for failures a later retry may resolve.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Transient(_))
    }
}

impl From<StorageError> for AssetError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::NotFound(key) => Self::NotFound(format!("object not found: {key}")),
            other => Self::Transient(other.to_string()),
        }
    }
}
