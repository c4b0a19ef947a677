use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::error::StorageError;

/// Coordinates of one stored object.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ObjectLocation {
    pub bucket: String,
    pub key: String,
}

impl ObjectLocation {
    pub fn new(bucket: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            key: key.into(),
        }
    }
}

impl std::fmt::Display for ObjectLocation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.bucket, self.key)
    }
}

/// Durable byte storage for variant payloads.
///
/// The store chooses the key on `persist`; callers record the returned
/// location in the database. `delete` is idempotent: removing an
/// already-absent object succeeds, which the reaper's at-least-once retry
/// semantics rely on.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Write bytes under a fresh key in `bucket`.
    async fn persist(&self, bucket: &str, bytes: &[u8]) -> Result<ObjectLocation, StorageError>;

    /// Read all bytes of an object.
    async fn fetch(&self, bucket: &str, key: &str) -> Result<Vec<u8>, StorageError>;

    /// Remove an object. Succeeds when the object is already gone.
    async fn delete(&self, bucket: &str, key: &str) -> Result<(), StorageError>;

    /// Check whether an object exists.
    async fn exists(&self, bucket: &str, key: &str) -> Result<bool, StorageError>;

    /// Public URL for serving a stored object.
    fn object_url(&self, location: &ObjectLocation) -> String;
}
