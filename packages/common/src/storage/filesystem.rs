use std::path::PathBuf;

use async_trait::async_trait;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use uuid::Uuid;

use super::error::StorageError;
use super::traits::{ObjectLocation, ObjectStore};

/// Filesystem-backed object store.
///
/// Objects are stored in a sharded directory layout:
/// `{base_path}/{bucket}/{first 2 key chars}/{remaining key chars}`.
/// Writes go through a temp file and an atomic rename so a crashed write
/// never leaves a partial object at its final path.
pub struct FilesystemObjectStore {
    base_path: PathBuf,
    max_size: u64,
}

impl FilesystemObjectStore {
    pub async fn new(base_path: PathBuf, max_size: u64) -> Result<Self, StorageError> {
        fs::create_dir_all(&base_path).await?;
        fs::create_dir_all(base_path.join(".tmp")).await?;
        Ok(Self {
            base_path,
            max_size,
        })
    }

    fn object_path(&self, bucket: &str, key: &str) -> Result<PathBuf, StorageError> {
        if key.len() < 3 || key.contains(['/', '\\', '.']) {
            return Err(StorageError::InvalidKey(key.to_string()));
        }
        Ok(self
            .base_path
            .join(bucket)
            .join(&key[..2])
            .join(&key[2..]))
    }

    fn temp_path(&self) -> PathBuf {
        self.base_path.join(".tmp").join(Uuid::new_v4().to_string())
    }
}

#[async_trait]
impl ObjectStore for FilesystemObjectStore {
    async fn persist(&self, bucket: &str, bytes: &[u8]) -> Result<ObjectLocation, StorageError> {
        if bytes.len() as u64 > self.max_size {
            return Err(StorageError::SizeLimitExceeded {
                actual: bytes.len() as u64,
                limit: self.max_size,
            });
        }

        let key = Uuid::new_v4().simple().to_string();
        let object_path = self.object_path(bucket, &key)?;

        let temp_path = self.temp_path();
        let mut temp_file = fs::File::create(&temp_path).await?;
        if let Err(e) = temp_file.write_all(bytes).await {
            let _ = fs::remove_file(&temp_path).await;
            return Err(e.into());
        }
        if let Err(e) = temp_file.sync_all().await {
            let _ = fs::remove_file(&temp_path).await;
            return Err(e.into());
        }
        drop(temp_file);

        if let Some(parent) = object_path.parent() {
            fs::create_dir_all(parent).await?;
        }

        if let Err(e) = fs::rename(&temp_path, &object_path).await {
            let _ = fs::remove_file(&temp_path).await;
            return Err(e.into());
        }

        Ok(ObjectLocation::new(bucket, key))
    }

    async fn fetch(&self, bucket: &str, key: &str) -> Result<Vec<u8>, StorageError> {
        let object_path = self.object_path(bucket, key)?;
        match fs::read(&object_path).await {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(StorageError::NotFound(format!("{bucket}/{key}")))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn delete(&self, bucket: &str, key: &str) -> Result<(), StorageError> {
        let object_path = self.object_path(bucket, key)?;
        match fs::remove_file(&object_path).await {
            Ok(()) => Ok(()),
            // Idempotent: an already-absent object is a success.
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    async fn exists(&self, bucket: &str, key: &str) -> Result<bool, StorageError> {
        let object_path = self.object_path(bucket, key)?;
        match fs::metadata(&object_path).await {
            Ok(_) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    fn object_url(&self, location: &ObjectLocation) -> String {
        let path = self
            .base_path
            .join(&location.bucket)
            .join(&location.key[..2])
            .join(&location.key[2..]);
        format!("file://{}", path.display())
    }
}
