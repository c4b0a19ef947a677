use async_trait::async_trait;
use s3::Bucket;
use s3::creds::Credentials;
use s3::region::Region;
use uuid::Uuid;

use super::error::StorageError;
use super::traits::{ObjectLocation, ObjectStore};

/// S3-backed object store.
///
/// One physical S3 bucket holds all logical buckets; the logical bucket name
/// becomes the leading key prefix, so reap and delete operations stay plain
/// key operations.
pub struct S3ObjectStore {
    bucket: Box<Bucket>,
    public_base_url: Option<String>,
}

impl S3ObjectStore {
    pub fn new(
        bucket_name: &str,
        region: Region,
        credentials: Credentials,
        public_base_url: Option<String>,
    ) -> Result<Self, StorageError> {
        let bucket = Bucket::new(bucket_name, region, credentials)
            .map_err(|e| StorageError::Backend(e.to_string()))?
            .with_path_style();
        Ok(Self {
            bucket,
            public_base_url,
        })
    }

    fn object_key(bucket: &str, key: &str) -> String {
        format!("{bucket}/{key}")
    }
}

#[async_trait]
impl ObjectStore for S3ObjectStore {
    async fn persist(&self, bucket: &str, bytes: &[u8]) -> Result<ObjectLocation, StorageError> {
        let key = Uuid::new_v4().simple().to_string();
        let response = self
            .bucket
            .put_object(Self::object_key(bucket, &key), bytes)
            .await
            .map_err(|e| StorageError::Backend(e.to_string()))?;

        if response.status_code() / 100 != 2 {
            return Err(StorageError::Backend(format!(
                "put_object returned status {}",
                response.status_code()
            )));
        }

        Ok(ObjectLocation::new(bucket, key))
    }

    async fn fetch(&self, bucket: &str, key: &str) -> Result<Vec<u8>, StorageError> {
        let response = self
            .bucket
            .get_object(Self::object_key(bucket, key))
            .await
            .map_err(|e| StorageError::Backend(e.to_string()))?;

        match response.status_code() {
            200 => Ok(response.to_vec()),
            404 => Err(StorageError::NotFound(format!("{bucket}/{key}"))),
            status => Err(StorageError::Backend(format!(
                "get_object returned status {status}"
            ))),
        }
    }

    async fn delete(&self, bucket: &str, key: &str) -> Result<(), StorageError> {
        // S3 DELETE returns 204 for absent keys as well, so this is
        // idempotent without extra handling.
        let response = self
            .bucket
            .delete_object(Self::object_key(bucket, key))
            .await
            .map_err(|e| StorageError::Backend(e.to_string()))?;

        match response.status_code() {
            204 | 200 | 404 => Ok(()),
            status => Err(StorageError::Backend(format!(
                "delete_object returned status {status}"
            ))),
        }
    }

    async fn exists(&self, bucket: &str, key: &str) -> Result<bool, StorageError> {
        let (_, status) = self
            .bucket
            .head_object(Self::object_key(bucket, key))
            .await
            .map_err(|e| StorageError::Backend(e.to_string()))?;
        Ok(status == 200)
    }

    fn object_url(&self, location: &ObjectLocation) -> String {
        match &self.public_base_url {
            Some(base) => format!(
                "{}/{}",
                base.trim_end_matches('/'),
                Self::object_key(&location.bucket, &location.key)
            ),
            None => format!(
                "s3://{}/{}",
                self.bucket.name(),
                Self::object_key(&location.bucket, &location.key)
            ),
        }
    }
}
