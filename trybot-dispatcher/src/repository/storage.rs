//! Durable object storage repository

use async_trait::async_trait;
use trybot_client::{ClientError, StorageClient};

/// Repository trait for writing log objects
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Creates or overwrites `bucket/object` with `content`
    async fn put_object(&self, bucket: &str, object: &str, content: Vec<u8>)
    -> Result<(), ClientError>;

    /// URL under which a human can read the object
    fn public_url(&self, bucket: &str, object: &str) -> String {
        StorageClient::public_url(bucket, object)
    }
}

/// Google Cloud Storage implementation of ObjectStore
pub struct GcsObjectStore {
    client: StorageClient,
}

impl GcsObjectStore {
    pub fn new(client: StorageClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ObjectStore for GcsObjectStore {
    async fn put_object(
        &self,
        bucket: &str,
        object: &str,
        content: Vec<u8>,
    ) -> Result<(), ClientError> {
        self.client.put_object(bucket, object, content).await
    }
}
