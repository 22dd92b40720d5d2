use crate::ports::blob_store::{BlobStorePort, Error};
use std::{
    collections::HashMap,
    path::Path,
    sync::{Arc, Mutex, PoisonError},
};

/// Blob store keeping objects in memory
#[derive(Clone, Debug)]
pub struct MemoryBlobStore {
    base_url: String,
    objects: Arc<Mutex<HashMap<(String, String), Vec<u8>>>>,
}

impl MemoryBlobStore {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            objects: Arc::default(),
        }
    }

    /// Content of a stored object
    pub fn get(&self, bucket: &str, key: &str) -> Result<Option<Vec<u8>>, Error> {
        let object = self
            .objects
            .lock()?
            .get(&(bucket.to_string(), key.to_string()))
            .cloned();

        Ok(object)
    }
}

impl Default for MemoryBlobStore {
    fn default() -> Self {
        Self::new("memory://blobs")
    }
}

#[async_trait::async_trait]
impl BlobStorePort for MemoryBlobStore {
    async fn upload(&self, bucket: &str, key: &str, source: &Path) -> Result<(), Error> {
        let content = tokio::fs::read(source).await?;
        self.objects
            .lock()?
            .insert((bucket.to_string(), key.to_string()), content);

        Ok(())
    }

    async fn delete(&self, bucket: &str, key: &str) -> Result<(), Error> {
        self.objects
            .lock()?
            .remove(&(bucket.to_string(), key.to_string()));

        Ok(())
    }

    fn url_for(&self, bucket: &str, key: &str) -> String {
        format!("{}/{bucket}/{key}", self.base_url.trim_end_matches('/'))
    }
}

#[derive(Debug, thiserror::Error)]
#[error("poison error: {0}")]
pub struct ErasedPoisonError(String);

impl<T> From<PoisonError<T>> for Error {
    fn from(err: PoisonError<T>) -> Self {
        Self::Adapter(Box::new(ErasedPoisonError(err.to_string())))
    }
}
