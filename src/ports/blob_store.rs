use std::path::Path;

/// External object storage used for product images
#[mockall::automock]
#[async_trait::async_trait]
pub trait BlobStorePort: Send + Sync {
    /// Upload the content of a locally staged file under `bucket`/`key`
    async fn upload(&self, bucket: &str, key: &str, source: &Path) -> Result<(), Error>;

    /// Remove an object
    ///
    /// Removing an object that does not exist is not an error.
    async fn delete(&self, bucket: &str, key: &str) -> Result<(), Error>;

    /// Public URL of an object
    fn url_for(&self, bucket: &str, key: &str) -> String;
}

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Concrete adapter errors
    ///
    /// This could represent any errors from a concrete adapter that is not part of the domain
    /// model, such as connectivity, configuration, or permission errors.
    #[error("adapter error: {0:?}")]
    Adapter(Box<dyn std::error::Error + Send + Sync>),
}
