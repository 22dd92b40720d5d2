use crate::ports::blob_store::{BlobStorePort, Error};
use std::path::{Component, Path, PathBuf};

/// Blob store writing objects below a local directory
///
/// Objects land in `{root}/{bucket}/{key}` and are served from `{base_url}/{bucket}/{key}`.
#[derive(Clone, Debug)]
pub struct LocalBlobStore {
    root: PathBuf,
    base_url: String,
}

impl LocalBlobStore {
    pub fn new(root: impl Into<PathBuf>, base_url: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            base_url: base_url.into(),
        }
    }

    fn object_path(&self, bucket: &str, key: &str) -> Result<PathBuf, Error> {
        let relative = Path::new(bucket).join(key);
        // Keys must stay below the root
        if relative
            .components()
            .any(|component| !matches!(component, Component::Normal(_)))
        {
            return Err(Error::Adapter(
                format!("invalid object key: {bucket}/{key}").into(),
            ));
        }

        Ok(self.root.join(relative))
    }
}

#[async_trait::async_trait]
impl BlobStorePort for LocalBlobStore {
    async fn upload(&self, bucket: &str, key: &str, source: &Path) -> Result<(), Error> {
        let target = self.object_path(bucket, key)?;
        if let Some(parent) = target.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let bytes = tokio::fs::copy(source, &target).await?;
        tracing::debug!(path = %target.display(), bytes, "stored object");

        Ok(())
    }

    async fn delete(&self, bucket: &str, key: &str) -> Result<(), Error> {
        let target = self.object_path(bucket, key)?;
        match tokio::fs::remove_file(&target).await {
            Ok(()) => {
                tracing::debug!(path = %target.display(), "removed object");
                Ok(())
            }
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err.into()),
        }
    }

    fn url_for(&self, bucket: &str, key: &str) -> String {
        format!("{}/{bucket}/{key}", self.base_url.trim_end_matches('/'))
    }
}
