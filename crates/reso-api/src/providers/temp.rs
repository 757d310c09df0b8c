//! Provider over a private temporary directory.

use std::path::Path;

use async_trait::async_trait;
use tempfile::TempDir;

use crate::error::ResourceResult;
use crate::key::ResourceKey;
use crate::provider::{BoxWriteHandle, Capabilities, Listing, Metadata, ReadHandle, ResourceProvider};
use crate::watch::WatchRegistration;

use super::LocalProvider;

/// A [`LocalProvider`] over a fresh temporary directory.
///
/// The directory and everything in it is removed when the provider drops.
#[derive(Debug)]
pub struct TempProvider {
    local: LocalProvider,
    // Declared last so the directory outlives the provider using it.
    dir: TempDir,
}

impl TempProvider {
    /// Create a provider over a new temporary directory.
    pub fn new() -> ResourceResult<Self> {
        let dir = tempfile::Builder::new().prefix("reso-").tempdir()?;
        let local = LocalProvider::new(dir.path())?;
        tracing::debug!(path = %dir.path().display(), "temp provider created");
        Ok(Self { local, dir })
    }

    /// Path of the backing directory.
    pub fn path(&self) -> &Path {
        self.dir.path()
    }
}

#[async_trait]
impl ResourceProvider for TempProvider {
    fn capabilities(&self) -> Capabilities {
        self.local.capabilities()
    }

    async fn open(&self, key: &ResourceKey) -> ResourceResult<ReadHandle> {
        self.local.open(key).await
    }

    async fn create(&self, key: &ResourceKey, truncate: bool) -> ResourceResult<BoxWriteHandle> {
        self.local.create(key, truncate).await
    }

    async fn list(&self, key: &ResourceKey) -> ResourceResult<Listing> {
        self.local.list(key).await
    }

    async fn metadata(&self, key: &ResourceKey) -> ResourceResult<Metadata> {
        self.local.metadata(key).await
    }

    async fn delete(&self, key: &ResourceKey, recursive: bool) -> ResourceResult<()> {
        self.local.delete(key, recursive).await
    }

    async fn mk_container(&self, key: &ResourceKey, create_parents: bool) -> ResourceResult<()> {
        self.local.mk_container(key, create_parents).await
    }

    async fn watch(&self, key: &ResourceKey) -> ResourceResult<WatchRegistration> {
        self.local.watch(key).await
    }

    async fn rename(&self, from: &ResourceKey, to: &ResourceKey) -> ResourceResult<()> {
        self.local.rename(from, to).await
    }
}

impl From<TempProvider> for LocalProvider {
    /// Keep the files: the directory is persisted and handed to a plain
    /// local provider.
    fn from(temp: TempProvider) -> Self {
        let TempProvider { local, dir } = temp;
        let _ = dir.keep();
        local
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncWriteExt;

    #[tokio::test]
    async fn test_removed_on_drop() {
        let provider = TempProvider::new().unwrap();
        let path = provider.path().to_path_buf();
        let key = ResourceKey::parse("tmp:/scratch.bin").unwrap();

        let mut handle = provider.create(&key, true).await.unwrap();
        handle.write_all(&[1, 2, 3]).await.unwrap();
        handle.commit().await.unwrap();
        assert!(path.join("scratch.bin").exists());

        drop(provider);
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn test_keep_into_local() {
        let provider = TempProvider::new().unwrap();
        let path = provider.path().to_path_buf();
        let local: LocalProvider = provider.into();
        assert!(path.exists());
        assert!(local.metadata(&ResourceKey::parse("file:/").unwrap()).await.unwrap().exists);
        std::fs::remove_dir_all(path).unwrap();
    }

    #[test]
    fn test_capabilities_match_local() {
        let provider = TempProvider::new().unwrap();
        let caps = provider.capabilities();
        assert!(!caps.read_only);
        assert!(caps.supports_watch && caps.supports_rename);
    }
}
