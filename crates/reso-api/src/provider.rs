//! Resource provider capability contract.
//!
//! Every backend (local disk, archive, memory, bundled blobs, temporary
//! directories) implements [`ResourceProvider`] for one scheme.
//! Operations a backend cannot perform fail with `Unsupported`; nothing
//! degrades silently.

use std::time::SystemTime;

use async_trait::async_trait;
use futures::stream::BoxStream;
use tokio::io::{AsyncRead, AsyncWrite};

use crate::error::{ResourceError, ResourceResult};
use crate::key::ResourceKey;
use crate::watch::WatchRegistration;

/// A readable stream over a resource's bytes.
///
/// Dropping the handle releases the underlying channel.
pub type ReadHandle = Box<dyn AsyncRead + Send + Unpin>;

/// A staged write.
///
/// Bytes written to the handle are not visible under the target key until
/// [`WriteHandle::commit`] succeeds. Dropping an uncommitted handle discards
/// everything written to it, which is what makes cross-provider copies
/// all-or-nothing.
#[async_trait]
pub trait WriteHandle: AsyncWrite + Send + Unpin {
    /// Publish the written bytes under the target key, replacing any
    /// previous content atomically.
    async fn commit(self: Box<Self>) -> ResourceResult<()>;
}

/// Boxed staged write.
pub type BoxWriteHandle = Box<dyn WriteHandle>;

/// Lazy sequence of child keys.
///
/// Nothing is read until the stream is first polled. Each call to
/// [`ResourceProvider::list`] starts a fresh listing.
pub type Listing = BoxStream<'static, ResourceResult<ResourceKey>>;

/// What a provider can do, for failing fast before an operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Capabilities {
    /// Writes, deletes and container creation are rejected.
    pub read_only: bool,
    /// [`ResourceProvider::watch`] is implemented.
    pub supports_watch: bool,
    /// [`ResourceProvider::rename`] is implemented and atomic.
    pub supports_rename: bool,
}

impl Capabilities {
    /// A writable provider without watch or rename.
    pub fn writable() -> Self {
        Self {
            read_only: false,
            supports_watch: false,
            supports_rename: false,
        }
    }

    /// A read-only provider.
    pub fn read_only() -> Self {
        Self {
            read_only: true,
            supports_watch: false,
            supports_rename: false,
        }
    }

    pub fn with_watch(mut self) -> Self {
        self.supports_watch = true;
        self
    }

    pub fn with_rename(mut self) -> Self {
        self.supports_rename = true;
        self
    }
}

/// Resource metadata.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Metadata {
    /// Whether the resource exists.
    pub exists: bool,
    /// Whether the resource can hold children.
    pub is_container: bool,
    /// Size in bytes, for non-containers when known.
    pub size: Option<u64>,
    /// Last modification time, when the backend tracks it.
    pub last_modified: Option<SystemTime>,
}

impl Metadata {
    /// Metadata of a resource that does not exist.
    pub fn missing() -> Self {
        Self {
            exists: false,
            is_container: false,
            size: None,
            last_modified: None,
        }
    }

    /// Metadata of an existing leaf resource.
    pub fn file(size: u64, last_modified: Option<SystemTime>) -> Self {
        Self {
            exists: true,
            is_container: false,
            size: Some(size),
            last_modified,
        }
    }

    /// Metadata of an existing container.
    pub fn container(last_modified: Option<SystemTime>) -> Self {
        Self {
            exists: true,
            is_container: true,
            size: None,
            last_modified,
        }
    }
}

/// Backend implementation of the resource contract for one scheme.
///
/// Keys handed to a provider always carry the provider's scheme; the
/// registry does not rewrite them. Providers ignore qualifiers unless they
/// document otherwise.
#[async_trait]
pub trait ResourceProvider: Send + Sync {
    /// Declared capabilities.
    fn capabilities(&self) -> Capabilities;

    /// Open a resource for reading.
    ///
    /// Fails with `NotFound`, `PermissionDenied` or `IsDirectory`.
    async fn open(&self, key: &ResourceKey) -> ResourceResult<ReadHandle>;

    /// Start a staged write to a resource.
    ///
    /// With `truncate` the committed content is exactly what gets written;
    /// without it the written bytes are appended to the existing content.
    /// Fails with `PermissionDenied`, `ParentMissing` or `IsDirectory`.
    async fn create(&self, key: &ResourceKey, truncate: bool) -> ResourceResult<BoxWriteHandle>;

    /// List the direct children of a container, ordered by name.
    async fn list(&self, key: &ResourceKey) -> ResourceResult<Listing>;

    /// Describe a resource. Missing resources report `exists = false`.
    async fn metadata(&self, key: &ResourceKey) -> ResourceResult<Metadata>;

    /// Delete a resource.
    ///
    /// Fails with `NotFound`, or `NotEmpty` when `recursive` is false and the
    /// target is a non-empty container.
    async fn delete(&self, key: &ResourceKey, recursive: bool) -> ResourceResult<()>;

    /// Create a container.
    ///
    /// Fails with `AlreadyExists`, or `ParentMissing` when `create_parents`
    /// is false and the parent is absent.
    async fn mk_container(&self, key: &ResourceKey, create_parents: bool) -> ResourceResult<()>;

    /// Watch a key and its descendants for changes.
    async fn watch(&self, key: &ResourceKey) -> ResourceResult<WatchRegistration> {
        Err(ResourceError::unsupported(format!("watch on {}", key.scheme())))
    }

    /// Atomically move a resource within this provider.
    async fn rename(&self, from: &ResourceKey, _to: &ResourceKey) -> ResourceResult<()> {
        Err(ResourceError::unsupported(format!("rename on {}", from.scheme())))
    }

    /// Returns true if the resource exists.
    async fn exists(&self, key: &ResourceKey) -> ResourceResult<bool> {
        Ok(self.metadata(key).await?.exists)
    }
}

/// Reject writes on read-only providers.
pub(crate) fn check_writable(caps: Capabilities, key: &ResourceKey) -> ResourceResult<()> {
    if caps.read_only {
        Err(ResourceError::PermissionDenied(format!(
            "{key}: provider is read-only"
        )))
    } else {
        Ok(())
    }
}
