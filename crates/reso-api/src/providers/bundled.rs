//! Read-only blobs compiled into the binary.
//!
//! Typically filled with `include_bytes!` at startup:
//!
//! ```
//! use reso_api::BundledProvider;
//!
//! let provider = BundledProvider::new()
//!     .with_entry("/templates/index.html", b"<html></html>")
//!     .unwrap();
//! assert_eq!(provider.len(), 1);
//! ```

use std::collections::BTreeMap;
use std::io::Cursor;

use async_trait::async_trait;

use crate::error::{ResourceError, ResourceResult};
use crate::key::{KeyPath, ResourceKey};
use crate::provider::{
    BoxWriteHandle, Capabilities, Listing, Metadata, ReadHandle, ResourceProvider, check_writable,
};

use super::sorted_listing;

/// Provider over a fixed set of static byte blobs.
///
/// Containers are implied: `/a/b` exists as a container as soon as some
/// entry lies below it.
#[derive(Debug, Clone, Default)]
pub struct BundledProvider {
    entries: BTreeMap<KeyPath, &'static [u8]>,
}

impl BundledProvider {
    /// Create an empty bundle.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a blob at `path`.
    ///
    /// Fails with `AlreadyExists` if the path is taken or is an implied
    /// container, and with `NotDirectory` if an ancestor is already a blob.
    pub fn insert(&mut self, path: &str, data: &'static [u8]) -> ResourceResult<()> {
        let path = KeyPath::parse(path)?;
        if path.is_root() || self.entries.contains_key(&path) || self.is_container(&path) {
            return Err(ResourceError::already_exists(path));
        }
        let mut ancestor = path.parent();
        while let Some(p) = ancestor {
            if self.entries.contains_key(&p) {
                return Err(ResourceError::not_directory(p));
            }
            ancestor = p.parent();
        }
        self.entries.insert(path, data);
        Ok(())
    }

    /// Builder form of [`BundledProvider::insert`].
    pub fn with_entry(mut self, path: &str, data: &'static [u8]) -> ResourceResult<Self> {
        self.insert(path, data)?;
        Ok(self)
    }

    /// Number of blobs.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn is_container(&self, path: &KeyPath) -> bool {
        path.is_root()
            || self
                .entries
                .range(path.clone()..)
                .next()
                .is_some_and(|(p, _)| p.starts_with(path) && p != path)
    }
}

#[async_trait]
impl ResourceProvider for BundledProvider {
    fn capabilities(&self) -> Capabilities {
        Capabilities::read_only()
    }

    async fn open(&self, key: &ResourceKey) -> ResourceResult<ReadHandle> {
        match self.entries.get(key.path()) {
            Some(data) => Ok(Box::new(Cursor::new(*data))),
            None if self.is_container(key.path()) => Err(ResourceError::is_directory(key)),
            None => Err(ResourceError::not_found(key)),
        }
    }

    async fn create(&self, key: &ResourceKey, _truncate: bool) -> ResourceResult<BoxWriteHandle> {
        check_writable(self.capabilities(), key)?;
        Err(ResourceError::unsupported("bundle writes"))
    }

    async fn list(&self, key: &ResourceKey) -> ResourceResult<Listing> {
        let path = key.path();
        if self.entries.contains_key(path) {
            return Err(ResourceError::not_directory(key));
        }
        if !self.is_container(path) {
            return Err(ResourceError::not_found(key));
        }
        let depth = path.len();
        let names = self
            .entries
            .range(path.clone()..)
            .map(|(p, _)| p)
            .take_while(|p| p.starts_with(path))
            .filter_map(|p| p.segments().get(depth).cloned())
            .collect();
        Ok(sorted_listing(key, names))
    }

    async fn metadata(&self, key: &ResourceKey) -> ResourceResult<Metadata> {
        Ok(match self.entries.get(key.path()) {
            Some(data) => Metadata::file(data.len() as u64, None),
            None if self.is_container(key.path()) => Metadata::container(None),
            None => Metadata::missing(),
        })
    }

    async fn delete(&self, key: &ResourceKey, _recursive: bool) -> ResourceResult<()> {
        check_writable(self.capabilities(), key)?;
        Err(ResourceError::unsupported("bundle deletes"))
    }

    async fn mk_container(&self, key: &ResourceKey, _create_parents: bool) -> ResourceResult<()> {
        check_writable(self.capabilities(), key)?;
        Err(ResourceError::unsupported("bundle containers"))
    }
}
