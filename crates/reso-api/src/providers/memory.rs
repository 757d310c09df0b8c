//! In-memory provider.
//!
//! Useful for scratch buffers, tests, and composing virtual trees. Content
//! lives in a sorted map keyed by path, so listings come out ordered and
//! subtree operations are range scans.

use std::collections::BTreeMap;
use std::io::Cursor;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::SystemTime;

use async_trait::async_trait;
use parking_lot::RwLock;
use tokio::io::AsyncWrite;

use crate::error::{ResourceError, ResourceResult};
use crate::key::{KeyPath, ResourceKey};
use crate::provider::{
    BoxWriteHandle, Capabilities, Listing, Metadata, ReadHandle, ResourceProvider, WriteHandle,
};
use crate::watch::{ChangeKind, ResourceChange, WatchHub, WatchRegistration};

use super::lazy_listing;

#[derive(Debug, Clone)]
enum Entry {
    File {
        data: Arc<[u8]>,
        modified: SystemTime,
    },
    Container {
        modified: SystemTime,
    },
}

impl Entry {
    fn metadata(&self) -> Metadata {
        match self {
            Entry::File { data, modified } => Metadata::file(data.len() as u64, Some(*modified)),
            Entry::Container { modified } => Metadata::container(Some(*modified)),
        }
    }
}

#[derive(Debug, Default)]
struct Inner {
    entries: RwLock<BTreeMap<KeyPath, Entry>>,
    hub: WatchHub,
}

impl Inner {
    /// Kind of the entry at `path`; the root is always a container.
    fn is_container(entries: &BTreeMap<KeyPath, Entry>, path: &KeyPath) -> Option<bool> {
        if path.is_root() {
            return Some(true);
        }
        entries
            .get(path)
            .map(|e| matches!(e, Entry::Container { .. }))
    }

    fn check_parent(
        entries: &BTreeMap<KeyPath, Entry>,
        key: &ResourceKey,
    ) -> ResourceResult<()> {
        let parent = key.path().parent().unwrap_or_default();
        match Self::is_container(entries, &parent) {
            Some(true) => Ok(()),
            Some(false) => Err(ResourceError::not_directory(key.with_path(parent))),
            None => Err(ResourceError::parent_missing(key)),
        }
    }

    /// Paths at and below `path`, in order.
    fn subtree(entries: &BTreeMap<KeyPath, Entry>, path: &KeyPath) -> Vec<KeyPath> {
        entries
            .range(path.clone()..)
            .map(|(p, _)| p)
            .take_while(|p| p.starts_with(path))
            .cloned()
            .collect()
    }

    fn commit(&self, key: &ResourceKey, data: Vec<u8>) -> ResourceResult<()> {
        let kind = {
            let mut entries = self.entries.write();
            Self::check_parent(&entries, key)?;
            let existed = match Self::is_container(&entries, key.path()) {
                Some(true) => return Err(ResourceError::is_directory(key)),
                Some(false) => true,
                None => false,
            };
            entries.insert(
                key.path().clone(),
                Entry::File {
                    data: data.into(),
                    modified: SystemTime::now(),
                },
            );
            if existed {
                ChangeKind::Modified
            } else {
                ChangeKind::Created
            }
        };
        self.hub.notify(ResourceChange::new(key.clone(), kind));
        Ok(())
    }
}

/// In-memory provider.
///
/// Cloning shares the same tree.
#[derive(Debug, Clone, Default)]
pub struct MemoryProvider {
    inner: Arc<Inner>,
}

impl MemoryProvider {
    /// Create an empty in-memory tree.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of entries (files and containers, excluding the root).
    pub fn len(&self) -> usize {
        self.inner.entries.read().len()
    }

    /// Returns true if the tree holds nothing but the root.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Staged write into a [`MemoryProvider`].
struct MemoryWriteHandle {
    inner: Arc<Inner>,
    key: ResourceKey,
    buffer: Vec<u8>,
}

impl AsyncWrite for MemoryWriteHandle {
    fn poll_write(
        mut self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<std::io::Result<usize>> {
        self.buffer.extend_from_slice(buf);
        Poll::Ready(Ok(buf.len()))
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        Poll::Ready(Ok(()))
    }
}

#[async_trait]
impl WriteHandle for MemoryWriteHandle {
    async fn commit(self: Box<Self>) -> ResourceResult<()> {
        let MemoryWriteHandle { inner, key, buffer } = *self;
        inner.commit(&key, buffer)
    }
}

#[async_trait]
impl ResourceProvider for MemoryProvider {
    fn capabilities(&self) -> Capabilities {
        Capabilities::writable().with_watch().with_rename()
    }

    async fn open(&self, key: &ResourceKey) -> ResourceResult<ReadHandle> {
        if key.path().is_root() {
            return Err(ResourceError::is_directory(key));
        }
        let entries = self.inner.entries.read();
        match entries.get(key.path()) {
            Some(Entry::File { data, .. }) => Ok(Box::new(Cursor::new(Arc::clone(data)))),
            Some(Entry::Container { .. }) => Err(ResourceError::is_directory(key)),
            None => Err(ResourceError::not_found(key)),
        }
    }

    async fn create(&self, key: &ResourceKey, truncate: bool) -> ResourceResult<BoxWriteHandle> {
        let buffer = {
            let entries = self.inner.entries.read();
            Inner::check_parent(&entries, key)?;
            match entries.get(key.path()) {
                _ if key.path().is_root() => return Err(ResourceError::is_directory(key)),
                Some(Entry::Container { .. }) => return Err(ResourceError::is_directory(key)),
                Some(Entry::File { data, .. }) if !truncate => data.to_vec(),
                _ => Vec::new(),
            }
        };
        tracing::debug!(key = %key, truncate, "memory write staged");
        Ok(Box::new(MemoryWriteHandle {
            inner: Arc::clone(&self.inner),
            key: key.clone(),
            buffer,
        }))
    }

    async fn list(&self, key: &ResourceKey) -> ResourceResult<Listing> {
        match Inner::is_container(&self.inner.entries.read(), key.path()) {
            Some(true) => {}
            Some(false) => return Err(ResourceError::not_directory(key)),
            None => return Err(ResourceError::not_found(key)),
        }
        let inner = Arc::clone(&self.inner);
        let path = key.path().clone();
        Ok(lazy_listing(key, move || async move {
            let entries = inner.entries.read();
            let depth = path.len() + 1;
            Ok(entries
                .range(path.clone()..)
                .map(|(p, _)| p)
                .take_while(|p| p.starts_with(&path))
                .filter(|p| p.len() == depth)
                .filter_map(|p| p.leaf().map(str::to_string))
                .collect())
        }))
    }

    async fn metadata(&self, key: &ResourceKey) -> ResourceResult<Metadata> {
        if key.path().is_root() {
            return Ok(Metadata::container(None));
        }
        Ok(self
            .inner
            .entries
            .read()
            .get(key.path())
            .map(Entry::metadata)
            .unwrap_or_else(Metadata::missing))
    }

    async fn delete(&self, key: &ResourceKey, recursive: bool) -> ResourceResult<()> {
        if key.path().is_root() {
            return Err(ResourceError::permission_denied(format!(
                "{key}: cannot remove root"
            )));
        }
        let removed = {
            let mut entries = self.inner.entries.write();
            let subtree = Inner::subtree(&entries, key.path());
            if subtree.is_empty() {
                return Err(ResourceError::not_found(key));
            }
            if subtree.len() > 1 && !recursive {
                return Err(ResourceError::not_empty(key));
            }
            for path in &subtree {
                entries.remove(path);
            }
            subtree
        };
        tracing::debug!(key = %key, count = removed.len(), "memory delete");
        for path in removed.into_iter().rev() {
            self.inner
                .hub
                .notify(ResourceChange::new(key.with_path(path), ChangeKind::Removed));
        }
        Ok(())
    }

    async fn mk_container(&self, key: &ResourceKey, create_parents: bool) -> ResourceResult<()> {
        let created = {
            let mut entries = self.inner.entries.write();
            if Inner::is_container(&entries, key.path()).is_some() {
                return Err(ResourceError::already_exists(key));
            }

            let mut missing = vec![key.path().clone()];
            let mut cursor = key.path().parent();
            while let Some(ancestor) = cursor {
                match Inner::is_container(&entries, &ancestor) {
                    Some(true) => break,
                    Some(false) => return Err(ResourceError::not_directory(key.with_path(ancestor))),
                    None if !create_parents => return Err(ResourceError::parent_missing(key)),
                    None => {
                        cursor = ancestor.parent();
                        missing.push(ancestor);
                    }
                }
            }

            let modified = SystemTime::now();
            for path in missing.iter().rev() {
                entries.insert(path.clone(), Entry::Container { modified });
            }
            missing
        };
        for path in created.into_iter().rev() {
            self.inner
                .hub
                .notify(ResourceChange::new(key.with_path(path), ChangeKind::Created));
        }
        Ok(())
    }

    async fn watch(&self, key: &ResourceKey) -> ResourceResult<WatchRegistration> {
        tracing::debug!(key = %key, "memory watch registered");
        Ok(self.inner.hub.register(key.clone()))
    }

    async fn rename(&self, from: &ResourceKey, to: &ResourceKey) -> ResourceResult<()> {
        if from.path().is_root() {
            return Err(ResourceError::permission_denied(format!(
                "{from}: cannot move root"
            )));
        }
        if to.path().starts_with(from.path()) && to.path() != from.path() {
            return Err(ResourceError::unsupported(format!(
                "cannot move {from} into itself"
            )));
        }
        if from.path() == to.path() {
            return Ok(());
        }

        let moved = {
            let mut entries = self.inner.entries.write();
            let subtree = Inner::subtree(&entries, from.path());
            if subtree.is_empty() {
                return Err(ResourceError::not_found(from));
            }
            Inner::check_parent(&entries, to)?;
            match Inner::is_container(&entries, to.path()) {
                Some(true) => return Err(ResourceError::already_exists(to)),
                Some(false) if subtree.len() > 1 => return Err(ResourceError::already_exists(to)),
                _ => {}
            }

            let mut moved = Vec::with_capacity(subtree.len());
            for old in subtree {
                if let Some(entry) = entries.remove(&old) {
                    let tail = old.strip_prefix(from.path()).unwrap_or_default().to_vec();
                    let new = to.path().append_segments(tail)?;
                    entries.insert(new.clone(), entry);
                    moved.push((old, new));
                }
            }
            moved
        };

        tracing::debug!(from = %from, to = %to, "memory rename");
        for (old, new) in moved {
            self.inner
                .hub
                .notify(ResourceChange::new(from.with_path(old), ChangeKind::Removed));
            self.inner
                .hub
                .notify(ResourceChange::new(to.with_path(new), ChangeKind::Created));
        }
        Ok(())
    }
}
