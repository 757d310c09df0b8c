//! Local filesystem provider.
//!
//! Provides access to a directory tree on disk, with path security to
//! prevent escaping the root through symlinks. Writes are staged in a
//! hidden temp file next to the target and renamed into place on commit.

use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::task::{Context, Poll};

use async_trait::async_trait;
use notify::event::{ModifyKind, RenameMode};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::fs;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use uuid::Uuid;

use crate::error::{ResourceError, ResourceResult};
use crate::key::{KeyPath, ResourceKey};
use crate::provider::{
    BoxWriteHandle, Capabilities, Listing, Metadata, ReadHandle, ResourceProvider, WriteHandle,
    check_writable,
};
use crate::watch::{ChangeKind, ResourceChange, WatchRegistration};

use super::lazy_listing;

const TEMP_PREFIX: &str = ".reso-";
const TEMP_SUFFIX: &str = ".tmp";

fn is_staging_name(name: &str) -> bool {
    name.starts_with(TEMP_PREFIX) && name.ends_with(TEMP_SUFFIX)
}

/// Local filesystem provider.
///
/// All keys are relative to `root`. If `root` is `/home/amy/project`, then
/// `file:/src/main.rs` maps to `/home/amy/project/src/main.rs`.
#[derive(Debug, Clone)]
pub struct LocalProvider {
    root: PathBuf,
    read_only: bool,
}

impl LocalProvider {
    /// Create a provider rooted at `root`.
    ///
    /// The root is canonicalized at construction time so symlinked roots
    /// (e.g. macOS `/tmp` → `/private/tmp`) compare correctly. Fails with
    /// `NotFound` if the root is unreachable.
    pub fn new(root: impl AsRef<Path>) -> ResourceResult<Self> {
        let root = root.as_ref();
        let canonical = dunce::canonicalize(root).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => ResourceError::not_found(root.display()),
            _ => ResourceError::Io(e),
        })?;
        if !canonical.is_dir() {
            return Err(ResourceError::not_directory(root.display()));
        }
        tracing::debug!(root = %canonical.display(), "local provider rooted");
        Ok(Self {
            root: canonical,
            read_only: false,
        })
    }

    /// Create a read-only provider rooted at `root`.
    pub fn read_only(root: impl AsRef<Path>) -> ResourceResult<Self> {
        let mut provider = Self::new(root)?;
        provider.read_only = true;
        Ok(provider)
    }

    /// Set whether this provider rejects writes.
    pub fn set_read_only(&mut self, read_only: bool) {
        self.read_only = read_only;
    }

    /// The canonical root directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolve a key to a real filesystem path inside the root.
    ///
    /// Segments can never contain `..` or separators, so the only way out of
    /// the root is through a symlink. The nearest existing ancestor of the
    /// target is canonicalized and must stay under the root.
    pub fn real_path(&self, key: &ResourceKey) -> ResourceResult<PathBuf> {
        let full = key
            .path()
            .iter()
            .fold(self.root.clone(), |acc, seg| acc.join(seg));

        let existing = full
            .ancestors()
            .find(|p| p.symlink_metadata().is_ok())
            .unwrap_or(&self.root);
        let canonical = dunce::canonicalize(existing).map_err(|e| ResourceError::from_io(e, key))?;
        if !canonical.starts_with(&self.root) {
            return Err(ResourceError::escapes_root(format!(
                "{key} resolves to {} outside {}",
                canonical.display(),
                self.root.display()
            )));
        }
        Ok(full)
    }

    /// Map a filesystem path under the root back onto a key.
    fn key_for(&self, base: &ResourceKey, path: &Path) -> Option<ResourceKey> {
        let rel = path.strip_prefix(&self.root).ok()?;
        let segments: Vec<String> = rel
            .components()
            .map(|c| c.as_os_str().to_str().map(str::to_string))
            .collect::<Option<_>>()?;
        KeyPath::from_segments(segments)
            .ok()
            .map(|p| base.with_path(p))
    }

    fn check_writable(&self, key: &ResourceKey) -> ResourceResult<()> {
        check_writable(self.capabilities(), key)
    }

    fn convert_metadata(meta: &std::fs::Metadata) -> Metadata {
        if meta.is_dir() {
            Metadata::container(meta.modified().ok())
        } else {
            Metadata::file(meta.len(), meta.modified().ok())
        }
    }
}

/// Staged write backed by a temp file in the target's directory.
struct LocalWriteHandle {
    file: Option<fs::File>,
    staging: PathBuf,
    target: PathBuf,
    key: ResourceKey,
    committed: bool,
}

impl LocalWriteHandle {
    fn file(&mut self) -> std::io::Result<Pin<&mut fs::File>> {
        self.file
            .as_mut()
            .map(Pin::new)
            .ok_or_else(|| std::io::Error::other("write handle already closed"))
    }
}

impl AsyncWrite for LocalWriteHandle {
    fn poll_write(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<std::io::Result<usize>> {
        match self.file() {
            Ok(file) => file.poll_write(cx, buf),
            Err(e) => Poll::Ready(Err(e)),
        }
    }

    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        match self.file() {
            Ok(file) => file.poll_flush(cx),
            Err(e) => Poll::Ready(Err(e)),
        }
    }

    fn poll_shutdown(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        match self.file() {
            Ok(file) => file.poll_shutdown(cx),
            Err(e) => Poll::Ready(Err(e)),
        }
    }
}

#[async_trait]
impl WriteHandle for LocalWriteHandle {
    async fn commit(mut self: Box<Self>) -> ResourceResult<()> {
        let mut file = self
            .file
            .take()
            .ok_or_else(|| ResourceError::io("write handle already closed"))?;
        file.flush().await.map_err(|e| ResourceError::from_io(e, &self.key))?;
        file.sync_all()
            .await
            .map_err(|e| ResourceError::from_io(e, &self.key))?;
        drop(file);

        fs::rename(&self.staging, &self.target)
            .await
            .map_err(|e| ResourceError::from_io(e, &self.key))?;
        self.committed = true;
        tracing::debug!(key = %self.key, "local write committed");
        Ok(())
    }
}

impl Drop for LocalWriteHandle {
    fn drop(&mut self) {
        if self.committed {
            return;
        }
        self.file = None;
        match std::fs::remove_file(&self.staging) {
            Ok(()) => tracing::debug!(key = %self.key, "discarded staged write"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => tracing::warn!(
                path = %self.staging.display(),
                error = %e,
                "failed to remove staged write"
            ),
        }
    }
}

#[async_trait]
impl ResourceProvider for LocalProvider {
    fn capabilities(&self) -> Capabilities {
        if self.read_only {
            Capabilities::read_only().with_watch()
        } else {
            Capabilities::writable().with_watch().with_rename()
        }
    }

    async fn open(&self, key: &ResourceKey) -> ResourceResult<ReadHandle> {
        let path = self.real_path(key)?;
        let meta = fs::metadata(&path)
            .await
            .map_err(|e| ResourceError::from_io(e, key))?;
        if meta.is_dir() {
            return Err(ResourceError::is_directory(key));
        }
        let file = fs::File::open(&path)
            .await
            .map_err(|e| ResourceError::from_io(e, key))?;
        Ok(Box::new(file))
    }

    async fn create(&self, key: &ResourceKey, truncate: bool) -> ResourceResult<BoxWriteHandle> {
        self.check_writable(key)?;
        let target = self.real_path(key)?;
        let parent = match target.parent() {
            Some(parent) if !key.path().is_root() => parent.to_path_buf(),
            _ => return Err(ResourceError::is_directory(key)),
        };

        match fs::metadata(&parent).await {
            Ok(meta) if meta.is_dir() => {}
            Ok(_) => return Err(ResourceError::not_directory(key)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(ResourceError::parent_missing(key));
            }
            Err(e) => return Err(ResourceError::from_io(e, key)),
        }

        let existing = match fs::metadata(&target).await {
            Ok(meta) if meta.is_dir() => return Err(ResourceError::is_directory(key)),
            Ok(_) => true,
            Err(_) => false,
        };

        let staging = parent.join(format!("{TEMP_PREFIX}{}{TEMP_SUFFIX}", Uuid::new_v4()));
        let mut handle = LocalWriteHandle {
            file: None,
            staging: staging.clone(),
            target,
            key: key.clone(),
            committed: false,
        };

        // From here on, dropping `handle` removes the staging file.
        let file = if existing && !truncate {
            fs::copy(&handle.target, &staging)
                .await
                .map_err(|e| ResourceError::from_io(e, key))?;
            fs::OpenOptions::new().append(true).open(&staging).await
        } else {
            fs::File::create(&staging).await
        };
        handle.file = Some(file.map_err(|e| ResourceError::from_io(e, key))?);

        tracing::debug!(key = %key, truncate, "local write staged");
        Ok(Box::new(handle))
    }

    async fn list(&self, key: &ResourceKey) -> ResourceResult<Listing> {
        let path = self.real_path(key)?;
        let meta = fs::metadata(&path)
            .await
            .map_err(|e| ResourceError::from_io(e, key))?;
        if !meta.is_dir() {
            return Err(ResourceError::not_directory(key));
        }

        let dir_key = key.clone();
        Ok(lazy_listing(key, move || async move {
            let mut names = Vec::new();
            let mut dir = fs::read_dir(&path)
                .await
                .map_err(|e| ResourceError::from_io(e, &dir_key))?;
            while let Some(entry) = dir
                .next_entry()
                .await
                .map_err(|e| ResourceError::from_io(e, &dir_key))?
            {
                match entry.file_name().into_string() {
                    Ok(name) if is_staging_name(&name) => {}
                    Ok(name) => names.push(name),
                    Err(raw) => {
                        tracing::debug!(name = ?raw, "skipping non-UTF-8 entry");
                    }
                }
            }
            Ok(names)
        }))
    }

    async fn metadata(&self, key: &ResourceKey) -> ResourceResult<Metadata> {
        let path = self.real_path(key)?;
        match fs::metadata(&path).await {
            Ok(meta) => Ok(Self::convert_metadata(&meta)),
            // A file where a parent container should be means the key is absent.
            Err(e)
                if matches!(
                    e.kind(),
                    std::io::ErrorKind::NotFound | std::io::ErrorKind::NotADirectory
                ) =>
            {
                Ok(Metadata::missing())
            }
            Err(e) => Err(ResourceError::from_io(e, key)),
        }
    }

    async fn delete(&self, key: &ResourceKey, recursive: bool) -> ResourceResult<()> {
        self.check_writable(key)?;
        if key.path().is_root() {
            return Err(ResourceError::permission_denied(format!(
                "{key}: cannot remove root"
            )));
        }
        let path = self.real_path(key)?;
        let meta = fs::symlink_metadata(&path)
            .await
            .map_err(|e| ResourceError::from_io(e, key))?;

        let result = if meta.is_dir() {
            if recursive {
                fs::remove_dir_all(&path).await
            } else {
                let mut dir = fs::read_dir(&path)
                    .await
                    .map_err(|e| ResourceError::from_io(e, key))?;
                if dir
                    .next_entry()
                    .await
                    .map_err(|e| ResourceError::from_io(e, key))?
                    .is_some()
                {
                    return Err(ResourceError::not_empty(key));
                }
                fs::remove_dir(&path).await
            }
        } else {
            fs::remove_file(&path).await
        };
        result.map_err(|e| ResourceError::from_io(e, key))?;
        tracing::debug!(key = %key, recursive, "local delete");
        Ok(())
    }

    async fn mk_container(&self, key: &ResourceKey, create_parents: bool) -> ResourceResult<()> {
        self.check_writable(key)?;
        let path = self.real_path(key)?;
        if fs::symlink_metadata(&path).await.is_ok() {
            return Err(ResourceError::already_exists(key));
        }

        if create_parents {
            fs::create_dir_all(&path)
                .await
                .map_err(|e| ResourceError::from_io(e, key))?;
        } else {
            let parent = path.parent().unwrap_or(&self.root);
            match fs::metadata(parent).await {
                Ok(meta) if meta.is_dir() => {}
                Ok(_) => return Err(ResourceError::not_directory(key)),
                Err(_) => return Err(ResourceError::parent_missing(key)),
            }
            fs::create_dir(&path)
                .await
                .map_err(|e| ResourceError::from_io(e, key))?;
        }
        Ok(())
    }

    /// Commits land by renaming the staged file over the target, so a
    /// committed write reports `Created` whether or not the file existed
    /// before. In-place changes from other writers report `Modified`.
    async fn watch(&self, key: &ResourceKey) -> ResourceResult<WatchRegistration> {
        let path = self.real_path(key)?;
        if fs::symlink_metadata(&path).await.is_err() {
            return Err(ResourceError::not_found(key));
        }

        let (registration, sender) = WatchRegistration::channel(key.clone());
        let provider = self.clone();
        let base = key.clone();

        let mut watcher = RecommendedWatcher::new(
            move |result: Result<Event, notify::Error>| {
                let event = match result {
                    Ok(event) => event,
                    Err(e) => {
                        tracing::warn!(error = %e, "local watch error");
                        return;
                    }
                };
                let kind = match event.kind {
                    EventKind::Create(_) => ChangeKind::Created,
                    EventKind::Remove(_) => ChangeKind::Removed,
                    EventKind::Modify(ModifyKind::Name(RenameMode::From)) => ChangeKind::Removed,
                    EventKind::Modify(ModifyKind::Name(RenameMode::To)) => ChangeKind::Created,
                    EventKind::Modify(ModifyKind::Name(RenameMode::Both)) => return,
                    EventKind::Modify(_) => ChangeKind::Modified,
                    _ => return,
                };
                for path in &event.paths {
                    let staging = path
                        .file_name()
                        .and_then(|n| n.to_str())
                        .is_some_and(is_staging_name);
                    if staging {
                        continue;
                    }
                    if let Some(changed) = provider.key_for(&base, path) {
                        sender.send(ResourceChange::new(changed, kind));
                    }
                }
            },
            notify::Config::default(),
        )
        .map_err(|e| ResourceError::io(e.to_string()))?;

        watcher
            .watch(&path, RecursiveMode::Recursive)
            .map_err(|e| ResourceError::io(e.to_string()))?;

        tracing::info!(key = %key, path = %path.display(), "local watch started");
        Ok(registration.with_guard(watcher))
    }

    async fn rename(&self, from: &ResourceKey, to: &ResourceKey) -> ResourceResult<()> {
        self.check_writable(from)?;
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

        let from_path = self.real_path(from)?;
        let to_path = self.real_path(to)?;
        let from_meta = fs::symlink_metadata(&from_path)
            .await
            .map_err(|e| ResourceError::from_io(e, from))?;

        match to_path.parent().map(|p| p.exists()) {
            Some(true) => {}
            _ => return Err(ResourceError::parent_missing(to)),
        }
        if let Ok(to_meta) = fs::symlink_metadata(&to_path).await {
            if to_meta.is_dir() || from_meta.is_dir() {
                return Err(ResourceError::already_exists(to));
            }
        }

        fs::rename(&from_path, &to_path)
            .await
            .map_err(|e| ResourceError::from_io(e, from))?;
        tracing::debug!(from = %from, to = %to, "local rename");
        Ok(())
    }
}
