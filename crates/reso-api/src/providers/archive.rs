//! Read-only access to entries inside zip archives.
//!
//! Keys name the archive file relative to a host root, then the entry inside
//! it, separated by the first segment that ends in `!`:
//!
//! ```text
//! archive:/lib/foo.jar!/META-INF/MANIFEST.MF
//!          ^^^^^^^^^^^^ ^^^^^^^^^^^^^^^^^^^^^
//!          archive file entry path
//! ```
//!
//! Directories inside an archive are implied by entry names, so an archive
//! without explicit directory entries still lists like a tree.

use std::fs::File;
use std::io::{Cursor, Read};
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use zip::ZipArchive;
use zip::result::ZipError;

use crate::error::{ResourceError, ResourceResult};
use crate::key::{KeyPath, ResourceKey};
use crate::provider::{
    BoxWriteHandle, Capabilities, Listing, Metadata, ReadHandle, ResourceProvider, check_writable,
};

use super::{LocalProvider, sorted_listing};

/// Suffix marking the archive file segment of a key.
pub const ARCHIVE_SEPARATOR: char = '!';

/// Upper bound on buffer space reserved from an entry's declared size.
const MAX_PREALLOC: u64 = 64 * 1024;

/// Where a key points: an archive file on the host plus an entry path.
#[derive(Debug, Clone)]
struct Location {
    key: ResourceKey,
    archive: PathBuf,
    /// Entry path without leading or trailing `/`; empty for the archive root.
    entry: String,
}

/// What an entry path names inside an archive.
enum Node {
    File(u64),
    Directory,
    Missing,
}

impl Location {
    fn open_zip(&self) -> ResourceResult<ZipArchive<File>> {
        let file = File::open(&self.archive).map_err(|e| ResourceError::from_io(e, &self.key))?;
        ZipArchive::new(file).map_err(|e| zip_error(e, &self.key))
    }

    /// Prefix shared by everything below this entry.
    fn child_prefix(&self) -> String {
        if self.entry.is_empty() {
            String::new()
        } else {
            format!("{}/", self.entry)
        }
    }

    fn node(&self, zip: &mut ZipArchive<File>) -> ResourceResult<Node> {
        if self.entry.is_empty() {
            return Ok(Node::Directory);
        }
        match zip.by_name(&self.entry) {
            Ok(file) if file.is_dir() => return Ok(Node::Directory),
            Ok(file) => return Ok(Node::File(file.size())),
            Err(ZipError::FileNotFound) => {}
            Err(e) => return Err(zip_error(e, &self.key)),
        }
        let prefix = self.child_prefix();
        if zip.file_names().any(|name| name.starts_with(&prefix)) {
            Ok(Node::Directory)
        } else {
            Ok(Node::Missing)
        }
    }

    fn read(&self) -> ResourceResult<Vec<u8>> {
        let mut zip = self.open_zip()?;
        match self.node(&mut zip)? {
            Node::Directory => return Err(ResourceError::is_directory(&self.key)),
            Node::Missing => return Err(ResourceError::not_found(&self.key)),
            Node::File(_) => {}
        }
        let mut file = zip
            .by_name(&self.entry)
            .map_err(|e| zip_error(e, &self.key))?;
        let mut buf = Vec::with_capacity(file.size().min(MAX_PREALLOC) as usize);
        file.read_to_end(&mut buf)
            .map_err(|e| ResourceError::from_io(e, &self.key))?;
        Ok(buf)
    }

    fn children(&self) -> ResourceResult<Vec<String>> {
        let mut zip = self.open_zip()?;
        match self.node(&mut zip)? {
            Node::Directory => {}
            Node::File(_) => return Err(ResourceError::not_directory(&self.key)),
            Node::Missing => return Err(ResourceError::not_found(&self.key)),
        }
        let prefix = self.child_prefix();
        Ok(zip
            .file_names()
            .filter_map(|name| name.strip_prefix(prefix.as_str()))
            .filter_map(|rest| rest.split('/').next())
            .filter(|child| !child.is_empty())
            .map(str::to_string)
            .collect())
    }

    fn metadata(&self) -> ResourceResult<Metadata> {
        let modified = match std::fs::metadata(&self.archive) {
            Ok(meta) if meta.is_file() => meta.modified().ok(),
            Ok(_) => return Ok(Metadata::missing()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Metadata::missing()),
            Err(e) => return Err(ResourceError::from_io(e, &self.key)),
        };
        let mut zip = self.open_zip()?;
        Ok(match self.node(&mut zip)? {
            Node::File(size) => Metadata::file(size, modified),
            Node::Directory => Metadata::container(modified),
            Node::Missing => Metadata::missing(),
        })
    }
}

fn zip_error(err: ZipError, key: &ResourceKey) -> ResourceError {
    match err {
        ZipError::FileNotFound => ResourceError::not_found(key),
        ZipError::Io(e) => ResourceError::from_io(e, key),
        other => ResourceError::io(format!("{key}: {other}")),
    }
}

/// Read-only provider over zip archives below a host directory.
#[derive(Debug, Clone)]
pub struct ArchiveProvider {
    host: LocalProvider,
}

impl ArchiveProvider {
    /// Serve archives found under `root`.
    pub fn new(root: impl AsRef<Path>) -> ResourceResult<Self> {
        Ok(Self {
            host: LocalProvider::read_only(root)?,
        })
    }

    /// The host directory archives are resolved against.
    pub fn root(&self) -> &Path {
        self.host.root()
    }

    /// Split a key into the archive file and the entry path inside it.
    fn locate(&self, key: &ResourceKey) -> ResourceResult<Location> {
        let segments = key.path().segments();
        let split = segments
            .iter()
            .position(|seg| seg.len() > 1 && seg.ends_with(ARCHIVE_SEPARATOR))
            .ok_or_else(|| {
                ResourceError::malformed(
                    key.to_string(),
                    format!("no archive segment ending in '{ARCHIVE_SEPARATOR}'"),
                )
            })?;

        let mut archive_segments = segments[..=split].to_vec();
        if let Some(last) = archive_segments.last_mut() {
            last.pop();
        }
        let archive_path = KeyPath::from_segments(archive_segments)?;
        let archive = self.host.real_path(&key.with_path(archive_path))?;

        Ok(Location {
            key: key.clone(),
            archive,
            entry: segments[split + 1..].join("/"),
        })
    }

    async fn blocking<T, F>(&self, key: &ResourceKey, f: F) -> ResourceResult<T>
    where
        T: Send + 'static,
        F: FnOnce(Location) -> ResourceResult<T> + Send + 'static,
    {
        let location = self.locate(key)?;
        tokio::task::spawn_blocking(move || f(location))
            .await
            .map_err(|e| ResourceError::io(format!("archive task failed: {e}")))?
    }
}

#[async_trait]
impl ResourceProvider for ArchiveProvider {
    fn capabilities(&self) -> Capabilities {
        Capabilities::read_only()
    }

    async fn open(&self, key: &ResourceKey) -> ResourceResult<ReadHandle> {
        let data = self.blocking(key, |loc| loc.read()).await?;
        tracing::debug!(key = %key, size = data.len(), "archive entry read");
        Ok(Box::new(Cursor::new(data)))
    }

    async fn create(&self, key: &ResourceKey, _truncate: bool) -> ResourceResult<BoxWriteHandle> {
        check_writable(self.capabilities(), key)?;
        Err(ResourceError::unsupported("archive writes"))
    }

    async fn list(&self, key: &ResourceKey) -> ResourceResult<Listing> {
        let names = self.blocking(key, |loc| loc.children()).await?;
        Ok(sorted_listing(key, names))
    }

    async fn metadata(&self, key: &ResourceKey) -> ResourceResult<Metadata> {
        self.blocking(key, |loc| loc.metadata()).await
    }

    async fn delete(&self, key: &ResourceKey, _recursive: bool) -> ResourceResult<()> {
        check_writable(self.capabilities(), key)?;
        Err(ResourceError::unsupported("archive deletes"))
    }

    async fn mk_container(&self, key: &ResourceKey, _create_parents: bool) -> ResourceResult<()> {
        check_writable(self.capabilities(), key)?;
        Err(ResourceError::unsupported("archive containers"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::TryStreamExt;
    use std::io::Write;
    use tempfile::TempDir;
    use tokio::io::AsyncReadExt;
    use zip::write::SimpleFileOptions;

    fn key(text: &str) -> ResourceKey {
        ResourceKey::parse(text).unwrap()
    }

    fn setup() -> (ArchiveProvider, TempDir) {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir(dir.path().join("lib")).unwrap();
        let file = File::create(dir.path().join("lib/foo.jar")).unwrap();
        let mut zip = zip::ZipWriter::new(file);
        let options =
            SimpleFileOptions::default().compression_method(zip::CompressionMethod::Stored);
        zip.start_file("META-INF/MANIFEST.MF", options).unwrap();
        zip.write_all(b"Manifest-Version: 1.0\n").unwrap();
        zip.start_file("com/example/B.class", options).unwrap();
        zip.write_all(b"bb").unwrap();
        zip.start_file("com/example/A.class", options).unwrap();
        zip.write_all(b"a").unwrap();
        zip.add_directory("empty/", options).unwrap();
        zip.finish().unwrap();

        let provider = ArchiveProvider::new(dir.path()).unwrap();
        (provider, dir)
    }

    #[tokio::test]
    async fn test_read_entry() {
        let (fs, _dir) = setup();
        let mut handle = fs
            .open(&key("archive:/lib/foo.jar!/META-INF/MANIFEST.MF"))
            .await
            .unwrap();
        let mut text = String::new();
        handle.read_to_string(&mut text).await.unwrap();
        assert_eq!(text, "Manifest-Version: 1.0\n");
    }

    #[tokio::test]
    async fn test_read_entry_beyond_prealloc() {
        let dir = TempDir::new().unwrap();
        let payload: Vec<u8> = (0..MAX_PREALLOC * 3).map(|i| (i % 251) as u8).collect();
        let mut zip = zip::ZipWriter::new(File::create(dir.path().join("big.zip")).unwrap());
        zip.start_file("data.bin", SimpleFileOptions::default()).unwrap();
        zip.write_all(&payload).unwrap();
        zip.finish().unwrap();

        let fs = ArchiveProvider::new(dir.path()).unwrap();
        let mut handle = fs.open(&key("archive:/big.zip!/data.bin")).await.unwrap();
        let mut out = Vec::new();
        handle.read_to_end(&mut out).await.unwrap();
        assert_eq!(out, payload);
    }

    #[tokio::test]
    async fn test_list_implied_directories() {
        let (fs, _dir) = setup();
        let root: Vec<_> = fs
            .list(&key("archive:/lib/foo.jar!"))
            .await
            .unwrap()
            .try_collect()
            .await
            .unwrap();
        assert_eq!(
            root,
            vec![
                key("archive:/lib/foo.jar!/META-INF"),
                key("archive:/lib/foo.jar!/com"),
                key("archive:/lib/foo.jar!/empty"),
            ]
        );

        let classes: Vec<_> = fs
            .list(&key("archive:/lib/foo.jar!/com/example"))
            .await
            .unwrap()
            .try_collect()
            .await
            .unwrap();
        assert_eq!(
            classes,
            vec![
                key("archive:/lib/foo.jar!/com/example/A.class"),
                key("archive:/lib/foo.jar!/com/example/B.class"),
            ]
        );
    }

    #[tokio::test]
    async fn test_metadata() {
        let (fs, _dir) = setup();
        let meta = fs
            .metadata(&key("archive:/lib/foo.jar!/com/example/B.class"))
            .await
            .unwrap();
        assert!(meta.exists && !meta.is_container);
        assert_eq!(meta.size, Some(2));

        assert!(fs.metadata(&key("archive:/lib/foo.jar!/com")).await.unwrap().is_container);
        assert!(fs.metadata(&key("archive:/lib/foo.jar!/empty")).await.unwrap().is_container);
        assert!(!fs.metadata(&key("archive:/lib/foo.jar!/nope")).await.unwrap().exists);
        assert!(!fs.metadata(&key("archive:/lib/missing.jar!/x")).await.unwrap().exists);
    }

    #[tokio::test]
    async fn test_errors() {
        let (fs, _dir) = setup();
        assert!(matches!(
            fs.open(&key("archive:/lib/foo.jar!/com")).await,
            Err(ResourceError::IsDirectory(_))
        ));
        assert!(matches!(
            fs.open(&key("archive:/lib/foo.jar!/nope")).await,
            Err(ResourceError::NotFound(_))
        ));
        assert!(matches!(
            fs.open(&key("archive:/lib/foo.jar")).await,
            Err(ResourceError::MalformedKey { .. })
        ));
        assert!(matches!(
            fs.create(&key("archive:/lib/foo.jar!/new"), true).await,
            Err(ResourceError::PermissionDenied(_))
        ));
        assert!(matches!(
            fs.list(&key("archive:/lib/foo.jar!/META-INF/MANIFEST.MF")).await,
            Err(ResourceError::NotDirectory(_))
        ));
    }
}
