//! Resource service facade.
//!
//! The service resolves keys through the registry and normalizes semantics
//! that span providers: whole-resource reads and writes, copies that are
//! all-or-nothing per resource, and moves that use a native rename when both
//! keys land on the same provider.

use std::sync::Arc;

use futures::TryStreamExt;
use tokio::io::{AsyncReadExt, AsyncWriteExt};

use crate::error::{ErrorMode, ResourceError, ResourceResult};
use crate::key::ResourceKey;
use crate::provider::{BoxWriteHandle, Capabilities, Listing, Metadata, ReadHandle, ResourceProvider};
use crate::registry::ResourceRegistry;
use crate::walk::{self, Matcher, Walker};
use crate::watch::WatchRegistration;

/// Facade over a [`ResourceRegistry`].
///
/// Cheap to clone; clones share the registry.
#[derive(Debug, Clone)]
pub struct ResourceService {
    registry: Arc<ResourceRegistry>,
}

impl ResourceService {
    pub fn new(registry: Arc<ResourceRegistry>) -> Self {
        Self { registry }
    }

    /// The registry this service resolves through.
    pub fn registry(&self) -> &Arc<ResourceRegistry> {
        &self.registry
    }

    /// The provider responsible for `key`.
    pub fn provider(&self, key: &ResourceKey) -> ResourceResult<Arc<dyn ResourceProvider>> {
        self.registry.resolve(key)
    }

    /// Capabilities of the provider registered for `scheme`.
    pub fn capabilities(&self, scheme: &str) -> ResourceResult<Capabilities> {
        Ok(self.registry.lookup(scheme)?.capabilities())
    }

    /// Parse key text and check that its scheme has a provider.
    pub fn parse_key(&self, text: &str) -> ResourceResult<ResourceKey> {
        let key = ResourceKey::parse(text)?;
        self.registry.resolve(&key)?;
        Ok(key)
    }

    /// Interpret `key_or_path` as a full key when it names a registered
    /// scheme, otherwise as a path relative to `base`.
    pub fn append_or_replace(&self, base: &ResourceKey, key_or_path: &str) -> ResourceResult<ResourceKey> {
        match key_or_path.split_once(':') {
            Some((scheme, _)) if self.registry.contains(scheme) => ResourceKey::parse(key_or_path),
            _ => base.resolve(key_or_path),
        }
    }

    pub async fn open(&self, key: &ResourceKey) -> ResourceResult<ReadHandle> {
        self.provider(key)?.open(key).await
    }

    pub async fn create(&self, key: &ResourceKey, truncate: bool) -> ResourceResult<BoxWriteHandle> {
        self.provider(key)?.create(key, truncate).await
    }

    pub async fn list(&self, key: &ResourceKey) -> ResourceResult<Listing> {
        self.provider(key)?.list(key).await
    }

    /// Collect the children of a container.
    pub async fn list_keys(&self, key: &ResourceKey) -> ResourceResult<Vec<ResourceKey>> {
        self.list(key).await?.try_collect().await
    }

    pub async fn metadata(&self, key: &ResourceKey) -> ResourceResult<Metadata> {
        self.provider(key)?.metadata(key).await
    }

    pub async fn exists(&self, key: &ResourceKey) -> ResourceResult<bool> {
        self.provider(key)?.exists(key).await
    }

    pub async fn delete(&self, key: &ResourceKey, recursive: bool) -> ResourceResult<()> {
        self.provider(key)?.delete(key, recursive).await
    }

    pub async fn mk_container(&self, key: &ResourceKey, create_parents: bool) -> ResourceResult<()> {
        self.provider(key)?.mk_container(key, create_parents).await
    }

    /// Watch `key` and its descendants.
    ///
    /// Fails with `Unsupported` when the provider does not declare watch
    /// support.
    pub async fn watch(&self, key: &ResourceKey) -> ResourceResult<WatchRegistration> {
        let provider = self.provider(key)?;
        if !provider.capabilities().supports_watch {
            return Err(ResourceError::unsupported(format!("watch on {}", key.scheme())));
        }
        provider.watch(key).await
    }

    /// Read a whole resource into memory.
    pub async fn read_all_bytes(&self, key: &ResourceKey) -> ResourceResult<Vec<u8>> {
        let mut handle = self.open(key).await?;
        let mut data = Vec::new();
        handle
            .read_to_end(&mut data)
            .await
            .map_err(|e| ResourceError::from_io(e, key))?;
        Ok(data)
    }

    /// Read a whole resource as UTF-8 text.
    pub async fn read_to_string(&self, key: &ResourceKey) -> ResourceResult<String> {
        let data = self.read_all_bytes(key).await?;
        String::from_utf8(data).map_err(|e| {
            ResourceError::Io(std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                format!("{key}: {e}"),
            ))
        })
    }

    /// Replace a resource's content. Readers see the old or the new content,
    /// never a mix.
    pub async fn write_all_bytes(&self, key: &ResourceKey, data: &[u8]) -> ResourceResult<()> {
        self.write_with(key, data, true).await
    }

    pub async fn write_string(&self, key: &ResourceKey, text: &str) -> ResourceResult<()> {
        self.write_with(key, text.as_bytes(), true).await
    }

    /// Append to a resource, creating it if missing.
    pub async fn append_bytes(&self, key: &ResourceKey, data: &[u8]) -> ResourceResult<()> {
        self.write_with(key, data, false).await
    }

    async fn write_with(&self, key: &ResourceKey, data: &[u8], truncate: bool) -> ResourceResult<()> {
        let mut handle = self.create(key, truncate).await?;
        handle
            .write_all(data)
            .await
            .map_err(|e| ResourceError::from_io(e, key))?;
        handle.commit().await
    }

    /// Copy `src` to `dst`, stopping at the first error.
    pub async fn copy(&self, src: &ResourceKey, dst: &ResourceKey) -> ResourceResult<()> {
        self.copy_with(src, dst, ErrorMode::FailFast).await
    }

    /// Copy `src` to `dst`.
    ///
    /// Each leaf is streamed into a staged write and committed only when the
    /// whole stream arrived, so a failure leaves the destination leaf absent
    /// or with its previous content. Containers are copied recursively into
    /// a new or existing destination container. With
    /// [`ErrorMode::CollectAll`] the copy continues past failing entries and
    /// reports them together.
    ///
    /// Only individual leaves are atomic. When a container copy fails, the
    /// leaves committed before the failure stay in the destination, and
    /// with `CollectAll` every leaf that succeeded is kept.
    ///
    /// Identity is decided by provider instance and path: qualifiers and
    /// scheme aliases of the same provider do not make two keys distinct.
    pub async fn copy_with(
        &self,
        src: &ResourceKey,
        dst: &ResourceKey,
        mode: ErrorMode,
    ) -> ResourceResult<()> {
        let from = self.provider(src)?;
        let to = self.provider(dst)?;
        if same_provider(&from, &to) {
            if src.path() == dst.path() {
                return Ok(());
            }
            if dst.path().starts_with(src.path()) {
                return Err(ResourceError::unsupported(format!("cannot copy {src} into itself")));
            }
        }
        tracing::debug!(src = %src, dst = %dst, ?mode, "copy");

        let mut errors = Vec::new();
        let mut pending = vec![(src.clone(), dst.clone())];
        while let Some((src, dst)) = pending.pop() {
            match copy_one(from.as_ref(), to.as_ref(), &src, &dst).await {
                Ok(children) => pending.extend(children.into_iter().rev()),
                Err(e) if mode == ErrorMode::FailFast => return Err(e),
                Err(e) => {
                    tracing::debug!(src = %src, error = %e, "copy entry failed, continuing");
                    errors.push(e);
                }
            }
        }
        collect_errors(errors)
    }

    /// Move `src` to `dst`, stopping at the first error.
    pub async fn move_to(&self, src: &ResourceKey, dst: &ResourceKey) -> ResourceResult<()> {
        self.move_with(src, dst, ErrorMode::FailFast).await
    }

    /// Move `src` to `dst`.
    ///
    /// Uses the provider's atomic rename when both keys resolve to the same
    /// provider instance and it supports renaming. Otherwise copies and then
    /// deletes the source recursively; the source is only deleted when the
    /// whole copy succeeded.
    pub async fn move_with(
        &self,
        src: &ResourceKey,
        dst: &ResourceKey,
        mode: ErrorMode,
    ) -> ResourceResult<()> {
        let from = self.provider(src)?;
        let to = self.provider(dst)?;
        if same_provider(&from, &to) {
            if src.path() == dst.path() {
                return Ok(());
            }
            if dst.path().starts_with(src.path()) {
                return Err(ResourceError::unsupported(format!("cannot move {src} into itself")));
            }
        }

        if same_provider(&from, &to) && from.capabilities().supports_rename {
            tracing::debug!(src = %src, dst = %dst, "move by rename");
            return from.rename(src, dst).await.map_err(|e| e.during("rename", src));
        }

        tracing::debug!(src = %src, dst = %dst, "move by copy and delete");
        self.copy_with(src, dst, mode).await?;
        from.delete(src, true)
            .await
            .map_err(|e| e.during("delete", src))
    }

    /// Walk below `root`; see [`walk::walk`].
    pub async fn walk(
        &self,
        root: &ResourceKey,
        walker: &dyn Walker,
        matcher: &dyn Matcher,
    ) -> ResourceResult<Vec<ResourceKey>> {
        let provider = self.provider(root)?;
        walk::walk(provider.as_ref(), root, walker, matcher).await
    }
}

/// Copy one resource. Returns the child pairs still to copy when `src` is a
/// container.
async fn copy_one(
    from: &dyn ResourceProvider,
    to: &dyn ResourceProvider,
    src: &ResourceKey,
    dst: &ResourceKey,
) -> ResourceResult<Vec<(ResourceKey, ResourceKey)>> {
    let meta = from
        .metadata(src)
        .await
        .map_err(|e| e.during("metadata", src))?;
    if !meta.exists {
        return Err(ResourceError::not_found(src).during("metadata", src));
    }

    if meta.is_container {
        let existing = to
            .metadata(dst)
            .await
            .map_err(|e| e.during("metadata", dst))?;
        if existing.exists && !existing.is_container {
            return Err(ResourceError::not_directory(dst).during("mk_container", dst));
        }
        if !existing.exists {
            to.mk_container(dst, false)
                .await
                .map_err(|e| e.during("mk_container", dst))?;
        }

        let children: Vec<ResourceKey> = from
            .list(src)
            .await
            .map_err(|e| e.during("list", src))?
            .try_collect()
            .await
            .map_err(|e: ResourceError| e.during("list", src))?;
        let mut pairs = Vec::with_capacity(children.len());
        for child in children {
            let target = dst.join_segment(child.leaf().unwrap_or_default())?;
            pairs.push((child, target));
        }
        return Ok(pairs);
    }

    let mut reader = from.open(src).await.map_err(|e| e.during("open", src))?;
    let mut writer = to
        .create(dst, true)
        .await
        .map_err(|e| e.during("create", dst))?;
    // An error before commit drops `writer`, discarding the staged bytes.
    tokio::io::copy(&mut reader, &mut writer)
        .await
        .map_err(|e| ResourceError::from_io(e, src).during("copy", dst))?;
    writer
        .shutdown()
        .await
        .map_err(|e| ResourceError::from_io(e, dst).during("copy", dst))?;
    writer.commit().await.map_err(|e| e.during("commit", dst))?;
    Ok(Vec::new())
}

/// Two registrations backed by the same provider instance.
fn same_provider(a: &Arc<dyn ResourceProvider>, b: &Arc<dyn ResourceProvider>) -> bool {
    std::ptr::addr_eq(Arc::as_ptr(a), Arc::as_ptr(b))
}

fn collect_errors(errors: Vec<ResourceError>) -> ResourceResult<()> {
    if errors.is_empty() {
        Ok(())
    } else {
        Err(ResourceError::Multiple(errors))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::{BundledProvider, MemoryProvider};
    use crate::walk::{AllWalker, FileMatcher};

    fn key(text: &str) -> ResourceKey {
        ResourceKey::parse(text).unwrap()
    }

    fn service() -> ResourceService {
        let registry = ResourceRegistry::new();
        registry.register("mem", MemoryProvider::new()).unwrap();
        registry.register("other", MemoryProvider::new()).unwrap();
        registry
            .register(
                "bundle",
                BundledProvider::new()
                    .with_entry("/tree/a.txt", b"alpha")
                    .unwrap()
                    .with_entry("/tree/sub/b.txt", b"beta")
                    .unwrap(),
            )
            .unwrap();
        ResourceService::new(Arc::new(registry))
    }

    #[tokio::test]
    async fn test_write_and_read() {
        let svc = service();
        svc.write_string(&key("mem:/a.txt"), "hello").await.unwrap();
        assert_eq!(svc.read_to_string(&key("mem:/a.txt")).await.unwrap(), "hello");

        svc.append_bytes(&key("mem:/a.txt"), b" world").await.unwrap();
        assert_eq!(
            svc.read_all_bytes(&key("mem:/a.txt")).await.unwrap(),
            b"hello world"
        );
    }

    #[tokio::test]
    async fn test_read_to_string_rejects_invalid_utf8() {
        let svc = service();
        svc.write_all_bytes(&key("mem:/bin"), &[0xff, 0xfe]).await.unwrap();
        assert!(matches!(
            svc.read_to_string(&key("mem:/bin")).await,
            Err(ResourceError::Io(_))
        ));
    }

    #[tokio::test]
    async fn test_copy_tree_across_providers() {
        let svc = service();
        svc.copy(&key("bundle:/tree"), &key("mem:/copy")).await.unwrap();

        assert_eq!(svc.read_to_string(&key("mem:/copy/a.txt")).await.unwrap(), "alpha");
        assert_eq!(
            svc.read_to_string(&key("mem:/copy/sub/b.txt")).await.unwrap(),
            "beta"
        );
        assert!(svc.metadata(&key("mem:/copy/sub")).await.unwrap().is_container);
    }

    #[tokio::test]
    async fn test_copy_missing_source_reports_step() {
        let svc = service();
        let err = svc
            .copy(&key("mem:/nothing"), &key("other:/x"))
            .await
            .unwrap_err();
        match &err {
            ResourceError::Composite { operation, key: at, .. } => {
                assert_eq!(*operation, "metadata");
                assert_eq!(at, &key("mem:/nothing"));
            }
            other => panic!("expected composite error, got {other:?}"),
        }
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_copy_into_itself_rejected() {
        let svc = service();
        svc.mk_container(&key("mem:/dir"), false).await.unwrap();
        assert!(matches!(
            svc.copy(&key("mem:/dir"), &key("mem:/dir/inner")).await,
            Err(ResourceError::Unsupported(_))
        ));
    }

    #[tokio::test]
    async fn test_copy_into_itself_ignores_qualifiers() {
        let svc = service();
        svc.mk_container(&key("mem:/a"), false).await.unwrap();
        svc.write_string(&key("mem:/a/f"), "x").await.unwrap();

        let src = key("mem:/a?rev=1");
        let dst = key("mem:/a/b");
        let copy = tokio::time::timeout(
            std::time::Duration::from_secs(5),
            svc.copy(&src, &dst),
        );
        assert!(matches!(copy.await, Ok(Err(ResourceError::Unsupported(_)))));
        assert!(!svc.exists(&key("mem:/a/b")).await.unwrap());
    }

    #[tokio::test]
    async fn test_copy_into_itself_through_scheme_alias() {
        let shared: Arc<dyn ResourceProvider> = Arc::new(MemoryProvider::new());
        let registry = ResourceRegistry::new();
        registry.register_arc("mem", Arc::clone(&shared)).unwrap();
        registry.register_arc("alias", shared).unwrap();
        let svc = ResourceService::new(Arc::new(registry));
        svc.mk_container(&key("mem:/a"), false).await.unwrap();
        svc.write_string(&key("mem:/a/f"), "x").await.unwrap();

        assert!(matches!(
            svc.copy(&key("mem:/a"), &key("alias:/a/b")).await,
            Err(ResourceError::Unsupported(_))
        ));
        assert!(matches!(
            svc.move_to(&key("mem:/a"), &key("alias:/a/b")).await,
            Err(ResourceError::Unsupported(_))
        ));

        // Same provider and path under another name is the same resource.
        svc.copy(&key("alias:/a/f"), &key("mem:/a/f")).await.unwrap();
        svc.move_to(&key("mem:/a/f?rev=2"), &key("alias:/a/f")).await.unwrap();
        assert_eq!(svc.read_to_string(&key("mem:/a/f")).await.unwrap(), "x");

        // A real rename across the alias still works.
        svc.move_to(&key("mem:/a/f"), &key("alias:/g")).await.unwrap();
        assert_eq!(svc.read_to_string(&key("mem:/g")).await.unwrap(), "x");
    }

    #[tokio::test]
    async fn test_copy_collect_all() {
        let svc = service();
        svc.mk_container(&key("mem:/dst"), false).await.unwrap();
        // Blocks both children: `a.txt` is a container and `sub` is a file.
        svc.mk_container(&key("mem:/dst/a.txt"), false).await.unwrap();
        svc.write_string(&key("mem:/dst/sub"), "in the way").await.unwrap();

        let fail_fast = svc.copy(&key("bundle:/tree"), &key("mem:/dst")).await;
        assert!(matches!(fail_fast, Err(ResourceError::Composite { .. })));

        let collected = svc
            .copy_with(&key("bundle:/tree"), &key("mem:/dst"), ErrorMode::CollectAll)
            .await;
        match collected {
            Err(ResourceError::Multiple(errors)) => assert_eq!(errors.len(), 2),
            other => panic!("expected multiple errors, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_move_same_provider_renames() {
        let svc = service();
        svc.write_string(&key("mem:/from"), "data").await.unwrap();
        svc.move_to(&key("mem:/from"), &key("mem:/to")).await.unwrap();

        assert!(!svc.exists(&key("mem:/from")).await.unwrap());
        assert_eq!(svc.read_to_string(&key("mem:/to")).await.unwrap(), "data");
    }

    #[tokio::test]
    async fn test_move_across_providers() {
        let svc = service();
        svc.mk_container(&key("mem:/dir"), false).await.unwrap();
        svc.write_string(&key("mem:/dir/f"), "data").await.unwrap();

        svc.move_to(&key("mem:/dir"), &key("other:/dir")).await.unwrap();

        assert!(!svc.exists(&key("mem:/dir")).await.unwrap());
        assert_eq!(svc.read_to_string(&key("other:/dir/f")).await.unwrap(), "data");
    }

    #[tokio::test]
    async fn test_move_from_read_only_keeps_copy_and_reports_delete() {
        let svc = service();
        let err = svc
            .move_to(&key("bundle:/tree/a.txt"), &key("mem:/a.txt"))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ResourceError::Composite { operation: "delete", .. }
        ));
        assert!(matches!(err.root_cause(), ResourceError::PermissionDenied(_)));
        assert!(svc.exists(&key("mem:/a.txt")).await.unwrap());
    }

    #[tokio::test]
    async fn test_append_or_replace() {
        let svc = service();
        let base = key("mem:/project/src");
        assert_eq!(
            svc.append_or_replace(&base, "other:/abs").unwrap(),
            key("other:/abs")
        );
        assert_eq!(
            svc.append_or_replace(&base, "main.rs").unwrap(),
            key("mem:/project/src/main.rs")
        );
        assert_eq!(
            svc.append_or_replace(&base, "../README").unwrap(),
            key("mem:/project/README")
        );
        assert_eq!(
            svc.append_or_replace(&base, "nfs:thing").unwrap(),
            key("mem:/project/src/nfs:thing")
        );
    }

    #[tokio::test]
    async fn test_watch_requires_capability() {
        let svc = service();
        assert!(matches!(
            svc.watch(&key("bundle:/tree")).await,
            Err(ResourceError::Unsupported(_))
        ));
        assert!(svc.watch(&key("mem:/")).await.is_ok());
    }

    #[tokio::test]
    async fn test_walk_via_service() {
        let svc = service();
        let files = svc
            .walk(&key("bundle:/tree"), &AllWalker, &FileMatcher)
            .await
            .unwrap();
        assert_eq!(
            files,
            vec![key("bundle:/tree/a.txt"), key("bundle:/tree/sub/b.txt")]
        );
    }

    #[test]
    fn test_parse_key_requires_registered_scheme() {
        let svc = service();
        assert!(svc.parse_key("mem:/x").is_ok());
        assert!(matches!(
            svc.parse_key("ftp:/x"),
            Err(ResourceError::UnknownScheme(_))
        ));
        assert!(svc.capabilities("bundle").unwrap().read_only);
    }
}
