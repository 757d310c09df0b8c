//! Hierarchical walking with walkers and matchers.
//!
//! A [`Walker`] decides which containers a walk descends into; a [`Matcher`]
//! decides which visited resources end up in the result. Both see a
//! [`WalkEntry`] carrying the key, its metadata, and its path relative to
//! the walk root.

use std::collections::HashSet;
use std::sync::Arc;

use futures::TryStreamExt;
use regex::Regex;

use crate::error::ResourceResult;
use crate::key::ResourceKey;
use crate::provider::{Metadata, ResourceProvider};

/// A resource visited during a walk.
#[derive(Debug, Clone)]
pub struct WalkEntry<'a> {
    key: &'a ResourceKey,
    root: &'a ResourceKey,
    metadata: &'a Metadata,
}

impl<'a> WalkEntry<'a> {
    pub fn new(key: &'a ResourceKey, root: &'a ResourceKey, metadata: &'a Metadata) -> Self {
        Self {
            key,
            root,
            metadata,
        }
    }

    pub fn key(&self) -> &ResourceKey {
        self.key
    }

    pub fn root(&self) -> &ResourceKey {
        self.root
    }

    pub fn metadata(&self) -> &Metadata {
        self.metadata
    }

    pub fn is_container(&self) -> bool {
        self.metadata.is_container
    }

    /// Path below the walk root as `a/b/c`.
    pub fn relative_path(&self) -> String {
        self.key
            .path()
            .relative_to(self.root.path())
            .unwrap_or_default()
    }

    /// Segments below the walk root.
    pub fn relative_segments(&self) -> &[String] {
        self.key
            .path()
            .strip_prefix(self.root.path())
            .unwrap_or_default()
    }
}

/// Decides whether a walk descends into a container.
pub trait Walker: Send + Sync {
    fn descend(&self, container: &WalkEntry<'_>) -> bool;
}

/// Decides whether a visited resource is part of the result.
pub trait Matcher: Send + Sync {
    fn matches(&self, entry: &WalkEntry<'_>) -> bool;
}

impl<M: Matcher + ?Sized> Matcher for Box<M> {
    fn matches(&self, entry: &WalkEntry<'_>) -> bool {
        (**self).matches(entry)
    }
}

impl<M: Matcher + ?Sized> Matcher for Arc<M> {
    fn matches(&self, entry: &WalkEntry<'_>) -> bool {
        (**self).matches(entry)
    }
}

impl<W: Walker + ?Sized> Walker for Box<W> {
    fn descend(&self, container: &WalkEntry<'_>) -> bool {
        (**self).descend(container)
    }
}

/// Descends into every container.
#[derive(Debug, Clone, Copy, Default)]
pub struct AllWalker;

impl Walker for AllWalker {
    fn descend(&self, _container: &WalkEntry<'_>) -> bool {
        true
    }
}

/// Skips containers whose name starts with `.`.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoHiddenWalker;

impl Walker for NoHiddenWalker {
    fn descend(&self, container: &WalkEntry<'_>) -> bool {
        !container.key().leaf().is_some_and(is_hidden)
    }
}

fn is_hidden(segment: &str) -> bool {
    segment.starts_with('.')
}

/// Matches everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct AllMatcher;

impl Matcher for AllMatcher {
    fn matches(&self, _entry: &WalkEntry<'_>) -> bool {
        true
    }
}

/// Matches resources that are not containers.
#[derive(Debug, Clone, Copy, Default)]
pub struct FileMatcher;

impl Matcher for FileMatcher {
    fn matches(&self, entry: &WalkEntry<'_>) -> bool {
        !entry.is_container()
    }
}

/// Matches containers.
#[derive(Debug, Clone, Copy, Default)]
pub struct ContainerMatcher;

impl Matcher for ContainerMatcher {
    fn matches(&self, entry: &WalkEntry<'_>) -> bool {
        entry.is_container()
    }
}

/// Matches when the leaf's extension is one of a set (without the dot).
#[derive(Debug, Clone, Default)]
pub struct ExtensionsMatcher {
    extensions: HashSet<String>,
}

impl ExtensionsMatcher {
    pub fn new<I, S>(extensions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            extensions: extensions.into_iter().map(Into::into).collect(),
        }
    }
}

impl Matcher for ExtensionsMatcher {
    fn matches(&self, entry: &WalkEntry<'_>) -> bool {
        entry
            .key()
            .path()
            .leaf_extension()
            .is_some_and(|ext| self.extensions.contains(ext))
    }
}

/// Rejects anything with a hidden segment below the walk root.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoHiddenMatcher;

impl Matcher for NoHiddenMatcher {
    fn matches(&self, entry: &WalkEntry<'_>) -> bool {
        !entry.relative_segments().iter().any(|s| is_hidden(s))
    }
}

/// Matches a regex against the path relative to the walk root (`a/b.txt`).
#[derive(Debug, Clone)]
pub struct PatternMatcher {
    pattern: Regex,
}

impl PatternMatcher {
    pub fn new(pattern: &str) -> Result<Self, regex::Error> {
        Ok(Self {
            pattern: Regex::new(pattern)?,
        })
    }
}

impl Matcher for PatternMatcher {
    fn matches(&self, entry: &WalkEntry<'_>) -> bool {
        self.pattern.is_match(&entry.relative_path())
    }
}

#[derive(Debug, Clone)]
pub struct AndMatcher<A, B>(A, B);

impl<A: Matcher, B: Matcher> Matcher for AndMatcher<A, B> {
    fn matches(&self, entry: &WalkEntry<'_>) -> bool {
        self.0.matches(entry) && self.1.matches(entry)
    }
}

#[derive(Debug, Clone)]
pub struct OrMatcher<A, B>(A, B);

impl<A: Matcher, B: Matcher> Matcher for OrMatcher<A, B> {
    fn matches(&self, entry: &WalkEntry<'_>) -> bool {
        self.0.matches(entry) || self.1.matches(entry)
    }
}

#[derive(Debug, Clone)]
pub struct NotMatcher<A>(A);

impl<A: Matcher> Matcher for NotMatcher<A> {
    fn matches(&self, entry: &WalkEntry<'_>) -> bool {
        !self.0.matches(entry)
    }
}

/// Combinators for matchers.
pub trait MatcherExt: Matcher + Sized {
    fn and<B: Matcher>(self, other: B) -> AndMatcher<Self, B> {
        AndMatcher(self, other)
    }

    fn or<B: Matcher>(self, other: B) -> OrMatcher<Self, B> {
        OrMatcher(self, other)
    }

    fn not(self) -> NotMatcher<Self> {
        NotMatcher(self)
    }
}

impl<M: Matcher> MatcherExt for M {}

/// Walk everything below `root` depth-first, children in provider order.
///
/// The root itself is not part of the result. The first error stops the
/// walk.
pub async fn walk(
    provider: &dyn ResourceProvider,
    root: &ResourceKey,
    walker: &dyn Walker,
    matcher: &dyn Matcher,
) -> ResourceResult<Vec<ResourceKey>> {
    let mut found = Vec::new();
    let mut pending: Vec<ResourceKey> = provider.list(root).await?.try_collect().await?;
    pending.reverse();

    while let Some(key) = pending.pop() {
        let metadata = provider.metadata(&key).await?;
        if !metadata.exists {
            // Removed between listing and visiting.
            continue;
        }
        let entry = WalkEntry::new(&key, root, &metadata);
        let descend = metadata.is_container && walker.descend(&entry);
        if matcher.matches(&entry) {
            found.push(key.clone());
        }
        if descend {
            let children: Vec<ResourceKey> = provider.list(&key).await?.try_collect().await?;
            pending.extend(children.into_iter().rev());
        }
    }

    tracing::debug!(root = %root, count = found.len(), "walk finished");
    Ok(found)
}
