//! # reso-api
//!
//! Uniform resource access: name, resolve, read, write, list and watch data
//! on local disk, inside archives, in memory, bundled into the binary, or
//! behind any other scheme-specific backend.
//!
//! Key components:
//!
//! - [`ResourceKey`] - Qualified identifier (`scheme:path?q=v`)
//! - [`ResourceProvider`] - Capability contract implemented per backend
//! - [`ResourceRegistry`] - Routes schemes to providers
//! - [`ResourceService`] - Read/write/copy/move/walk facade
//!
//! ## Design Decisions
//!
//! - **Keys are values**: every join or resolve returns a new key, and `..`
//!   above the root is an error instead of being clamped.
//! - **Staged writes**: bytes written through a [`WriteHandle`] become
//!   visible only on commit, so copies are all-or-nothing.
//! - **No I/O under locks**: the registry clones a provider `Arc` out of its
//!   table before any operation runs, and watch events travel on their own
//!   channels.

pub mod error;
pub mod key;
pub mod provider;
pub mod providers;
pub mod registry;
pub mod service;
pub mod walk;
pub mod watch;

pub use error::{ErrorMode, ResourceError, ResourceResult};
pub use key::{KeyPath, ResourceKey, normalize};
pub use provider::{
    BoxWriteHandle, Capabilities, Listing, Metadata, ReadHandle, ResourceProvider, WriteHandle,
};
pub use providers::{ArchiveProvider, BundledProvider, LocalProvider, MemoryProvider, TempProvider};
pub use registry::{ResourceRegistry, SchemeInfo};
pub use service::ResourceService;
pub use walk::{
    AllMatcher, AllWalker, AndMatcher, ContainerMatcher, ExtensionsMatcher, FileMatcher, Matcher,
    MatcherExt, NoHiddenMatcher, NoHiddenWalker, NotMatcher, OrMatcher, PatternMatcher,
    WalkEntry, Walker,
};
pub use watch::{ChangeKind, ResourceChange, WatchHub, WatchRegistration, WatchSender};
