//! Built-in provider implementations.

mod archive;
mod bundled;
mod local;
mod memory;
mod temp;

pub use archive::{ARCHIVE_SEPARATOR, ArchiveProvider};
pub use bundled::BundledProvider;
pub use local::LocalProvider;
pub use memory::MemoryProvider;
pub use temp::TempProvider;

use futures::stream::{self, StreamExt};

use crate::error::ResourceResult;
use crate::key::ResourceKey;
use crate::provider::Listing;

/// Build a listing from child names, sorted by name, under `parent`.
pub(crate) fn sorted_listing(parent: &ResourceKey, mut names: Vec<String>) -> Listing {
    names.sort();
    names.dedup();
    let parent = parent.clone();
    stream::iter(names)
        .map(move |name| parent.join_segment(&name))
        .boxed()
}

/// Defer `list_names` until the listing is first polled.
pub(crate) fn lazy_listing<F, Fut>(parent: &ResourceKey, list_names: F) -> Listing
where
    F: FnOnce() -> Fut + Send + 'static,
    Fut: std::future::Future<Output = ResourceResult<Vec<String>>> + Send + 'static,
{
    let parent = parent.clone();
    stream::once(async move { list_names().await })
        .flat_map(move |names| match names {
            Ok(names) => sorted_listing(&parent, names),
            Err(e) => stream::iter(vec![Err(e)]).boxed(),
        })
        .boxed()
}
