//! Scheme → provider registry.
//!
//! Resolution is pure dispatch: the provider is looked up under a read lock,
//! its `Arc` is cloned out, and the lock is released before any I/O happens.

use std::collections::BTreeMap;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::error::{ResourceError, ResourceResult};
use crate::key::ResourceKey;
use crate::provider::{Capabilities, ResourceProvider};

/// Information about a registered scheme.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemeInfo {
    /// The scheme, lowercase.
    pub scheme: String,
    /// Capabilities declared by its provider.
    pub capabilities: Capabilities,
}

/// Maps schemes to providers.
///
/// At most one provider is registered per scheme. Registering a scheme that
/// is taken fails with `DuplicateScheme`; to swap providers, `unregister`
/// first. Handles opened through a removed provider stay usable until they
/// are dropped because they hold their own references.
pub struct ResourceRegistry {
    providers: RwLock<BTreeMap<String, Arc<dyn ResourceProvider>>>,
}

impl std::fmt::Debug for ResourceRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResourceRegistry")
            .field("schemes", &self.schemes())
            .finish()
    }
}

impl Default for ResourceRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ResourceRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            providers: RwLock::new(BTreeMap::new()),
        }
    }

    /// Register a provider for `scheme`.
    pub fn register(
        &self,
        scheme: &str,
        provider: impl ResourceProvider + 'static,
    ) -> ResourceResult<()> {
        self.register_arc(scheme, Arc::new(provider))
    }

    /// Register a provider (already wrapped in Arc) for `scheme`.
    pub fn register_arc(
        &self,
        scheme: &str,
        provider: Arc<dyn ResourceProvider>,
    ) -> ResourceResult<()> {
        let scheme = normalize_scheme(scheme)?;
        let mut providers = self.providers.write();
        if providers.contains_key(&scheme) {
            return Err(ResourceError::DuplicateScheme(scheme));
        }
        tracing::info!(scheme = %scheme, capabilities = ?provider.capabilities(), "registered provider");
        providers.insert(scheme, provider);
        Ok(())
    }

    /// Remove the provider for `scheme`, returning it if there was one.
    pub fn unregister(&self, scheme: &str) -> Option<Arc<dyn ResourceProvider>> {
        let scheme = scheme.to_ascii_lowercase();
        let removed = self.providers.write().remove(&scheme);
        if removed.is_some() {
            tracing::info!(scheme = %scheme, "unregistered provider");
        }
        removed
    }

    /// Look up the provider for `scheme`.
    pub fn lookup(&self, scheme: &str) -> ResourceResult<Arc<dyn ResourceProvider>> {
        let scheme = scheme.to_ascii_lowercase();
        self.providers
            .read()
            .get(&scheme)
            .cloned()
            .ok_or(ResourceError::UnknownScheme(scheme))
    }

    /// Resolve the provider responsible for `key`. Performs no I/O.
    pub fn resolve(&self, key: &ResourceKey) -> ResourceResult<Arc<dyn ResourceProvider>> {
        self.lookup(key.scheme())
    }

    /// Returns true if `scheme` has a provider.
    pub fn contains(&self, scheme: &str) -> bool {
        self.providers
            .read()
            .contains_key(&scheme.to_ascii_lowercase())
    }

    /// Registered schemes in order.
    pub fn schemes(&self) -> Vec<String> {
        self.providers.read().keys().cloned().collect()
    }

    /// Registered schemes with their capabilities.
    pub fn list_schemes(&self) -> Vec<SchemeInfo> {
        self.providers
            .read()
            .iter()
            .map(|(scheme, provider)| SchemeInfo {
                scheme: scheme.clone(),
                capabilities: provider.capabilities(),
            })
            .collect()
    }
}

fn normalize_scheme(scheme: &str) -> ResourceResult<String> {
    // Reuse key parsing so registry schemes follow the same grammar.
    ResourceKey::new(scheme, Default::default()).map(|k| k.scheme().to_string())
}
