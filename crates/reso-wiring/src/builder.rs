//! Registry construction from `(scheme, provider)` pairs.

use std::sync::Arc;

use reso_api::{ResourceProvider, ResourceRegistry, ResourceResult, ResourceService};

/// Collects providers and registers them all at once.
///
/// Conflicts surface at [`RegistryBuilder::build`]: the first scheme that
/// is listed twice fails with `DuplicateScheme`.
#[derive(Default)]
pub struct RegistryBuilder {
    entries: Vec<(String, Arc<dyn ResourceProvider>)>,
}

impl std::fmt::Debug for RegistryBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let schemes: Vec<&str> = self.entries.iter().map(|(s, _)| s.as_str()).collect();
        f.debug_struct("RegistryBuilder")
            .field("schemes", &schemes)
            .finish()
    }
}

impl RegistryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from existing pairs.
    pub fn from_pairs<I, S>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (S, Arc<dyn ResourceProvider>)>,
        S: Into<String>,
    {
        Self {
            entries: pairs.into_iter().map(|(s, p)| (s.into(), p)).collect(),
        }
    }

    /// Add a provider.
    pub fn with(self, scheme: impl Into<String>, provider: impl ResourceProvider + 'static) -> Self {
        self.with_arc(scheme, Arc::new(provider))
    }

    /// Add a shared provider.
    pub fn with_arc(mut self, scheme: impl Into<String>, provider: Arc<dyn ResourceProvider>) -> Self {
        self.push(scheme, provider);
        self
    }

    pub fn push(&mut self, scheme: impl Into<String>, provider: Arc<dyn ResourceProvider>) {
        self.entries.push((scheme.into(), provider));
    }

    /// Number of pending providers.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Register everything in a fresh registry.
    pub fn build(self) -> ResourceResult<ResourceRegistry> {
        let registry = ResourceRegistry::new();
        for (scheme, provider) in self.entries {
            registry.register_arc(&scheme, provider)?;
        }
        tracing::info!(schemes = ?registry.schemes(), "registry built");
        Ok(registry)
    }

    /// Register everything and wrap the registry in a service.
    pub fn build_service(self) -> ResourceResult<ResourceService> {
        Ok(ResourceService::new(Arc::new(self.build()?)))
    }
}
