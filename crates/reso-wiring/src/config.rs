//! Declarative provider wiring.
//!
//! ```toml
//! [[provider]]
//! scheme = "file"
//! kind = "local"
//! root = "/data"
//! read_only = false
//!
//! [[provider]]
//! scheme = "mem"
//! kind = "memory"
//!
//! [[provider]]
//! scheme = "archive"
//! kind = "archive"
//! root = "/opt/libs"
//!
//! [[provider]]
//! scheme = "tmp"
//! kind = "temp"
//! ```
//!
//! Relative roots in a file loaded with [`WiringConfig::load`] are resolved
//! against the file's directory.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use reso_api::{
    ArchiveProvider, LocalProvider, MemoryProvider, ResourceProvider, ResourceRegistry,
    ResourceService, TempProvider,
};
use serde::{Deserialize, Serialize};

use crate::builder::RegistryBuilder;
use crate::error::{WiringError, WiringResult};

/// One configured provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase", deny_unknown_fields)]
pub enum ProviderConfig {
    /// A directory on disk.
    Local {
        scheme: String,
        root: PathBuf,
        #[serde(default)]
        read_only: bool,
    },
    /// An empty in-memory tree.
    Memory { scheme: String },
    /// Zip archives below a directory.
    Archive { scheme: String, root: PathBuf },
    /// A private temporary directory.
    Temp { scheme: String },
}

impl ProviderConfig {
    pub fn scheme(&self) -> &str {
        match self {
            Self::Local { scheme, .. }
            | Self::Memory { scheme }
            | Self::Archive { scheme, .. }
            | Self::Temp { scheme } => scheme,
        }
    }

    /// Construct the provider. Relative roots are joined onto `base`.
    pub fn build(&self, base: Option<&Path>) -> WiringResult<Arc<dyn ResourceProvider>> {
        let resolve = |root: &Path| match base {
            Some(base) if root.is_relative() => base.join(root),
            _ => root.to_path_buf(),
        };
        let provider: Arc<dyn ResourceProvider> = match self {
            Self::Local {
                root, read_only, ..
            } => {
                let root = resolve(root);
                if *read_only {
                    Arc::new(LocalProvider::read_only(&root)?)
                } else {
                    Arc::new(LocalProvider::new(&root)?)
                }
            }
            Self::Memory { .. } => Arc::new(MemoryProvider::new()),
            Self::Archive { root, .. } => Arc::new(ArchiveProvider::new(resolve(root))?),
            Self::Temp { .. } => Arc::new(TempProvider::new()?),
        };
        tracing::debug!(scheme = %self.scheme(), "provider constructed");
        Ok(provider)
    }
}

/// Wiring file contents.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct WiringConfig {
    #[serde(default, rename = "provider")]
    pub providers: Vec<ProviderConfig>,

    /// Directory relative roots are resolved against.
    #[serde(skip)]
    pub base_dir: Option<PathBuf>,
}

impl WiringConfig {
    /// Parse wiring TOML.
    pub fn from_toml_str(text: &str) -> WiringResult<Self> {
        Ok(toml::from_str(text)?)
    }

    /// Read and parse a wiring file.
    pub fn load(path: impl AsRef<Path>) -> WiringResult<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| WiringError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let mut config = Self::from_toml_str(&text)?;
        config.base_dir = path.parent().map(Path::to_path_buf);
        tracing::info!(path = %path.display(), providers = config.providers.len(), "loaded wiring config");
        Ok(config)
    }

    /// Construct every provider, in file order.
    pub fn builder(&self) -> WiringResult<RegistryBuilder> {
        let mut builder = RegistryBuilder::new();
        for provider in &self.providers {
            builder.push(provider.scheme(), provider.build(self.base_dir.as_deref())?);
        }
        Ok(builder)
    }

    pub fn build_registry(&self) -> WiringResult<ResourceRegistry> {
        Ok(self.builder()?.build()?)
    }

    pub fn build_service(&self) -> WiringResult<ResourceService> {
        Ok(self.builder()?.build_service()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_all_kinds() {
        let config = WiringConfig::from_toml_str(
            r#"
            [[provider]]
            scheme = "file"
            kind = "local"
            root = "/data"

            [[provider]]
            scheme = "mem"
            kind = "memory"

            [[provider]]
            scheme = "archive"
            kind = "archive"
            root = "libs"

            [[provider]]
            scheme = "tmp"
            kind = "temp"
            "#,
        )
        .unwrap();

        assert_eq!(config.providers.len(), 4);
        assert_eq!(
            config.providers[0],
            ProviderConfig::Local {
                scheme: "file".into(),
                root: "/data".into(),
                read_only: false,
            }
        );
        let schemes: Vec<_> = config.providers.iter().map(ProviderConfig::scheme).collect();
        assert_eq!(schemes, vec!["file", "mem", "archive", "tmp"]);
    }

    #[test]
    fn test_empty_config() {
        let config = WiringConfig::from_toml_str("").unwrap();
        assert!(config.providers.is_empty());
        assert!(config.build_registry().unwrap().schemes().is_empty());
    }

    #[test]
    fn test_unknown_kind_fails_at_parse() {
        let result = WiringConfig::from_toml_str(
            r#"
            [[provider]]
            scheme = "s3"
            kind = "bucket"
            "#,
        );
        assert!(matches!(result, Err(WiringError::Parse(_))));
    }

    #[test]
    fn test_unknown_field_fails_at_parse() {
        let result = WiringConfig::from_toml_str(
            r#"
            [[provider]]
            scheme = "mem"
            kind = "memory"
            capacity = 10
            "#,
        );
        assert!(matches!(result, Err(WiringError::Parse(_))));
    }

    #[test]
    fn test_serialize_round_trip() {
        let config = WiringConfig {
            providers: vec![ProviderConfig::Memory {
                scheme: "mem".into(),
            }],
            base_dir: None,
        };
        let text = toml::to_string(&config).unwrap();
        assert_eq!(WiringConfig::from_toml_str(&text).unwrap(), config);
    }
}
