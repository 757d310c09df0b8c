//! Wiring error types.

use std::io;
use std::path::PathBuf;

use reso_api::ResourceError;
use thiserror::Error;

/// Errors from building a registry out of configuration.
#[derive(Error, Debug)]
pub enum WiringError {
    /// The config file could not be read.
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The config text is not valid.
    #[error("invalid wiring config: {0}")]
    Parse(#[from] toml::de::Error),

    /// A provider could not be constructed or registered.
    #[error(transparent)]
    Resource(#[from] ResourceError),

    /// A global tracing subscriber is already installed.
    #[error("tracing already initialized: {0}")]
    Telemetry(#[from] tracing_subscriber::util::TryInitError),
}

/// Result type for wiring operations.
pub type WiringResult<T> = Result<T, WiringError>;

impl WiringError {
    /// The underlying resource error, if this is one.
    pub fn as_resource(&self) -> Option<&ResourceError> {
        match self {
            Self::Resource(e) => Some(e),
            _ => None,
        }
    }
}
