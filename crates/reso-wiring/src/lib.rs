//! # reso-wiring
//!
//! Plain composition for reso: construct providers, hand them to a fresh
//! registry, and wrap it in a service. No container, no global state; each
//! call builds an independent registry.
//!
//! ```no_run
//! use reso_wiring::WiringConfig;
//!
//! # fn main() -> Result<(), reso_wiring::WiringError> {
//! reso_wiring::init_tracing("info")?;
//! let service = WiringConfig::load("reso.toml")?.build_service()?;
//! # let _ = service;
//! # Ok(())
//! # }
//! ```

mod builder;
mod config;
mod error;
mod telemetry;

pub use builder::RegistryBuilder;
pub use config::{ProviderConfig, WiringConfig};
pub use error::{WiringError, WiringResult};
pub use telemetry::{env_filter, init_test_tracing, init_tracing};
