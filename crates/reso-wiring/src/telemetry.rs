//! Tracing subscriber setup.

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use crate::error::WiringResult;

/// Filter from `RUST_LOG`, falling back to `default_directive`.
pub fn env_filter(default_directive: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directive))
}

/// Install the global subscriber: env filter plus a stderr fmt layer.
///
/// Fails if a global subscriber is already set.
pub fn init_tracing(default_directive: &str) -> WiringResult<()> {
    tracing_subscriber::registry()
        .with(env_filter(default_directive))
        .with(fmt::layer().with_writer(std::io::stderr))
        .try_init()?;
    Ok(())
}

/// Route logs through the test harness's captured output. Safe to call
/// from every test.
pub fn init_test_tracing() {
    let _ = tracing_subscriber::registry()
        .with(env_filter("debug"))
        .with(fmt::layer().with_test_writer())
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_test_tracing_is_idempotent() {
        init_test_tracing();
        init_test_tracing();
        tracing::debug!("still logging");
    }

    #[test]
    fn test_second_global_init_fails() {
        init_test_tracing();
        assert!(init_tracing("info").is_err());
    }
}
