//! Structured logging.
//!
//! The library only emits `tracing` events; installing a subscriber is left to
//! the host. Binaries call [`init_logging`].

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Install a `fmt` subscriber filtered by `RUST_LOG`, falling back to `default_level`.
///
/// Returns `false` if a global subscriber was already installed.
pub fn init_logging(default_level: &str) -> bool {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| format!("connection_sentinel={0},sentinel_cli={0}", default_level).into());

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .try_init()
        .is_ok()
}
