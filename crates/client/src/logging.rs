//! Logging setup for binaries embedding the client.

use tracing_subscriber::EnvFilter;

/// Install a formatted `tracing` subscriber.
///
/// Filtering comes from `RUST_LOG` when set, otherwise `info`. Safe to call
/// more than once; later calls are no-ops.
pub fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}
