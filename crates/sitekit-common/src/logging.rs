//! Tracing initialization

use tracing_subscriber::EnvFilter;

/// Initialize the global tracing subscriber for the binary.
///
/// `RUST_LOG` takes precedence; otherwise the default level is `info`, or
/// `debug` when `verbose` is set.
pub fn init_tracing(verbose: bool) {
    let default_directive = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}
