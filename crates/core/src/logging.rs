//! Logging initialization.

use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Default filter used when `RUST_LOG` is unset.
pub const DEFAULT_FILTER: &str = "info,gpuframe=debug,naga=warn";

/// Initialize the logging system with tracing.
///
/// Filtering comes from `RUST_LOG`, falling back to [`DEFAULT_FILTER`].
/// Calling this twice is harmless; the second subscriber is rejected
/// and the call returns `false`.
///
/// # Example
/// ```
/// gpuframe_core::init_logging();
/// tracing::info!("Renderer initialized");
/// ```
pub fn init_logging() -> bool {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(true).with_thread_ids(true))
        .try_init()
        .is_ok()
}
