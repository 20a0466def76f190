//! Logging initialization and utilities

/// Default filter used when `RUST_LOG` is not set
pub const DEFAULT_FILTER: &str = "info";

/// Initialize the logging system
///
/// Uses env_logger with default filter level of `info`.
/// Override with RUST_LOG environment variable.
///
/// # Example
/// ```
/// scenehost::core::logging::init();
/// log::info!("Host started");
/// ```
pub fn init() {
    init_with_filter(DEFAULT_FILTER);
}

/// Initialize logging with an explicit default filter.
///
/// Safe to call more than once; only the first call installs the logger.
pub fn init_with_filter(filter: &str) {
    // Err only means a logger is already installed
    let _ = env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or(filter)
    ).try_init();
}
