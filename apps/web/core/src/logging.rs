//! Logger initialization for hosts that embed the synchronizer.

/// Initializes `env_logger`, respecting `RUST_LOG` (default: info).
///
/// Safe to call more than once; later calls are ignored.
pub fn init() {
    let result = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .try_init();

    if result.is_ok() {
        log::debug!("Logging initialized");
    }
}
