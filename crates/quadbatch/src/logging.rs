//! Logger setup.
//!
//! The crate logs through the [`log`] facade. Call [`init_logger`] once at
//! startup to send those records to stderr via `env_logger`; the filter comes
//! from `RUST_LOG` and defaults to `info`.

/// Install `env_logger` as the global logger.
///
/// Safe to call more than once: if a logger is already installed we warn and
/// keep the existing one.
pub fn init_logger() {
    let result = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .try_init();

    if result.is_err() {
        log::warn!("a logger is already installed; keeping it");
    }
}
