//! tracing subscriber setup

use tracing_subscriber::EnvFilter;

/// Install a stderr subscriber filtered by `filter`.
///
/// Falls back to `info` when the directive does not parse. Calling this more
/// than once is harmless; later calls leave the first subscriber in place.
pub fn init(filter: &str) {
    let filter = EnvFilter::try_new(filter).unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .with_target(false)
        .try_init();
}
