//! Diagnostic logging setup.

use tracing_subscriber::EnvFilter;

use crate::domain::config::LogConfig;

/// Install the global `tracing` subscriber, writing to stderr.
///
/// The filter comes from `level` (the `--log-level` flag), then `RUST_LOG`,
/// then `config.level`. A second call is a no-op.
pub fn init(level: Option<&str>, config: &LogConfig) {
    let filter = level
        .and_then(|l| EnvFilter::try_new(l).ok())
        .or_else(|| EnvFilter::try_from_default_env().ok())
        .or_else(|| EnvFilter::try_new(&config.level).ok())
        .unwrap_or_else(|| EnvFilter::new("info"));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false);

    let _ = match config.format.as_str() {
        "json" => builder.json().try_init(),
        "compact" => builder.compact().try_init(),
        _ => builder.pretty().try_init(),
    };
}
