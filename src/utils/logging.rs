use tracing_subscriber::EnvFilter;

use crate::config::LogSettings;

/// Maps a configured level name onto a `tracing` level; unknown names mean `info`.
pub fn parse_level(name: &str) -> tracing::Level {
    match name.to_lowercase().as_str() {
        "error" => tracing::Level::ERROR,
        "warn" | "warning" => tracing::Level::WARN,
        "debug" => tracing::Level::DEBUG,
        "trace" => tracing::Level::TRACE,
        _ => tracing::Level::INFO,
    }
}

/// Installs the global fmt subscriber.
///
/// `RUST_LOG` wins over the configured level when set. Uses `try_init`, so
/// tests and embedders may call this more than once.
pub fn init(settings: &LogSettings) {
    let level = parse_level(&settings.level);
    let filter = EnvFilter::builder()
        .with_default_directive(level.into())
        .from_env_lossy();

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init();
}
