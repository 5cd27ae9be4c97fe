use tracing_subscriber::EnvFilter;

/// `RUST_LOG` if set, else `debug` with `--verbose`, else the configured level.
pub fn filter(log_level: &str, verbose: bool) -> EnvFilter {
    if let Ok(filter) = EnvFilter::try_from_default_env() {
        return filter;
    }
    let level = if verbose { "debug" } else { log_level };
    EnvFilter::try_new(level).unwrap_or_else(|_| EnvFilter::new("info"))
}

/// Install the global subscriber. Logs go to stderr so stdout stays clean.
/// Returns `false` when a subscriber was already installed, which is then kept.
pub fn init(log_level: &str, verbose: bool) -> bool {
    let installed = tracing_subscriber::fmt()
        .with_env_filter(filter(log_level, verbose))
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
    if let Err(e) = installed {
        tracing::debug!("Keeping existing log subscriber: {e}");
        return false;
    }
    true
}
