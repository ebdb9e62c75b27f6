use tracing_subscriber::EnvFilter;

/// Installs a global fmt subscriber writing to stderr.
///
/// `RUST_LOG` takes precedence over `level`. Returns `false` if a subscriber
/// was already installed, which is not an error.
pub fn init_logging(level: &str) -> bool {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init()
        .is_ok()
}
