use tracing_subscriber::EnvFilter;

const VERBOSE_FILTER: &str = "larder=debug,larder_core=debug";

/// Install the stderr subscriber. `RUST_LOG` wins when set; otherwise only
/// warnings are shown, or debug output for our crates with `--verbose`.
pub fn init(verbose: bool) {
    let default = if verbose { VERBOSE_FILTER } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    // Ignore the error if a subscriber is already installed.
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}
