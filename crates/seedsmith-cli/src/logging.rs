use tracing_subscriber::prelude::*;
use tracing_subscriber::EnvFilter;

/// Initialize the process-wide subscriber: RUST_LOG wins, otherwise the
/// verbosity flag picks the level. Output goes to stderr so command
/// output stays clean on stdout.
pub fn init(verbose: bool) {
    let fallback = if verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback));

    let layer = tracing_subscriber::fmt::layer()
        .with_target(false)
        .with_writer(std::io::stderr);

    let _ = tracing_subscriber::registry().with(filter).with(layer).try_init();
}
