//! Tracing setup for the CLI
//!
//! Logs go to stderr so they never mix with remote command output. `RUST_LOG`
//! overrides the level chosen by `--verbose`.

use tracing_subscriber::EnvFilter;

pub fn init_tracing(verbose: bool) {
    let default = if verbose { "info" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default)),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}
