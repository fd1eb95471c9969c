//! Tracing subscriber bootstrap.

use tracing_subscriber::EnvFilter;

/// Installs a formatted `tracing` subscriber for the process.
///
/// `RUST_LOG` takes precedence over `default_directive`. Returns false if a
/// global subscriber was already installed, which makes the call safe from
/// every test.
pub fn try_init(default_directive: &str) -> bool {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directive));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .with_test_writer()
        .try_init()
        .is_ok()
}
