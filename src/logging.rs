//! Diagnostic logging setup.

use tracing_subscriber::{EnvFilter, fmt};

/// Environment variable holding the log filter directive.
pub const LOG_ENV: &str = "WARDEN_LOG";

const DEFAULT_FILTER: &str = "warn";

/// Initialize the global subscriber.
///
/// Logs go to stderr; stdout is reserved for hook output. Calling this
/// more than once is a no-op.
pub fn init() {
    let filter =
        EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));
    let _ = fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .try_init();
}
