//! Diagnostic stream setup.
//!
//! The agent lives inside someone else's process, so diagnostics go to stderr
//! and stay quiet unless asked for: `ABRT_JAVA_LOG=debug` shows the verbose
//! decision trace, `info` shows one line per observed exception.

use tracing_subscriber::EnvFilter;

/// Environment variable holding the diagnostic filter directive.
pub const LOG_ENV: &str = "ABRT_JAVA_LOG";

const DEFAULT_DIRECTIVE: &str = "warn";

/// Installs the stderr subscriber. Safe to call more than once.
pub fn init() {
    init_with_default(DEFAULT_DIRECTIVE);
}

/// Installs the stderr subscriber, using `default` when [`LOG_ENV`] is unset.
pub fn init_with_default(default: &str) {
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new(default));

    // Another copy of the agent (or the host) may already own the global subscriber.
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}
