//! Telemetry helpers for structured logging and tracing.

use tracing_subscriber::EnvFilter;

/// Install a default env-based subscriber if none is set yet.
///
/// Falls back to `default_directive` (e.g. `"info"`) when `RUST_LOG` is
/// unset or unparsable. Logs go to stderr so they never mix with a session
/// running on stdout. Callers that install their own subscriber first are
/// left alone.
pub fn init_tracing_with_default(default_directive: &str) {
    if tracing::dispatcher::has_been_set() {
        return;
    }
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_thread_names(true)
        .with_writer(std::io::stderr)
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_is_idempotent() {
        init_tracing_with_default("debug");
        assert!(tracing::dispatcher::has_been_set());
        // Second call is a no-op.
        init_tracing_with_default("off");
    }
}
