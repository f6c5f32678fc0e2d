//! Tracing subscriber setup.
//!
//! Filtering follows the `DOCRANK_LOG` environment variable using
//! `EnvFilter` directive syntax (e.g. `docrank=debug,docrank_core=info`),
//! defaulting to `info`. Output goes to stderr so formatted tool text on
//! stdout stays clean.

use tracing_subscriber::EnvFilter;

/// Environment variable holding the filter directives.
pub const LOG_ENV: &str = "DOCRANK_LOG";

fn env_filter() -> EnvFilter {
    EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("info"))
}

/// Install the global subscriber. Panics if one is already installed.
pub fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(env_filter())
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();
}

/// Install the global subscriber unless one is already set.
///
/// Returns `false` when another subscriber was installed first.
pub fn try_init_tracing() -> bool {
    tracing_subscriber::fmt()
        .with_env_filter(env_filter())
        .with_target(true)
        .with_writer(std::io::stderr)
        .try_init()
        .is_ok()
}

/// Subscriber with an explicit filter string, for tests.
pub fn try_init_tracing_with_filter(filter: &str) -> bool {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .with_test_writer()
        .try_init()
        .is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_second_init_is_rejected() {
        let _ = try_init_tracing_with_filter("docrank=debug");
        assert!(!try_init_tracing());
    }
}
