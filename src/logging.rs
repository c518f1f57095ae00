//! Sets up the `tracing` subscriber for the binary.

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::{SubscriberInitExt, TryInitError};
use tracing_subscriber::EnvFilter;

/// Installs a global subscriber that writes to stderr, so command output on
/// stdout stays clean. `RUST_LOG` takes precedence over `default_filter`,
/// which is usually the configured log level.
pub fn init(default_filter: &str) -> Result<(), TryInitError> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_filter))
        .unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .try_init()
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_second_init_fails() {
        // Only one global subscriber can be installed per process.
        let _ = init("debug");
        assert!(init("debug").is_err());
    }
}
