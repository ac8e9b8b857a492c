//! Logging initialization for collection drivers.
//!
//! stdout stays reserved for collected payloads; all log output goes to
//! stderr. Filtering follows `RUST_LOG` when set.

use tracing_subscriber::{fmt, EnvFilter};

/// Initialize logging with an `info` default level.
pub fn init() {
    init_with_filter("info");
}

/// Initialize logging with an explicit default filter directive.
///
/// Safe to call more than once; later calls are no-ops, which keeps test
/// binaries from fighting over the global subscriber.
pub fn init_with_filter(default_directive: &str) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive));

    let _ = fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_double_init_is_harmless() {
        init();
        init_with_filter("debug");
    }
}
