//! Process-wide `tracing` subscriber installation.
//!
//! The crate itself never installs a subscriber on behalf of its embedder —
//! libraries should emit `tracing` events and let the binary decide how to
//! render them. [`init_test_logging`] is the one exception: a convenience
//! used only from `#[cfg(test)]` so test output is readable without every
//! test module repeating subscriber boilerplate.

use once_cell::sync::OnceCell;

static TEST_LOGGING: OnceCell<()> = OnceCell::new();

/// Install a best-effort `tracing` subscriber for test binaries.
///
/// Safe to call from many tests concurrently; only the first call takes
/// effect. Honors `RUST_LOG` via `EnvFilter`, defaulting to `info`.
#[cfg(test)]
pub fn init_test_logging() {
    TEST_LOGGING.get_or_init(|| {
        let filter = tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .try_init();
    });
}
