//! Structured logging setup.
//!
//! The library only emits `tracing` events; binaries and tests decide
//! whether anything is listening.

use tracing_subscriber::EnvFilter;

/// Default filter when `RUST_LOG` is unset.
pub const DEFAULT_FILTER: &str = "sanetree=info";

/// Initialize structured logging with `RUST_LOG` environment variable support.
///
/// Falls back to `default_filter` (or [`DEFAULT_FILTER`]) when `RUST_LOG` is
/// not set. Logs go to stderr so command output on stdout stays clean.
/// Subsequent calls are silently ignored by `tracing_subscriber`.
pub fn init_logging(default_filter: Option<&str>) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_filter.unwrap_or(DEFAULT_FILTER)));

    // try_init so double-init in tests doesn't panic
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .try_init();
}
