//! Logging configuration for dman.
//!
//! Diagnostics go to stderr so that stdout carries nothing but the JSON
//! payload of a command.

use tracing_subscriber::EnvFilter;

/// Filter used when `RUST_LOG` is unset and `--verbose` is off.
pub const DEFAULT_LEVEL: &str = "warn";

/// Filter used when `RUST_LOG` is unset and `--verbose` is on.
pub const VERBOSE_LEVEL: &str = "debug";

/// Returns the default filter directive for the given verbosity.
pub fn default_level(verbose: bool) -> &'static str {
    if verbose {
        VERBOSE_LEVEL
    } else {
        DEFAULT_LEVEL
    }
}

/// Builds the filter from `RUST_LOG`, falling back to `default_level`.
fn build_filter(default_level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level))
}

/// Initializes logging to stderr.
///
/// Must be called at most once per process.
pub fn init_stderr_logging(default_level: &str) {
    tracing_subscriber::fmt()
        .with_env_filter(build_filter(default_level))
        .with_writer(std::io::stderr)
        .init();
}
