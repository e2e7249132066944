//! Logging infrastructure for nkdl.
//!
//! Everything logs through `tracing`. The binary installs one subscriber at
//! startup: stderr always, plus a log file when `logging.file` is set.
//!
//! # Example
//!
//! ```no_run
//! use nkdl_core::logging::{init_tracing, LogLevel};
//!
//! // Hold the guard until exit so buffered file output is flushed.
//! let _guard = init_tracing(LogLevel::Info, None);
//! tracing::info!("Submitting");
//! ```

mod types;

pub use types::LogLevel;

use std::path::Path;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Initialize global tracing subscriber for application-wide logging.
///
/// This sets up a subscriber that:
/// - Respects RUST_LOG environment variable
/// - Falls back to the provided default level
/// - Outputs to stderr, and to `log_file` when given
///
/// Should be called once at application startup. The returned guard flushes
/// the file writer when dropped.
pub fn init_tracing(default_level: LogLevel, log_file: Option<&Path>) -> Option<WorkerGuard> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level_to_filter_str(default_level)));

    let stderr_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_thread_ids(false);

    let (file_layer, guard) = match log_file.and_then(open_appender) {
        Some((appender, guard)) => (
            Some(fmt::layer().with_writer(appender).with_ansi(false)),
            Some(guard),
        ),
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(stderr_layer)
        .with(file_layer)
        .init();

    guard
}

fn open_appender(
    path: &Path,
) -> Option<(tracing_appender::non_blocking::NonBlocking, WorkerGuard)> {
    let directory = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let file_name = path.file_name()?;
    if let Err(e) = std::fs::create_dir_all(directory) {
        eprintln!("Cannot create log directory {}: {}", directory.display(), e);
        return None;
    }
    let appender = tracing_appender::rolling::never(directory, file_name);
    Some(tracing_appender::non_blocking(appender))
}

/// Initialize tracing for tests (only logs warnings and above).
#[cfg(test)]
pub fn init_test_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("warn")
        .with_test_writer()
        .try_init();
}

/// Convert LogLevel to filter string.
fn level_to_filter_str(level: LogLevel) -> &'static str {
    match level {
        LogLevel::Trace => "trace",
        LogLevel::Debug => "debug",
        LogLevel::Info => "info",
        LogLevel::Warn => "warn",
        LogLevel::Error => "error",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn level_to_filter_works() {
        assert_eq!(level_to_filter_str(LogLevel::Debug), "debug");
        assert_eq!(level_to_filter_str(LogLevel::Info), "info");
    }

    #[test]
    fn appender_needs_a_file_name() {
        assert!(open_appender(Path::new("/")).is_none());
    }
}
