//! Tracing setup: console on stderr, plus a daily-rotated file.
//!
//! Each output has its own level from the config. `RUST_LOG` overrides the
//! console level only.

use std::path::Path;

use tracing_appender::non_blocking::{NonBlocking, WorkerGuard};
use tracing_subscriber::{EnvFilter, Layer, fmt, layer::SubscriberExt, util::SubscriberInitExt};
use yacu::options::LoggingOptions;

const LOG_FILE: &str = "yacu.log";

/// Install the global subscriber.
///
/// Returns the file writer guard, which must be kept alive for buffered
/// lines to reach the file.
pub fn init_logging(options: &LoggingOptions) -> Option<WorkerGuard> {
    let console_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&options.console.level))
        .unwrap_or_else(|_| EnvFilter::new("info"));
    let console = fmt::layer()
        .with_writer(std::io::stderr)
        .with_filter(console_filter);

    let (file, guard, file_error) = match file_writer(&options.file.directory) {
        Ok(Some((writer, guard))) => {
            let filter =
                EnvFilter::try_new(&options.file.level).unwrap_or_else(|_| EnvFilter::new("debug"));
            let layer = fmt::layer()
                .with_ansi(false)
                .with_writer(writer)
                .with_filter(filter);
            (Some(layer), Some(guard), None)
        }
        Ok(None) => (None, None, None),
        Err(e) => (None, None, Some(e)),
    };

    tracing_subscriber::registry()
        .with(console)
        .with(file)
        .init();

    if let Some(e) = file_error {
        tracing::warn!(
            directory = %options.file.directory.display(),
            error = %e,
            "Log directory unavailable, logging to console only"
        );
    }
    guard
}

/// Non-blocking writer for `{directory}/yacu.log`; `None` when file logging
/// is disabled by an empty directory.
fn file_writer(directory: &Path) -> std::io::Result<Option<(NonBlocking, WorkerGuard)>> {
    if directory.as_os_str().is_empty() {
        return Ok(None);
    }
    std::fs::create_dir_all(directory)?;
    let appender = tracing_appender::rolling::daily(directory, LOG_FILE);
    Ok(Some(tracing_appender::non_blocking(appender)))
}
