//! Telemetry and Observability
//!
//! Handles setting up `tracing-subscriber` for structured logging.
//! Supports config-driven log levels, environment variable overrides,
//! and format switching between pretty (debug) and JSON (release).
//! When `core.log_dir` is set, JSON records are also written to daily-rotated
//! files there, keeping at most `core.log_max_files` of them.

use std::path::Path;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{InitError, RollingFileAppender, Rotation};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Prefix of rotated log file names
pub const LOG_FILE_PREFIX: &str = "abacus";

/// Build the filter directive for a log level.
///
/// The level applies globally and to the engine crate; noisy HTTP internals
/// stay at `warn` unless `RUST_LOG` says otherwise.
pub fn filter_directive(log_level: &str) -> String {
    format!(
        "{},abacus_engine={},hyper=warn,reqwest=warn",
        log_level, log_level
    )
}

/// Daily-rotated log file appender keeping at most `max_files` files
pub fn file_appender(dir: &Path, max_files: usize) -> Result<RollingFileAppender, InitError> {
    RollingFileAppender::builder()
        .rotation(Rotation::DAILY)
        .filename_prefix(LOG_FILE_PREFIX)
        .filename_suffix("log")
        .max_log_files(max_files)
        .build(dir)
}

/// Initialize the tracing subscriber with the given log level.
///
/// Priority: `RUST_LOG` env var > `log_level` parameter > default "info"
///
/// In debug builds: pretty-printed terminal output.
/// In release builds: JSON structured output with spans.
///
/// Calling this more than once is harmless; only the first call installs
/// a subscriber.
pub fn init_telemetry_with_level(log_level: &str) {
    init_telemetry_with_config(log_level, None, 1);
}

/// Initialize terminal logging plus optional rotated files in `log_dir`.
///
/// The returned guard flushes the file writer on drop and must be held for
/// the life of the process.
pub fn init_telemetry_with_config(
    log_level: &str,
    log_dir: Option<&Path>,
    max_files: usize,
) -> Option<WorkerGuard> {
    let default_filter = filter_directive(log_level);

    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&default_filter));

    let mut file_error = None;
    let (file_writer, guard) = match log_dir.map(|dir| file_appender(dir, max_files)) {
        Some(Ok(appender)) => {
            let (writer, guard) = tracing_appender::non_blocking(appender);
            (Some(writer), Some(guard))
        }
        Some(Err(e)) => {
            file_error = Some(e);
            (None, None)
        }
        None => (None, None),
    };
    let file_layer = file_writer.map(|writer| {
        fmt::layer()
            .json()
            .with_current_span(true)
            .with_ansi(false)
            .with_writer(writer)
    });

    #[cfg(debug_assertions)]
    {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt::layer().pretty().with_target(false))
            .with(file_layer)
            .try_init()
            .ok();
    }

    #[cfg(not(debug_assertions))]
    {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt::layer().json().with_current_span(true))
            .with(file_layer)
            .try_init()
            .ok();
    }

    if let Some(e) = file_error {
        tracing::warn!("File logging disabled: {}", e);
    }
    guard
}

/// Initialize the tracing subscriber with default settings.
pub fn init_telemetry() {
    init_telemetry_with_level("info");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filter_directive_targets_engine() {
        let directive = filter_directive("debug");
        assert!(directive.starts_with("debug,"));
        assert!(directive.contains("abacus_engine=debug"));
        assert!(EnvFilter::try_new(&directive).is_ok());
    }

    #[test]
    fn test_file_appender_writes_into_dir() {
        use std::io::Write;

        let dir = tempfile::TempDir::new().unwrap();
        let mut appender = file_appender(dir.path(), 5).unwrap();
        appender.write_all(b"{\"message\":\"hello\"}\n").unwrap();
        appender.flush().unwrap();

        let names: Vec<String> = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names.len(), 1);
        assert!(names[0].starts_with(LOG_FILE_PREFIX));
        assert!(names[0].ends_with(".log"));
    }

    #[test]
    fn test_init_twice_is_harmless() {
        init_telemetry();
        init_telemetry_with_level("trace");
    }
}
