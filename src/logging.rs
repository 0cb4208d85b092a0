//! Tracing setup for applications embedding the engine. Log verbosity comes
//! from [`SchedulerConfig::log_level`]; an optional daily-rotated file layer
//! is gated on `ENABLE_FILE_LOGS`.

use tracing_appender::non_blocking::{NonBlocking, WorkerGuard};
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::SchedulerConfig;

/// Keeps the non-blocking file writer flushing; drop it on shutdown.
pub struct FileLogGuard {
    _guard: WorkerGuard,
}

pub fn file_logging_enabled() -> bool {
    std::env::var("ENABLE_FILE_LOGS")
        .map(|v| v == "true" || v == "1")
        .unwrap_or(false)
}

/// Installs the global subscriber. Returns a guard when file logging is
/// active; installing twice is harmless (the second call is a no-op).
pub fn init_tracing(config: &SchedulerConfig) -> Option<FileLogGuard> {
    let filter =
        EnvFilter::try_new(&config.log_level).unwrap_or_else(|_| EnvFilter::new("info"));

    let (file_writer, guard) = match rolling_file_writer() {
        Some((writer, guard)) => (Some(writer), Some(FileLogGuard { _guard: guard })),
        None => (None, None),
    };
    let file_layer = file_writer
        .map(|writer| fmt::layer().with_writer(writer).with_ansi(false).with_target(true));

    let installed = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(true))
        .with(file_layer)
        .try_init();
    if installed.is_err() {
        tracing::debug!("tracing subscriber already installed");
    }

    guard
}

fn rolling_file_writer() -> Option<(NonBlocking, WorkerGuard)> {
    if !file_logging_enabled() {
        return None;
    }
    let log_dir = std::env::var("LOG_DIR").unwrap_or_else(|_| "./logs".to_string());
    if let Err(err) = std::fs::create_dir_all(&log_dir) {
        eprintln!("failed to create log directory {log_dir}: {err}");
        return None;
    }
    let appender = RollingFileAppender::new(Rotation::DAILY, &log_dir, "recall.log");
    Some(tracing_appender::non_blocking(appender))
}

#[cfg(test)]
mod tests {
    use super::*;

    // one test so the ENABLE_FILE_LOGS probes cannot race each other
    #[test]
    fn test_init_tracing_smoke() {
        std::env::remove_var("ENABLE_FILE_LOGS");
        assert!(!file_logging_enabled());

        let config = SchedulerConfig::default();
        assert!(init_tracing(&config).is_none());
        // second install is a no-op, not a panic
        assert!(init_tracing(&config).is_none());
        tracing::debug!("logging smoke event");

        std::env::set_var("ENABLE_FILE_LOGS", "true");
        assert!(file_logging_enabled());
        std::env::set_var("ENABLE_FILE_LOGS", "0");
        assert!(!file_logging_enabled());
        std::env::remove_var("ENABLE_FILE_LOGS");
    }
}
