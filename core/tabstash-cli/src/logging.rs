//! Logging setup for the CLI.
//!
//! Console output goes to stderr so command output stays pipeable. Set
//! `TABSTASH_LOG` to adjust the filter and `TABSTASH_LOG_DIR` to also
//! write daily-rotated log files.

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, EnvFilter};

/// Initializes tracing. The returned guard must live for the process
/// lifetime to flush file output.
pub fn init() -> Option<WorkerGuard> {
    let filter = EnvFilter::try_from_env("TABSTASH_LOG")
        .unwrap_or_else(|_| EnvFilter::new("info"));

    if let Ok(dir) = std::env::var("TABSTASH_LOG_DIR") {
        let appender = tracing_appender::rolling::daily(dir, "tabstash.log");
        let (writer, guard) = tracing_appender::non_blocking(appender);
        fmt()
            .with_env_filter(filter)
            .with_writer(writer)
            .with_ansi(false)
            .init();
        Some(guard)
    } else {
        fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
        None
    }
}
