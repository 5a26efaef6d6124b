use std::env;
use std::ffi::OsStr;
use std::io;
use std::path::{Path, PathBuf};
use tracing::debug;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{self, RollingFileAppender};
use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter};

const DEFAULT_FILTER: &str = "warn";
const DEFAULT_LOG_FILE: &str = "./logs/scatter.log";

/// Compact console output on stderr, keeping stdout for command output, and
/// a plain copy in `LOG_FILE_PATH`. Keep the guard alive until exit.
pub fn init_logger() -> WorkerGuard {
    let filter = EnvFilter::try_from_env("TRACING_LEVEL")
        .unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    let log_file = env::var_os("LOG_FILE_PATH")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_LOG_FILE));
    let (file_writer, guard) = tracing_appender::non_blocking(file_appender(&log_file));

    let console = fmt::layer()
        .with_writer(io::stderr)
        .with_target(false)
        .without_time()
        .compact();
    let file = fmt::layer().with_writer(file_writer).with_ansi(false);

    tracing_subscriber::registry()
        .with(console)
        .with(file)
        .with(filter)
        .init();

    debug!("Logging to stderr and {}", log_file.display());
    guard
}

fn file_appender(path: &Path) -> RollingFileAppender {
    let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or(Path::new("."));
    let name = path.file_name().unwrap_or(OsStr::new("scatter.log"));
    rolling::never(dir, name)
}
