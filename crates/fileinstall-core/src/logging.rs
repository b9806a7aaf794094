//! Logging infrastructure for fileinstall.
//!
//! Everything the engine decides is reported through `tracing`; there is no
//! other operator channel. Three severities are used consistently:
//!
//! - `info!` for lifecycle and decisions (master registered, worker activated)
//! - `debug!` for success/trace detail (check verdicts, descriptor files)
//! - `warn!` for swallowed failures (descriptor write/delete, bad config)
//!
//! ## Example
//!
//! ```no_run
//! use fileinstall_core::logging;
//!
//! let guard = logging::init_logging(None, false).expect("logging init");
//! tracing::info!(log_file = %guard.log_file().display(), "fileinstall started");
//! ```

use std::path::{Path, PathBuf};

use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use crate::error::{FileinstallError, Result};

/// Base name of the rolling log file.
pub const LOG_FILE_NAME: &str = "fileinstall.log";

/// Keeps the background log writer alive; drop it last.
pub struct LogGuard {
    log_file: PathBuf,
    _writer: WorkerGuard,
}

impl LogGuard {
    /// Base path of the rolling log file (the appender adds a date suffix).
    pub fn log_file(&self) -> &Path {
        &self.log_file
    }
}

/// Filter used when `RUST_LOG` is not set.
pub fn default_filter(verbose: bool) -> String {
    let level = if verbose { "debug" } else { "info" };
    format!("fileinstall={level}")
}

/// Initialize the fileinstall logging system.
///
/// Installs two layers on the global subscriber:
/// - JSON lines to `<log_dir>/fileinstall.log`, rotated daily
/// - compact human-readable output on stderr
///
/// `log_dir` defaults to `~/.fileinstall/logs/`. `RUST_LOG` overrides the
/// level chosen by `verbose`.
pub fn init_logging(log_dir: Option<PathBuf>, verbose: bool) -> Result<LogGuard> {
    let log_dir = log_dir.map_or_else(default_log_dir, Ok)?;
    std::fs::create_dir_all(&log_dir).map_err(|e| FileinstallError::DirectoryCreation {
        path: log_dir.clone(),
        source: e,
    })?;

    let (file_writer, writer_guard) =
        tracing_appender::non_blocking(rolling::daily(&log_dir, LOG_FILE_NAME));

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_filter(verbose)));

    tracing_subscriber::registry()
        .with(filter)
        .with(
            fmt::layer()
                .json()
                .with_writer(file_writer)
                .with_ansi(false)
                .with_target(true),
        )
        .with(
            fmt::layer()
                .compact()
                .with_writer(std::io::stderr)
                .with_target(verbose)
                .with_file(verbose)
                .with_line_number(verbose),
        )
        .try_init()
        .map_err(|e| FileinstallError::internal(format!("logging already initialized: {e}")))?;

    let log_file = log_dir.join(LOG_FILE_NAME);
    tracing::debug!(log_file = %log_file.display(), verbose, "logging initialized");

    Ok(LogGuard {
        log_file,
        _writer: writer_guard,
    })
}

/// Console-only logging for tests; safe to call repeatedly.
pub fn init_test_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new("fileinstall=debug"))
        .with_test_writer()
        .try_init();
}

/// `~/.fileinstall/logs/`
pub fn default_log_dir() -> Result<PathBuf> {
    let home = std::env::var_os("HOME").ok_or_else(|| FileinstallError::ConfigMissingField {
        field: "HOME environment variable".into(),
    })?;
    Ok(PathBuf::from(home).join(".fileinstall").join("logs"))
}

/// Log a descriptor file change on the `fileinstall::descriptor` target.
///
/// ```ignore
/// log_descriptor_event!("master", "bundle-a", "created", path = %path.display());
/// ```
#[macro_export]
macro_rules! log_descriptor_event {
    ($master:expr, $worker:expr, $event:expr) => {
        tracing::debug!(
            target: "fileinstall::descriptor",
            master = $master,
            worker = $worker,
            event = $event,
            "descriptor event"
        )
    };
    ($master:expr, $worker:expr, $event:expr, $($field:tt)*) => {
        tracing::debug!(
            target: "fileinstall::descriptor",
            master = $master,
            worker = $worker,
            event = $event,
            $($field)*,
            "descriptor event"
        )
    };
}
