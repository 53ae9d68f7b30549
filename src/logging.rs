// src/logging.rs
//
// Timestamped stderr logging with an optional log file.
// Hosts that load the library through the C ABI can silence stderr and
// redirect everything to a file instead.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use crate::error::{ReaderError, Result};

/// Global log file handle. When `Some`, `tlog!` writes to both stderr and this file.
pub(crate) static LOG_FILE: Mutex<Option<std::fs::File>> = Mutex::new(None);

/// Whether `tlog!` echoes to stderr.
pub(crate) static STDERR_ENABLED: AtomicBool = AtomicBool::new(true);

/// Timestamped logging macro.
/// Prepends `HH:MM:SS.mmm` local time to every message written to stderr.
/// Also writes to the log file when file logging is enabled.
macro_rules! tlog {
    ($($arg:tt)*) => {{
        use std::io::Write as _;
        let msg = format!("{} {}", chrono::Local::now().format("%H:%M:%S%.3f"), format_args!($($arg)*));
        if $crate::logging::STDERR_ENABLED.load(std::sync::atomic::Ordering::Relaxed) {
            eprintln!("{}", msg);
        }
        if let Ok(mut guard) = $crate::logging::LOG_FILE.lock() {
            if let Some(ref mut f) = *guard {
                let _ = writeln!(f, "{}", msg);
            }
        }
    }};
}

const LOG_LINK_NAME: &str = "serial-lines.log";

/// Enable or disable the stderr copy of every log line.
pub fn set_stderr_logging(enabled: bool) {
    STDERR_ENABLED.store(enabled, Ordering::Relaxed);
}

/// Initialise file logging to the given directory.
/// Creates a timestamped log file and a `serial-lines.log` symlink (Unix only).
/// Returns the path of the new log file.
pub fn init_file_logging(log_dir: &Path) -> Result<PathBuf> {
    std::fs::create_dir_all(log_dir)?;

    let filename = chrono::Local::now()
        .format("%Y%m%d-%H%M%S-serial-lines.log")
        .to_string();
    let log_path = log_dir.join(&filename);

    let file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)?;

    // Windows symlinks require elevated privileges
    #[cfg(unix)]
    {
        let symlink_path = log_dir.join(LOG_LINK_NAME);
        let _ = std::fs::remove_file(&symlink_path);
        if let Err(e) = std::os::unix::fs::symlink(&filename, &symlink_path) {
            tlog!("[logging] Failed to create {} symlink: {}", LOG_LINK_NAME, e);
        }
    }

    match LOG_FILE.lock() {
        Ok(mut guard) => *guard = Some(file),
        Err(e) => {
            return Err(ReaderError::Io(std::io::Error::other(format!(
                "log file lock poisoned: {}",
                e
            ))))
        }
    }

    tlog!("[logging] File logging started: {}", log_path.display());

    Ok(log_path)
}

/// Stop file logging and close the log file.
pub fn stop_file_logging() {
    let closed = match LOG_FILE.lock() {
        Ok(mut guard) => guard.take().is_some(),
        Err(_) => false,
    };
    if closed {
        tlog!("[logging] File logging stopped");
    }
}
