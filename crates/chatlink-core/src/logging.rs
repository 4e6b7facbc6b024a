//! Bridge traffic log.
//!
//! When enabled, every line exchanged with the bridge process is appended
//! to a file with a UTC timestamp and a direction tag. Application logging
//! goes through the `log` facade; this file is only for raw protocol
//! traffic.

use std::{
    fs::{File, OpenOptions},
    io::Write,
    path::Path,
    sync::{Arc, Mutex},
};

use chrono::{SecondsFormat, Utc};

/// Thread-safe handle to an append-only log file. `None` disables logging.
pub type LogHandle = Arc<Mutex<Option<File>>>;

/// ISO 8601 UTC with milliseconds, e.g. `2026-02-04T10:15:30.123Z`.
fn utc_timestamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Append a timestamped line. Write errors are ignored.
pub fn log_line(handle: &LogHandle, direction: &str, data: &str) {
    if let Ok(mut guard) = handle.lock() {
        if let Some(ref mut file) = *guard {
            let _ = writeln!(file, "[{}] {}: {}", utc_timestamp(), direction, data);
            let _ = file.flush();
        }
    }
}

/// Open (or create) `{log_dir}/{log_id}.log`.
///
/// Returns a disabled handle when `log_dir` is `None` or the file cannot be
/// opened.
pub fn open_log_file(log_dir: Option<&Path>, log_id: &str) -> LogHandle {
    let file = log_dir.and_then(|dir| {
        if let Err(e) = std::fs::create_dir_all(dir) {
            log::warn!("Cannot create log directory {}: {}", dir.display(), e);
            return None;
        }
        let path = dir.join(format!("{}.log", log_id));
        match OpenOptions::new().create(true).append(true).open(&path) {
            Ok(file) => Some(file),
            Err(e) => {
                log::warn!("Cannot open traffic log {}: {}", path.display(), e);
                None
            }
        }
    });
    Arc::new(Mutex::new(file))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn utc_timestamp_format() {
        let ts = utc_timestamp();
        assert!(ts.ends_with('Z'));
        assert_eq!(ts.len(), 24);
        assert_eq!(&ts[10..11], "T");
        assert_eq!(&ts[19..20], ".");
    }

    #[test]
    fn open_log_file_creates_nested_dir() {
        let dir = tempdir().unwrap();
        let log_dir = dir.path().join("logs");

        let handle = open_log_file(Some(&log_dir), "bridge");
        assert!(handle.lock().unwrap().is_some());
        assert!(log_dir.join("bridge.log").exists());
    }

    #[test]
    fn no_dir_means_disabled() {
        let handle = open_log_file(None, "bridge");
        assert!(handle.lock().unwrap().is_none());
        log_line(&handle, "STDIN", "dropped");
    }

    #[test]
    fn log_line_appends_tagged_lines() {
        let dir = tempdir().unwrap();
        let handle = open_log_file(Some(dir.path()), "bridge");

        log_line(&handle, "STDIN", r#"{"id":1,"op":"initialize"}"#);
        log_line(&handle, "STDOUT", r#"{"event":"ready"}"#);

        let contents = fs::read_to_string(dir.path().join("bridge.log")).unwrap();
        let lines: Vec<_> = contents.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].ends_with(r#"STDIN: {"id":1,"op":"initialize"}"#));
        assert!(lines[1].starts_with('['));
        assert!(lines[1].contains("] STDOUT: "));
    }
}
