/*!
 * Append-only event log with line-count rotation
 *
 * Every supervisor step appends a `(timestamp, message)` line to a named
 * file. Once the file reaches the rotation threshold, the oldest block of
 * lines is trimmed and a rotation marker recording the trimmed count is
 * appended. The read-modify-write rotation sequence holds an exclusive
 * advisory lock on the file, so concurrent writers (multiple remotes in
 * one pass, or overlapping scheduler invocations) cannot interleave a
 * rotation with an append.
 */

use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::Local;
use thiserror::Error;
use tracing::{info, warn};

use crate::config::RotationPolicy;

/// Timestamp format for event log lines
const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

#[derive(Debug, Error)]
pub enum EventLogError {
    #[error("failed to open event log '{path}': {source}")]
    Open {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to lock event log '{path}': {source}")]
    Lock {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to write event log '{path}': {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// Size-bounded append-only event sink
pub struct EventLog {
    path: PathBuf,
    policy: RotationPolicy,
}

impl EventLog {
    pub fn new(path: PathBuf, policy: RotationPolicy) -> Self {
        Self { path, policy }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one timestamped message, rotating first if the file has
    /// reached the threshold.
    pub fn append(&self, message: &str) -> Result<(), EventLogError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(|e| EventLogError::Open {
                    path: self.path.clone(),
                    source: e,
                })?;
            }
        }

        let mut file = OpenOptions::new()
            .read(true)
            .append(true)
            .create(true)
            .open(&self.path)
            .map_err(|e| EventLogError::Open {
                path: self.path.clone(),
                source: e,
            })?;

        // Held until `file` drops at the end of this call
        lock_exclusive(&file).map_err(|e| EventLogError::Lock {
            path: self.path.clone(),
            source: e,
        })?;

        self.rotate_if_needed(&mut file)?;

        writeln!(file, "{}: {}", Self::timestamp(), message).map_err(|e| EventLogError::Write {
            path: self.path.clone(),
            source: e,
        })
    }

    /// Append, treating sink failure as a diagnostic rather than an
    /// operational error: mount supervision must not stop because the
    /// log disk is full. Also mirrors the message to the tracing output.
    pub fn record(&self, message: &str) {
        info!("{}", message);
        if let Err(e) = self.append(message) {
            warn!("event log write failed: {}", e);
        }
    }

    /// Trim the oldest lines and append a rotation marker when the line
    /// count has reached the threshold. The caller holds the file lock.
    fn rotate_if_needed(&self, file: &mut File) -> Result<(), EventLogError> {
        let contents = fs::read_to_string(&self.path).map_err(|e| EventLogError::Write {
            path: self.path.clone(),
            source: e,
        })?;
        let lines: Vec<&str> = contents.lines().filter(|l| !l.is_empty()).collect();
        if lines.len() < self.policy.trim_threshold {
            return Ok(());
        }

        let cut = self.policy.trim_lines.min(lines.len());
        let kept = &lines[cut..];
        let mut replacement = kept.join("\n");
        if !replacement.is_empty() {
            replacement.push('\n');
        }
        // Truncating rewrite of the same inode; the append handle keeps
        // writing at end-of-file afterwards
        fs::write(&self.path, replacement).map_err(|e| EventLogError::Write {
            path: self.path.clone(),
            source: e,
        })?;

        writeln!(
            file,
            "{}: LOG ROTATION: trimmed {} lines, {} retained",
            Self::timestamp(),
            cut,
            kept.len()
        )
        .map_err(|e| EventLogError::Write {
            path: self.path.clone(),
            source: e,
        })
    }

    fn timestamp() -> String {
        Local::now().format(TIMESTAMP_FORMAT).to_string()
    }
}

#[cfg(unix)]
fn lock_exclusive(file: &File) -> std::io::Result<()> {
    rustix::fs::flock(file, rustix::fs::FlockOperation::LockExclusive)?;
    Ok(())
}

#[cfg(not(unix))]
fn lock_exclusive(_file: &File) -> std::io::Result<()> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn policy(threshold: usize, trim: usize) -> RotationPolicy {
        RotationPolicy {
            trim_threshold: threshold,
            trim_lines: trim,
        }
    }

    #[test]
    fn test_append_creates_file_with_timestamped_line() {
        let dir = tempdir().unwrap();
        let log = EventLog::new(dir.path().join("events.log"), policy(100, 50));

        log.append("checking remote 'drive'").unwrap();

        let contents = fs::read_to_string(log.path()).unwrap();
        let line = contents.lines().next().unwrap();
        assert!(line.ends_with(": checking remote 'drive'"));
        // "YYYY-MM-DD HH:MM:SS" prefix
        assert_eq!(line.split(": ").next().unwrap().len(), 19);
    }

    #[test]
    fn test_append_creates_missing_parent_directory() {
        let dir = tempdir().unwrap();
        let log = EventLog::new(dir.path().join("nested/deeper/events.log"), policy(100, 50));

        log.append("hello").unwrap();
        assert!(log.path().exists());
    }

    #[test]
    fn test_no_rotation_below_threshold() {
        let dir = tempdir().unwrap();
        let log = EventLog::new(dir.path().join("events.log"), policy(10, 5));

        for i in 0..9 {
            log.append(&format!("event {}", i)).unwrap();
        }

        let contents = fs::read_to_string(log.path()).unwrap();
        assert_eq!(contents.lines().count(), 9);
        assert!(!contents.contains("LOG ROTATION"));
    }

    #[test]
    fn test_rotation_trims_oldest_block_and_appends_marker() {
        let dir = tempdir().unwrap();
        let log = EventLog::new(dir.path().join("events.log"), policy(10, 4));

        for i in 0..10 {
            log.append(&format!("event {}", i)).unwrap();
        }
        // File is at threshold; this append triggers rotation first
        log.append("after rotation").unwrap();

        let contents = fs::read_to_string(log.path()).unwrap();
        let lines: Vec<&str> = contents.lines().collect();

        // 10 - 4 trimmed + marker + new message
        assert_eq!(lines.len(), 8);
        assert!(!contents.contains("event 0"));
        assert!(!contents.contains("event 3"));
        assert!(lines[0].ends_with("event 4"));
        assert!(lines[6].contains("LOG ROTATION: trimmed 4 lines, 6 retained"));
        assert!(lines[7].ends_with("after rotation"));
    }

    #[test]
    fn test_rotation_marker_counts_against_next_threshold() {
        let dir = tempdir().unwrap();
        let log = EventLog::new(dir.path().join("events.log"), policy(6, 3));

        for i in 0..12 {
            log.append(&format!("event {}", i)).unwrap();
        }

        let contents = fs::read_to_string(log.path()).unwrap();
        // Multiple rotations happened and the file stays bounded
        assert!(contents.contains("LOG ROTATION"));
        assert!(contents.lines().count() <= 8);
        assert!(contents.lines().last().unwrap().ends_with("event 11"));
    }

    #[test]
    fn test_record_swallows_sink_errors() {
        // A path whose parent cannot be created: /dev/null is a file
        let log = EventLog::new(PathBuf::from("/dev/null/events.log"), policy(10, 5));
        // Must not panic
        log.record("message into the void");
    }
}
