//! Daemon log files and their size-based rotation.
//!
//! `daemon.log` receives everything the filter lets through,
//! `daemon-err.log` only warnings and errors. Each is rotated past 10 MiB,
//! keeping five numbered copies (`daemon.log.1` is the newest).
//!
//! [`LogFile`] reopens its path in append mode for every event, so a rotation
//! never leaves the daemon writing into a renamed file.

use std::fs::{self, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};

use tracing_subscriber::fmt::MakeWriter;

use crate::paths::{stderr_log_path, stdout_log_path};

pub const MAX_LOG_BYTES: u64 = 10 * 1024 * 1024;
pub const MAX_ROTATED_FILES: usize = 5;

/// Rotation limits for one log file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RotationPolicy {
    pub max_bytes: u64,
    pub max_files: usize,
}

impl Default for RotationPolicy {
    fn default() -> Self {
        Self {
            max_bytes: MAX_LOG_BYTES,
            max_files: MAX_ROTATED_FILES,
        }
    }
}

impl RotationPolicy {
    /// Rotate `log` when it has reached `max_bytes`. Returns whether it did.
    ///
    /// A missing log is not an error.
    pub fn rotate(&self, log: &Path) -> io::Result<bool> {
        let size = match fs::metadata(log) {
            Ok(meta) => meta.len(),
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(false),
            Err(err) => return Err(err),
        };
        if size < self.max_bytes {
            return Ok(false);
        }

        remove_if_present(&backup_path(log, self.max_files))?;
        for n in (1..self.max_files).rev() {
            let from = backup_path(log, n);
            if from.exists() {
                fs::rename(&from, backup_path(log, n + 1))?;
            }
        }
        fs::rename(log, backup_path(log, 1))?;
        OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(log)?;
        Ok(true)
    }
}

/// Rotate both daemon logs under `home`; failures are logged, not returned.
pub fn rotate_logs(home: &Path) {
    let policy = RotationPolicy::default();
    for log in [stdout_log_path(home), stderr_log_path(home)] {
        match policy.rotate(&log) {
            Ok(true) => tracing::info!(path = %log.display(), "log file rotated"),
            Ok(false) => {}
            Err(err) => {
                tracing::warn!(path = %log.display(), error = %err, "log rotation failed")
            }
        }
    }
}

/// `daemon.log.3` for `(daemon.log, 3)`.
fn backup_path(log: &Path, n: usize) -> PathBuf {
    let mut name = log.file_name().unwrap_or_default().to_os_string();
    name.push(format!(".{n}"));
    log.with_file_name(name)
}

fn remove_if_present(path: &Path) -> io::Result<()> {
    match fs::remove_file(path) {
        Err(err) if err.kind() != io::ErrorKind::NotFound => Err(err),
        _ => Ok(()),
    }
}

// ---------------------------------------------------------------------------
// Writer
// ---------------------------------------------------------------------------

/// `MakeWriter` appending to a path, opened per event.
#[derive(Debug, Clone)]
pub struct LogFile {
    path: PathBuf,
}

impl LogFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl<'a> MakeWriter<'a> for LogFile {
    type Writer = Box<dyn io::Write + 'a>;

    fn make_writer(&'a self) -> Self::Writer {
        match OpenOptions::new().create(true).append(true).open(&self.path) {
            Ok(file) => Box::new(file),
            Err(_) => Box::new(io::stderr()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::TempDir;

    fn small_policy() -> RotationPolicy {
        RotationPolicy {
            max_bytes: 16,
            max_files: 3,
        }
    }

    #[test]
    fn default_policy_is_ten_mib_five_files() {
        let policy = RotationPolicy::default();
        assert_eq!(policy.max_bytes, 10 * 1024 * 1024);
        assert_eq!(policy.max_files, 5);
    }

    #[test]
    fn small_file_is_left_alone() {
        let dir = TempDir::new().unwrap();
        let log = dir.path().join("daemon.log");
        fs::write(&log, "short").unwrap();
        assert!(!small_policy().rotate(&log).unwrap());
        assert!(!backup_path(&log, 1).exists());
    }

    #[test]
    fn missing_file_is_not_an_error() {
        let dir = TempDir::new().unwrap();
        assert!(!small_policy().rotate(&dir.path().join("none.log")).unwrap());
    }

    #[test]
    fn oversized_file_moves_to_first_backup() {
        let dir = TempDir::new().unwrap();
        let log = dir.path().join("daemon.log");
        fs::write(&log, "0123456789abcdefXYZ").unwrap();

        assert!(small_policy().rotate(&log).unwrap());
        assert_eq!(fs::metadata(&log).unwrap().len(), 0);
        assert_eq!(
            fs::read_to_string(backup_path(&log, 1)).unwrap(),
            "0123456789abcdefXYZ"
        );
    }

    #[test]
    fn backups_shift_and_oldest_is_dropped() {
        let dir = TempDir::new().unwrap();
        let log = dir.path().join("daemon.log");
        for round in 1..=4 {
            fs::write(&log, format!("round-{round}-padding-padding")).unwrap();
            small_policy().rotate(&log).unwrap();
        }

        assert!(fs::read_to_string(backup_path(&log, 1))
            .unwrap()
            .starts_with("round-4"));
        assert!(fs::read_to_string(backup_path(&log, 3))
            .unwrap()
            .starts_with("round-2"));
        assert!(!backup_path(&log, 4).exists());
    }

    #[test]
    fn log_file_keeps_writing_to_live_path_after_rotation() {
        let dir = TempDir::new().unwrap();
        let log = dir.path().join("daemon.log");
        let writer = LogFile::new(&log);

        writer
            .make_writer()
            .write_all(b"before rotation, long enough\n")
            .unwrap();
        assert!(small_policy().rotate(&log).unwrap());
        writer.make_writer().write_all(b"after\n").unwrap();

        assert_eq!(fs::read_to_string(&log).unwrap(), "after\n");
    }

    #[test]
    fn rotate_logs_handles_both_files() {
        let home = TempDir::new().unwrap();
        fs::create_dir_all(crate::paths::logs_dir(home.path())).unwrap();
        let mut big = fs::File::create(stdout_log_path(home.path())).unwrap();
        big.write_all(&vec![b'x'; (MAX_LOG_BYTES + 1) as usize]).unwrap();
        drop(big);

        rotate_logs(home.path());

        assert!(backup_path(&stdout_log_path(home.path()), 1).exists());
        assert!(!stderr_log_path(home.path()).exists());
    }
}
