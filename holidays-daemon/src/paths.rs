use std::path::{Path, PathBuf};
use std::time::Duration;

pub use holidays_core::settings::holidays_root;

pub const DAEMON_LABEL: &str = "dev.holidays.daemon";
pub const DEBOUNCE_WINDOW: Duration = Duration::from_millis(500);

pub const DAEMON_STDOUT_LOG: &str = "daemon.log";
pub const DAEMON_STDERR_LOG: &str = "daemon-err.log";
pub const DAEMON_SOCKET: &str = "daemon.sock";
pub const SETTINGS_FILE: &str = "settings.yaml";

pub fn socket_path(home: &Path) -> PathBuf {
    holidays_root(home).join(DAEMON_SOCKET)
}

pub fn logs_dir(home: &Path) -> PathBuf {
    holidays_root(home).join("logs")
}

pub fn stdout_log_path(home: &Path) -> PathBuf {
    logs_dir(home).join(DAEMON_STDOUT_LOG)
}

pub fn stderr_log_path(home: &Path) -> PathBuf {
    logs_dir(home).join(DAEMON_STDERR_LOG)
}
