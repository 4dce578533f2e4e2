//! User settings persisted as YAML.
//!
//! # Storage layout
//!
//! ```text
//! ~/.holidays/
//!   settings.yaml   (mode 0600, written atomically)
//! ```
//!
//! # API pattern
//!
//! Every function touching disk has two forms:
//! - `fn_at(home: &Path, …)` — explicit home; used in tests with `TempDir`
//! - `fn(…)` — derives home from `dirs::home_dir()`, delegates to `_at`

use std::path::{Path, PathBuf};

use chrono::{Datelike, NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize};

use crate::error::SettingsError;
use crate::types::CountryCode;

pub const DEFAULT_BASE_URL: &str = "https://holidayapi.com/v1/holidays";
pub const DEFAULT_NOTIFY_AT: &str = "09:00";
pub const DEFAULT_TIMEOUT_SECS: u64 = 10;

pub const API_KEY_ENV: &str = "HOLIDAYS_API_KEY";
pub const BASE_URL_ENV: &str = "HOLIDAYS_BASE_URL";

const NOTIFY_AT_FORMAT: &str = "%H:%M";

/// Everything the sync engine reads from configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Credential sent as the `key` query parameter.
    pub api_key: String,
    pub base_url: String,
    /// Year to fetch. `None` follows the current local year.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub year: Option<i32>,
    /// Ordered country selection.
    pub countries: Vec<CountryCode>,
    pub notifications_enabled: bool,
    /// Local time of the daily check, `HH:MM`.
    pub notify_at: String,
    pub connect_timeout_secs: u64,
    pub read_timeout_secs: u64,
    /// Program run once per holiday notification.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notify_command: Option<String>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            base_url: DEFAULT_BASE_URL.to_string(),
            year: None,
            countries: vec![CountryCode::known("US")],
            notifications_enabled: true,
            notify_at: DEFAULT_NOTIFY_AT.to_string(),
            connect_timeout_secs: DEFAULT_TIMEOUT_SECS,
            read_timeout_secs: DEFAULT_TIMEOUT_SECS,
            notify_command: None,
        }
    }
}

impl Settings {
    /// Check cross-field constraints serde cannot express.
    pub fn validate(&self) -> Result<(), SettingsError> {
        if let Some(year) = self.year {
            if year <= 0 {
                return Err(SettingsError::Invalid {
                    field: "year",
                    reason: format!("must be positive, got {year}"),
                });
            }
        }
        if self.connect_timeout_secs == 0 || self.read_timeout_secs == 0 {
            return Err(SettingsError::Invalid {
                field: "timeout",
                reason: "timeouts must be at least one second".to_string(),
            });
        }
        self.notify_time()?;
        Ok(())
    }

    /// Parsed [`Settings::notify_at`].
    pub fn notify_time(&self) -> Result<NaiveTime, SettingsError> {
        NaiveTime::parse_from_str(self.notify_at.trim(), NOTIFY_AT_FORMAT).map_err(|e| {
            SettingsError::Invalid {
                field: "notify_at",
                reason: format!("'{}' is not HH:MM ({e})", self.notify_at),
            }
        })
    }

    /// The year a sync should request, given today's local date.
    pub fn sync_year(&self, today: NaiveDate) -> i32 {
        self.year.unwrap_or_else(|| today.year())
    }

    /// Replace the selection, dropping repeated codes but keeping order.
    pub fn set_countries(&mut self, countries: Vec<CountryCode>) {
        let mut seen = std::collections::HashSet::new();
        self.countries = countries
            .into_iter()
            .filter(|c| seen.insert(c.clone()))
            .collect();
    }

    /// Apply `HOLIDAYS_API_KEY` / `HOLIDAYS_BASE_URL` on top of file values.
    ///
    /// Kept separate from loading so that `save_at` never persists them.
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(key) = std::env::var(API_KEY_ENV) {
            if !key.is_empty() {
                self.api_key = key;
            }
        }
        if let Ok(url) = std::env::var(BASE_URL_ENV) {
            if !url.is_empty() {
                self.base_url = url;
            }
        }
        self
    }
}

// ---------------------------------------------------------------------------
// Paths
// ---------------------------------------------------------------------------

/// `<home>/.holidays/`
pub fn holidays_root(home: &Path) -> PathBuf {
    home.join(".holidays")
}

/// `<home>/.holidays/settings.yaml` — pure, no I/O.
pub fn settings_path_at(home: &Path) -> PathBuf {
    holidays_root(home).join("settings.yaml")
}

// ---------------------------------------------------------------------------
// Load / save
// ---------------------------------------------------------------------------

/// Load settings from `<home>/.holidays/settings.yaml`.
///
/// A missing file yields [`Settings::default`]. Malformed YAML returns
/// `SettingsError::Parse` with the path.
pub fn load_at(home: &Path) -> Result<Settings, SettingsError> {
    let path = settings_path_at(home);
    if !path.exists() {
        return Ok(Settings::default());
    }
    let contents = std::fs::read_to_string(&path)?;
    if contents.trim().is_empty() {
        return Ok(Settings::default());
    }
    let settings: Settings =
        serde_yaml::from_str(&contents).map_err(|e| SettingsError::Parse { path, source: e })?;
    settings.validate()?;
    Ok(settings)
}

/// `load_at` convenience wrapper.
pub fn load() -> Result<Settings, SettingsError> {
    load_at(&home()?)
}

/// Atomically save settings.
///
/// Write flow: validate → serialize → `.yaml.tmp` sibling → `chmod 0600` → `rename`.
pub fn save_at(home: &Path, settings: &Settings) -> Result<(), SettingsError> {
    settings.validate()?;
    let root = holidays_root(home);
    if !root.exists() {
        std::fs::create_dir_all(&root)?;
        set_dir_permissions(&root)?;
    }
    let path = settings_path_at(home);
    let tmp_path = path.with_file_name("settings.yaml.tmp");

    let yaml = serde_yaml::to_string(settings)?;
    std::fs::write(&tmp_path, yaml)?;
    set_file_permissions(&tmp_path)?;
    std::fs::rename(&tmp_path, &path)?;
    Ok(())
}

/// `save_at` convenience wrapper.
pub fn save(settings: &Settings) -> Result<(), SettingsError> {
    save_at(&home()?, settings)
}

/// Load, mutate and save in one step. Returns the saved settings.
pub fn update_at(
    home: &Path,
    change: impl FnOnce(&mut Settings),
) -> Result<Settings, SettingsError> {
    let mut settings = load_at(home)?;
    change(&mut settings);
    save_at(home, &settings)?;
    Ok(settings)
}

/// The user's home directory.
pub fn home() -> Result<PathBuf, SettingsError> {
    dirs::home_dir().ok_or(SettingsError::HomeNotFound)
}

#[cfg(unix)]
fn set_dir_permissions(path: &Path) -> Result<(), SettingsError> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o700))?;
    Ok(())
}
#[cfg(not(unix))]
fn set_dir_permissions(_path: &Path) -> Result<(), SettingsError> {
    Ok(())
}

#[cfg(unix)]
fn set_file_permissions(path: &Path) -> Result<(), SettingsError> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))?;
    Ok(())
}
#[cfg(not(unix))]
fn set_file_permissions(_path: &Path) -> Result<(), SettingsError> {
    Ok(())
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn code(s: &str) -> CountryCode {
        CountryCode::new(s).unwrap()
    }

    #[test]
    fn settings_path_is_correct() {
        let home = TempDir::new().unwrap();
        assert!(settings_path_at(home.path()).ends_with(".holidays/settings.yaml"));
    }

    #[test]
    fn missing_file_yields_defaults() {
        let home = TempDir::new().unwrap();
        let settings = load_at(home.path()).expect("load");
        assert_eq!(settings, Settings::default());
        assert_eq!(settings.countries, vec![code("US")]);
        assert!(settings.notifications_enabled);
    }

    #[test]
    fn save_and_load_roundtrip_with_perms() {
        let home = TempDir::new().unwrap();
        let mut settings = Settings::default();
        settings.api_key = "secret".to_string();
        settings.year = Some(2017);
        settings.set_countries(vec![code("ru"), code("DE")]);
        save_at(home.path(), &settings).expect("save");

        let loaded = load_at(home.path()).expect("load");
        assert_eq!(loaded, settings);

        let tmp = settings_path_at(home.path()).with_file_name("settings.yaml.tmp");
        assert!(!tmp.exists(), ".tmp must be gone after successful save");

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = std::fs::metadata(settings_path_at(home.path()))
                .unwrap()
                .permissions()
                .mode()
                & 0o777;
            assert_eq!(mode, 0o600);
        }
    }

    #[test]
    fn set_countries_dedups_preserving_order() {
        let mut settings = Settings::default();
        settings.set_countries(vec![code("DE"), code("US"), code("de")]);
        assert_eq!(settings.countries, vec![code("DE"), code("US")]);
    }

    #[test]
    fn sync_year_follows_today_unless_pinned() {
        let today = NaiveDate::from_ymd_opt(2024, 7, 4).unwrap();
        let mut settings = Settings::default();
        assert_eq!(settings.sync_year(today), 2024);
        settings.year = Some(2017);
        assert_eq!(settings.sync_year(today), 2017);
    }

    #[test]
    fn invalid_notify_at_rejected_on_save() {
        let home = TempDir::new().unwrap();
        let settings = Settings {
            notify_at: "25:99".to_string(),
            ..Settings::default()
        };
        let err = save_at(home.path(), &settings).unwrap_err();
        assert!(matches!(
            err,
            SettingsError::Invalid {
                field: "notify_at",
                ..
            }
        ));
        assert!(!settings_path_at(home.path()).exists());
    }

    #[test]
    fn update_at_persists_change() {
        let home = TempDir::new().unwrap();
        update_at(home.path(), |s| s.notifications_enabled = false).expect("update");
        assert!(!load_at(home.path()).unwrap().notifications_enabled);
    }

    #[test]
    fn home_not_found_error_message() {
        assert!(SettingsError::HomeNotFound
            .to_string()
            .contains("home directory"));
    }
}
