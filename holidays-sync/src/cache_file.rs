//! On-disk form of the holiday cache.
//!
//! Persists a `CacheFile` JSON document at
//! `<home>/.holidays/cache/holidays.json`, written through a unique temp
//! file in the same directory and renamed into place.
//!
//! The cache is disposable: a file from another schema version, one that no
//! longer parses, or one whose digest disagrees with its records is removed
//! and treated as "never synced".

use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use holidays_core::{settings::holidays_root, HolidayRecord};

use crate::error::{io_err, StoreError};

/// Bumped whenever the record layout changes. Older files are dropped.
pub const SCHEMA_VERSION: u32 = 3;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CacheFile {
    pub schema_version: u32,
    pub synced_at: DateTime<Utc>,
    /// SHA-256 over the canonical record listing, see [`digest_records`].
    pub digest: String,
    pub records: Vec<HolidayRecord>,
}

#[derive(Debug, Deserialize)]
struct VersionProbe {
    schema_version: Option<u32>,
}

/// `<home>/.holidays/cache/holidays.json`
pub fn cache_path_at(home: &Path) -> PathBuf {
    holidays_root(home).join("cache").join("holidays.json")
}

/// Load the cache file at `path`.
///
/// `Ok(None)` when the file is missing, unreadable as JSON, written by a
/// different schema version, or its digest does not match its records (in
/// every case but the first it is deleted).
pub fn load(path: &Path) -> Result<Option<CacheFile>, StoreError> {
    let contents = match std::fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(io_err(path, e)),
    };

    let version = serde_json::from_str::<VersionProbe>(&contents)
        .ok()
        .and_then(|probe| probe.schema_version);
    if version != Some(SCHEMA_VERSION) {
        tracing::warn!(
            "discarding holiday cache {} (schema {:?}, expected {})",
            path.display(),
            version,
            SCHEMA_VERSION
        );
        discard(path)?;
        return Ok(None);
    }

    match serde_json::from_str::<CacheFile>(&contents) {
        Ok(file) if file.digest != digest_records(&file.records) => {
            tracing::warn!(
                "discarding holiday cache {}: digest does not match its records",
                path.display()
            );
            discard(path)?;
            Ok(None)
        }
        Ok(file) => Ok(Some(file)),
        Err(e) => {
            tracing::warn!("discarding unreadable holiday cache {}: {}", path.display(), e);
            discard(path)?;
            Ok(None)
        }
    }
}

/// Save `file` atomically: a uniquely named temp file in the same directory,
/// then rename over `<path>`. Concurrent writers each get their own temp file.
pub fn save(path: &Path, file: &CacheFile) -> Result<(), StoreError> {
    let Some(dir) = path.parent() else {
        return Err(io_err(path, std::io::Error::other("invalid cache path")));
    };
    std::fs::create_dir_all(dir).map_err(|e| io_err(dir, e))?;

    let json = serde_json::to_string_pretty(file)?;
    let mut tmp = tempfile::Builder::new()
        .prefix(".holidays.")
        .suffix(".json.tmp")
        .tempfile_in(dir)
        .map_err(|e| io_err(dir, e))?;
    tmp.write_all(json.as_bytes())
        .and_then(|()| tmp.as_file().sync_all())
        .map_err(|e| io_err(tmp.path(), e))?;
    tmp.persist(path).map_err(|e| io_err(path, e.error))?;
    Ok(())
}

/// Hex SHA-256 over `records`, which must already be in canonical order.
pub fn digest_records(records: &[HolidayRecord]) -> String {
    let mut hasher = Sha256::new();
    for record in records {
        hasher.update(record.country.as_str().as_bytes());
        hasher.update([0x1f]);
        hasher.update(record.name.as_bytes());
        hasher.update([0x1f]);
        hasher.update(record.date.as_bytes());
        hasher.update([b'\n']);
    }
    hex::encode(hasher.finalize())
}

fn discard(path: &Path) -> Result<(), StoreError> {
    match std::fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(io_err(path, e)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use holidays_core::CountryCode;
    use tempfile::TempDir;

    fn record(country: &str, name: &str, date: &str) -> HolidayRecord {
        HolidayRecord::new(CountryCode::new(country).unwrap(), name, date).unwrap()
    }

    fn sample() -> CacheFile {
        let records = vec![record("US", "New Year", "2024-01-01")];
        CacheFile {
            schema_version: SCHEMA_VERSION,
            synced_at: Utc::now(),
            digest: digest_records(&records),
            records,
        }
    }

    #[test]
    fn missing_file_is_none() {
        let tmp = TempDir::new().unwrap();
        assert!(load(&cache_path_at(tmp.path())).unwrap().is_none());
    }

    #[test]
    fn save_then_load() {
        let tmp = TempDir::new().unwrap();
        let path = cache_path_at(tmp.path());
        let file = sample();
        save(&path, &file).unwrap();
        assert_eq!(load(&path).unwrap(), Some(file));

        let leftovers: Vec<_> = std::fs::read_dir(path.parent().unwrap())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().ends_with(".tmp"))
            .collect();
        assert!(leftovers.is_empty(), "temp files left behind: {leftovers:?}");
    }

    #[test]
    fn tampered_records_are_dropped() {
        let tmp = TempDir::new().unwrap();
        let path = cache_path_at(tmp.path());
        let mut file = sample();
        file.records.push(record("DE", "Neujahr", "2024-01-01"));
        save(&path, &file).unwrap();

        assert!(load(&path).unwrap().is_none());
        assert!(!path.exists(), "cache with a stale digest must be removed");
    }

    #[test]
    fn invalid_record_in_file_is_dropped() {
        let tmp = TempDir::new().unwrap();
        let path = cache_path_at(tmp.path());
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        let json = format!(
            r#"{{"schema_version":{SCHEMA_VERSION},"synced_at":"2024-01-01T00:00:00Z","digest":"x","records":[{{"country":"US","name":"","date":"2024-13-01"}}]}}"#
        );
        std::fs::write(&path, json).unwrap();

        assert!(load(&path).unwrap().is_none());
        assert!(!path.exists());
    }

    #[test]
    fn older_schema_is_dropped() {
        let tmp = TempDir::new().unwrap();
        let path = cache_path_at(tmp.path());
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, r#"{"schema_version": 2, "rows": []}"#).unwrap();

        assert!(load(&path).unwrap().is_none());
        assert!(!path.exists(), "stale cache must be removed");
    }

    #[test]
    fn garbage_is_dropped() {
        let tmp = TempDir::new().unwrap();
        let path = cache_path_at(tmp.path());
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, "not json at all").unwrap();

        assert!(load(&path).unwrap().is_none());
        assert!(!path.exists());
    }

    #[test]
    fn digest_depends_on_content() {
        let a = vec![record("US", "New Year", "2024-01-01")];
        let b = vec![record("US", "New Year", "2024-01-02")];
        assert_eq!(digest_records(&a), digest_records(&a.clone()));
        assert_ne!(digest_records(&a), digest_records(&b));
        assert_eq!(digest_records(&[]).len(), 64);
    }
}
