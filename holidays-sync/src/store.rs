//! The authoritative local holiday cache.
//!
//! Readers take an `Arc` of the current [`Snapshot`] and never block on a
//! replace in progress. `replace_all` builds the next snapshot off to the side,
//! persists it, and only then swaps it in, so a reader sees either the old set
//! or the new one.

use std::cmp::Ordering;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use chrono::{DateTime, Utc};

use holidays_core::HolidayRecord;

use crate::cache_file::{self, CacheFile, SCHEMA_VERSION};
use crate::error::StoreError;
use crate::observers::{Observers, SubscriptionId};

// ---------------------------------------------------------------------------
// Snapshot
// ---------------------------------------------------------------------------

/// Point-in-time view of the cache.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Snapshot {
    /// De-duplicated records in canonical order (date, country, name).
    records: Vec<HolidayRecord>,
    /// When the snapshot was installed by a sync; `None` if never synced.
    pub synced_at: Option<DateTime<Utc>>,
    pub digest: String,
}

impl Snapshot {
    fn empty() -> Self {
        Self {
            records: Vec::new(),
            synced_at: None,
            digest: cache_file::digest_records(&[]),
        }
    }

    pub fn records(&self) -> &[HolidayRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// Ordering for [`HolidayStore::query_all`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SortOrder {
    #[default]
    DateAscending,
    DateDescending,
    CountryThenDate,
}

impl SortOrder {
    fn compare(self, a: &HolidayRecord, b: &HolidayRecord) -> Ordering {
        match self {
            SortOrder::DateAscending => canonical(a, b),
            SortOrder::DateDescending => canonical(b, a),
            SortOrder::CountryThenDate => a
                .country
                .cmp(&b.country)
                .then_with(|| a.date.cmp(&b.date))
                .then_with(|| a.name.cmp(&b.name)),
        }
    }
}

fn canonical(a: &HolidayRecord, b: &HolidayRecord) -> Ordering {
    a.date
        .cmp(&b.date)
        .then_with(|| a.country.cmp(&b.country))
        .then_with(|| a.name.cmp(&b.name))
}

/// Published to subscribers after every completed `replace_all`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreChanged {
    pub records: usize,
    /// `false` when the new set equals the previous one.
    pub changed: bool,
}

/// Result of a `replace_all`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReplaceSummary {
    pub records: usize,
    pub changed: bool,
}

// ---------------------------------------------------------------------------
// Store
// ---------------------------------------------------------------------------

pub struct HolidayStore {
    /// `None` for a purely in-memory store.
    path: Option<PathBuf>,
    current: RwLock<Arc<Snapshot>>,
    /// Serializes writers across persist + swap.
    write_lock: Mutex<()>,
    observers: Observers<StoreChanged>,
}

impl HolidayStore {
    /// A store that never touches disk.
    pub fn in_memory() -> Self {
        Self::with_snapshot(None, Snapshot::empty())
    }

    /// Open the cache stored under `<home>/.holidays/cache/`.
    pub fn open_at(home: &Path) -> Result<Self, StoreError> {
        Self::open(cache_file::cache_path_at(home))
    }

    /// Open (or start) a persisted store at `path`.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        let snapshot = match cache_file::load(&path)? {
            Some(file) => {
                let records = normalize(file.records);
                let digest = cache_file::digest_records(&records);
                Snapshot {
                    records,
                    synced_at: Some(file.synced_at),
                    digest,
                }
            }
            None => Snapshot::empty(),
        };
        tracing::debug!(
            "opened holiday store {} ({} records)",
            path.display(),
            snapshot.len()
        );
        Ok(Self::with_snapshot(Some(path), snapshot))
    }

    fn with_snapshot(path: Option<PathBuf>, snapshot: Snapshot) -> Self {
        Self {
            path,
            current: RwLock::new(Arc::new(snapshot)),
            write_lock: Mutex::new(()),
            observers: Observers::new(),
        }
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Discard the whole cache and install `records` in its place.
    ///
    /// Duplicates (same country, name and date) collapse to one record. On a
    /// persistence failure the previous snapshot stays in place.
    pub fn replace_all(&self, records: Vec<HolidayRecord>) -> Result<ReplaceSummary, StoreError> {
        let _writer = self.write_lock.lock().unwrap_or_else(PoisonError::into_inner);

        let records = normalize(records);
        let digest = cache_file::digest_records(&records);
        let synced_at = Utc::now();
        let changed = digest != self.snapshot().digest;

        if let Some(path) = &self.path {
            let file = CacheFile {
                schema_version: SCHEMA_VERSION,
                synced_at,
                digest: digest.clone(),
                records: records.clone(),
            };
            cache_file::save(path, &file)?;
        }

        let summary = ReplaceSummary {
            records: records.len(),
            changed,
        };
        let next = Arc::new(Snapshot {
            records,
            synced_at: Some(synced_at),
            digest,
        });
        *self.current.write().unwrap_or_else(PoisonError::into_inner) = next;

        tracing::info!(
            "holiday store replaced: {} records ({})",
            summary.records,
            if changed { "changed" } else { "unchanged" }
        );
        self.observers.notify(&StoreChanged {
            records: summary.records,
            changed,
        });
        Ok(summary)
    }

    /// The current snapshot. Cheap; clones an `Arc`.
    pub fn snapshot(&self) -> Arc<Snapshot> {
        Arc::clone(&*self.current.read().unwrap_or_else(PoisonError::into_inner))
    }

    /// Every record, sorted by `order`, from one consistent snapshot.
    pub fn query_all(&self, order: SortOrder) -> Vec<HolidayRecord> {
        let snapshot = self.snapshot();
        let mut records = snapshot.records.clone();
        if order != SortOrder::DateAscending {
            records.sort_by(|a, b| order.compare(a, b));
        }
        records
    }

    /// Records whose date is exactly `date` (`YYYY-MM-DD`).
    pub fn query_by_date(&self, date: &str) -> Vec<HolidayRecord> {
        self.snapshot()
            .records
            .iter()
            .filter(|r| r.date == date)
            .cloned()
            .collect()
    }

    /// First record (in date order) named `name`.
    ///
    /// Exact matches win; otherwise a case-insensitive match is accepted.
    pub fn query_by_name(&self, name: &str) -> Option<HolidayRecord> {
        let snapshot = self.snapshot();
        let name = name.trim();
        snapshot
            .records
            .iter()
            .find(|r| r.name == name)
            .or_else(|| {
                let lowered = name.to_lowercase();
                snapshot
                    .records
                    .iter()
                    .find(|r| r.name.to_lowercase() == lowered)
            })
            .cloned()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshot().is_empty()
    }

    pub fn len(&self) -> usize {
        self.snapshot().len()
    }

    pub fn synced_at(&self) -> Option<DateTime<Utc>> {
        self.snapshot().synced_at
    }

    /// Register `callback` to run after every completed `replace_all`.
    pub fn subscribe(
        &self,
        callback: impl Fn(&StoreChanged) + Send + Sync + 'static,
    ) -> SubscriptionId {
        self.observers.subscribe(callback)
    }

    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.observers.unsubscribe(id)
    }
}

/// Collapse duplicates and sort canonically.
fn normalize(records: Vec<HolidayRecord>) -> Vec<HolidayRecord> {
    let mut seen = HashSet::with_capacity(records.len());
    let mut unique: Vec<HolidayRecord> = records
        .into_iter()
        .filter(|r| seen.insert(r.clone()))
        .collect();
    unique.sort_by(canonical);
    unique
}
