//! Sync orchestration: fetch → parse → replace for every selected country.
//!
//! ```text
//! Idle ──trigger──▶ Fetching ──▶ Replacing ──▶ Done ──▶ Idle
//!                      │             │
//!                      └────────▶ Failed ◀┘ ──▶ Idle
//! ```
//!
//! At most one sync runs at a time. A trigger that finds one in flight returns
//! [`SyncOutcome::AlreadyRunning`] immediately; it is not queued.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use chrono::{DateTime, Local, NaiveTime, Utc};

use holidays_core::{settings, CountryCode, HolidayRecord, Settings, SettingsError};

use crate::error::{FetchError, ParseError};
use crate::fetch::HolidaySource;
use crate::observers::{Observers, SubscriptionId};
use crate::parse;
use crate::store::HolidayStore;

/// Shown to the user when a sync could not reach the API.
pub const NETWORK_PROBLEM_MESSAGE: &str = "Problem with network connection";

// ---------------------------------------------------------------------------
// Collaborators
// ---------------------------------------------------------------------------

/// Where the orchestrator reads the country selection and notification flag.
///
/// Polled once at the start of every sync.
pub trait PreferenceSource: Send + Sync {
    fn current(&self) -> Result<Settings, SettingsError>;
}

impl PreferenceSource for Settings {
    fn current(&self) -> Result<Settings, SettingsError> {
        Ok(self.clone())
    }
}

/// Reads `<home>/.holidays/settings.yaml` (plus env overrides) on every poll.
#[derive(Debug, Clone)]
pub struct SettingsFile {
    home: PathBuf,
}

impl SettingsFile {
    pub fn new(home: impl Into<PathBuf>) -> Self {
        Self { home: home.into() }
    }
}

impl PreferenceSource for SettingsFile {
    fn current(&self) -> Result<Settings, SettingsError> {
        Ok(settings::load_at(&self.home)?.with_env_overrides())
    }
}

/// The recurring trigger for the daily check.
pub trait DailySchedule: Send + Sync {
    /// Fire once a day at `at` local time, replacing any earlier arming.
    fn arm(&self, at: NaiveTime);
    fn cancel(&self);
}

/// A schedule that does nothing; used by one-shot callers such as the CLI.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoSchedule;

impl DailySchedule for NoSchedule {
    fn arm(&self, _at: NaiveTime) {}
    fn cancel(&self) {}
}

// ---------------------------------------------------------------------------
// Outcomes
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncPhase {
    Idle,
    Fetching,
    Replacing,
    Done,
    Failed,
}

/// What happened to one country during a sync.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CountryStatus {
    Synced { records: usize },
    FetchFailed(FetchError),
    ParseFailed(ParseError),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CountryReport {
    pub country: CountryCode,
    pub status: CountryStatus,
}

impl CountryReport {
    pub fn succeeded(&self) -> bool {
        matches!(self.status, CountryStatus::Synced { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncReport {
    pub year: i32,
    pub countries: Vec<CountryReport>,
    /// Records in the store after the replace (duplicates collapsed).
    pub records: usize,
    /// `false` when the fetched set equalled what was already cached.
    pub changed: bool,
    pub finished_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncFailure {
    /// The first country could not reach the API; nothing else was tried.
    NetworkUnavailable(FetchError),
    /// Every selected country failed to fetch or parse.
    AllCountriesFailed(Vec<CountryReport>),
    /// Settings could not be read.
    Preferences(String),
    /// The store rejected the replace; the previous cache is intact.
    Store(String),
}

impl SyncFailure {
    /// Short notice suitable for a toast or a CLI line.
    pub fn user_message(&self) -> &'static str {
        match self {
            SyncFailure::NetworkUnavailable(_) | SyncFailure::AllCountriesFailed(_) => {
                NETWORK_PROBLEM_MESSAGE
            }
            SyncFailure::Preferences(_) => "Could not read holiday settings",
            SyncFailure::Store(_) => "Could not update the holiday cache",
        }
    }
}

impl std::fmt::Display for SyncFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SyncFailure::NetworkUnavailable(e) => write!(f, "{e}"),
            SyncFailure::AllCountriesFailed(reports) => {
                write!(f, "all {} countries failed", reports.len())
            }
            SyncFailure::Preferences(msg) => write!(f, "settings: {msg}"),
            SyncFailure::Store(msg) => write!(f, "{msg}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncOutcome {
    AlreadyRunning,
    Done(SyncReport),
    Failed(SyncFailure),
}

/// The most recent finished sync, as far as this process knows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LastSync {
    Never,
    Done { at: DateTime<Utc>, records: usize },
    Failed { at: DateTime<Utc>, message: String },
}

// ---------------------------------------------------------------------------
// Orchestrator
// ---------------------------------------------------------------------------

pub struct SyncOrchestrator {
    store: Arc<HolidayStore>,
    source: Arc<dyn HolidaySource>,
    preferences: Arc<dyn PreferenceSource>,
    schedule: Arc<dyn DailySchedule>,
    in_flight: AtomicBool,
    fresh: AtomicBool,
    phase: Mutex<SyncPhase>,
    last_sync: Mutex<LastSync>,
    phase_observers: Observers<SyncPhase>,
}

impl SyncOrchestrator {
    pub fn new(
        store: Arc<HolidayStore>,
        source: Arc<dyn HolidaySource>,
        preferences: Arc<dyn PreferenceSource>,
        schedule: Arc<dyn DailySchedule>,
    ) -> Self {
        let last_sync = match store.synced_at() {
            Some(at) => LastSync::Done {
                at,
                records: store.len(),
            },
            None => LastSync::Never,
        };
        Self {
            store,
            source,
            preferences,
            schedule,
            in_flight: AtomicBool::new(false),
            fresh: AtomicBool::new(false),
            phase: Mutex::new(SyncPhase::Idle),
            last_sync: Mutex::new(last_sync),
            phase_observers: Observers::new(),
        }
    }

    pub fn store(&self) -> &Arc<HolidayStore> {
        &self.store
    }

    pub fn phase(&self) -> SyncPhase {
        *self.phase.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// `true` once a sync has completed in this process (or the cache was
    /// found populated by [`sync_if_empty`](Self::sync_if_empty)).
    pub fn is_fresh(&self) -> bool {
        self.fresh.load(Ordering::Acquire)
    }

    pub fn last_sync(&self) -> LastSync {
        self.last_sync
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn subscribe_phase(
        &self,
        callback: impl Fn(&SyncPhase) + Send + Sync + 'static,
    ) -> SubscriptionId {
        self.phase_observers.subscribe(callback)
    }

    pub fn unsubscribe_phase(&self, id: SubscriptionId) -> bool {
        self.phase_observers.unsubscribe(id)
    }

    /// Run a full sync unless one is already in flight.
    pub fn trigger(&self) -> SyncOutcome {
        let Some(_flight) = FlightGuard::acquire(self) else {
            tracing::debug!("sync already in flight; trigger ignored");
            return SyncOutcome::AlreadyRunning;
        };

        self.fresh.store(false, Ordering::Release);
        let outcome = self.run();

        let at = Utc::now();
        let last = match &outcome {
            SyncOutcome::Done(report) => {
                self.fresh.store(true, Ordering::Release);
                self.set_phase(SyncPhase::Done);
                Some(LastSync::Done {
                    at,
                    records: report.records,
                })
            }
            SyncOutcome::Failed(failure) => {
                tracing::warn!("sync failed: {}", failure);
                self.set_phase(SyncPhase::Failed);
                Some(LastSync::Failed {
                    at,
                    message: failure.to_string(),
                })
            }
            SyncOutcome::AlreadyRunning => None,
        };
        if let Some(last) = last {
            *self.last_sync.lock().unwrap_or_else(PoisonError::into_inner) = last;
        }
        outcome
    }

    /// Startup trigger: sync only when the cache holds nothing.
    ///
    /// Returns `None` when the cache was already populated; in that case the
    /// cache counts as fresh and the daily schedule is applied from settings.
    pub fn sync_if_empty(&self) -> Option<SyncOutcome> {
        if self.store.is_empty() {
            return Some(self.trigger());
        }
        tracing::debug!("cache holds {} records; startup sync skipped", self.store.len());
        self.fresh.store(true, Ordering::Release);
        match self.preferences.current() {
            Ok(settings) => self.apply_schedule(&settings),
            Err(e) => tracing::warn!("cannot read settings for daily schedule: {}", e),
        }
        None
    }

    fn run(&self) -> SyncOutcome {
        let settings = match self.preferences.current() {
            Ok(settings) => settings,
            Err(e) => return SyncOutcome::Failed(SyncFailure::Preferences(e.to_string())),
        };
        self.source.reconfigure(&settings);

        self.set_phase(SyncPhase::Fetching);
        let year = settings.sync_year(Local::now().date_naive());
        tracing::info!(
            "sync started: year {} countries [{}]",
            year,
            join_codes(&settings.countries)
        );

        let mut union: Vec<HolidayRecord> = Vec::new();
        let mut reports = Vec::with_capacity(settings.countries.len());

        for (index, country) in settings.countries.iter().enumerate() {
            let status = match self.source.fetch(country, year) {
                Err(e @ FetchError::NetworkUnavailable(_)) if index == 0 => {
                    tracing::warn!("{}: {}; aborting sync", country, e);
                    return SyncOutcome::Failed(SyncFailure::NetworkUnavailable(e));
                }
                Err(e) => {
                    tracing::warn!("{}: fetch failed: {}", country, e);
                    CountryStatus::FetchFailed(e)
                }
                Ok(raw) => match parse::parse(&raw, country) {
                    Ok(records) => {
                        tracing::debug!("{}: {} records", country, records.len());
                        let count = records.len();
                        union.extend(records);
                        CountryStatus::Synced { records: count }
                    }
                    Err(e) => {
                        tracing::warn!("{}: parse failed: {}", country, e);
                        CountryStatus::ParseFailed(e)
                    }
                },
            };
            reports.push(CountryReport {
                country: country.clone(),
                status,
            });
        }

        if !reports.is_empty() && !reports.iter().any(CountryReport::succeeded) {
            return SyncOutcome::Failed(SyncFailure::AllCountriesFailed(reports));
        }

        self.set_phase(SyncPhase::Replacing);
        let summary = match self.store.replace_all(union) {
            Ok(summary) => summary,
            Err(e) => return SyncOutcome::Failed(SyncFailure::Store(e.to_string())),
        };

        self.apply_schedule(&settings);
        tracing::info!(
            "sync done: {} records from {}/{} countries",
            summary.records,
            reports.iter().filter(|r| r.succeeded()).count(),
            reports.len()
        );
        SyncOutcome::Done(SyncReport {
            year,
            countries: reports,
            records: summary.records,
            changed: summary.changed,
            finished_at: Utc::now(),
        })
    }

    fn apply_schedule(&self, settings: &Settings) {
        if !settings.notifications_enabled {
            self.schedule.cancel();
            return;
        }
        match settings.notify_time() {
            Ok(at) => self.schedule.arm(at),
            Err(e) => {
                tracing::warn!("daily check not armed: {}", e);
                self.schedule.cancel();
            }
        }
    }

    fn set_phase(&self, phase: SyncPhase) {
        *self.phase.lock().unwrap_or_else(PoisonError::into_inner) = phase;
        self.phase_observers.notify(&phase);
    }
}

fn join_codes(countries: &[CountryCode]) -> String {
    countries
        .iter()
        .map(CountryCode::as_str)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Holds the single-flight flag; on drop (including unwinding) the phase
/// returns to `Idle` and the flag is released.
struct FlightGuard<'a> {
    owner: &'a SyncOrchestrator,
}

impl<'a> FlightGuard<'a> {
    fn acquire(owner: &'a SyncOrchestrator) -> Option<Self> {
        owner
            .in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self { owner })
    }
}

impl Drop for FlightGuard<'_> {
    fn drop(&mut self) {
        self.owner.set_phase(SyncPhase::Idle);
        self.owner.in_flight.store(false, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetch::RawResponse;
    use crate::store::SortOrder;
    use std::collections::HashMap;

    fn code(s: &str) -> CountryCode {
        CountryCode::new(s).unwrap()
    }

    /// Canned per-country answers.
    struct Canned(HashMap<String, Result<String, FetchError>>);

    impl Canned {
        fn new(entries: &[(&str, Result<&str, FetchError>)]) -> Self {
            Self(
                entries
                    .iter()
                    .map(|(c, r)| (c.to_string(), r.clone().map(str::to_string)))
                    .collect(),
            )
        }
    }

    impl HolidaySource for Canned {
        fn fetch(&self, country: &CountryCode, year: i32) -> Result<RawResponse, FetchError> {
            match self.0.get(country.as_str()) {
                Some(Ok(body)) => Ok(RawResponse {
                    country: country.clone(),
                    year,
                    body: body.clone(),
                }),
                Some(Err(e)) => Err(e.clone()),
                None => Err(FetchError::ServerError { status: 404 }),
            }
        }
    }

    #[derive(Default)]
    struct RecordingSchedule(Mutex<Vec<Option<NaiveTime>>>);

    impl DailySchedule for RecordingSchedule {
        fn arm(&self, at: NaiveTime) {
            self.0.lock().unwrap().push(Some(at));
        }
        fn cancel(&self) {
            self.0.lock().unwrap().push(None);
        }
    }

    fn settings(countries: &[&str], notifications: bool) -> Settings {
        Settings {
            countries: countries.iter().map(|c| code(c)).collect(),
            notifications_enabled: notifications,
            year: Some(2017),
            ..Settings::default()
        }
    }

    const US: &str = r#"{"holidays":{"2017-07-04":[{"name":"Independence Day","date":"2017-07-04"}]}}"#;

    #[test]
    fn done_sync_arms_schedule_and_marks_fresh() {
        let store = Arc::new(HolidayStore::in_memory());
        let schedule = Arc::new(RecordingSchedule::default());
        let orchestrator = SyncOrchestrator::new(
            Arc::clone(&store),
            Arc::new(Canned::new(&[("US", Ok(US))])),
            Arc::new(settings(&["US"], true)),
            schedule.clone(),
        );
        assert_eq!(orchestrator.last_sync(), LastSync::Never);
        assert!(!orchestrator.is_fresh());

        let SyncOutcome::Done(report) = orchestrator.trigger() else {
            panic!("expected Done");
        };
        assert_eq!(report.year, 2017);
        assert_eq!(report.records, 1);
        assert!(orchestrator.is_fresh());
        assert_eq!(orchestrator.phase(), SyncPhase::Idle);
        assert!(matches!(
            orchestrator.last_sync(),
            LastSync::Done { records: 1, .. }
        ));
        assert_eq!(
            *schedule.0.lock().unwrap(),
            vec![NaiveTime::from_hms_opt(9, 0, 0)]
        );
    }

    #[test]
    fn notifications_off_cancels_schedule() {
        let schedule = Arc::new(RecordingSchedule::default());
        let orchestrator = SyncOrchestrator::new(
            Arc::new(HolidayStore::in_memory()),
            Arc::new(Canned::new(&[("US", Ok(US))])),
            Arc::new(settings(&["US"], false)),
            schedule.clone(),
        );
        orchestrator.trigger();
        assert_eq!(*schedule.0.lock().unwrap(), vec![None]);
    }

    #[test]
    fn empty_selection_clears_store() {
        let store = Arc::new(HolidayStore::in_memory());
        store
            .replace_all(vec![HolidayRecord::new(code("US"), "X", "2017-01-01").unwrap()])
            .unwrap();
        let orchestrator = SyncOrchestrator::new(
            Arc::clone(&store),
            Arc::new(Canned::new(&[])),
            Arc::new(settings(&[], true)),
            Arc::new(NoSchedule),
        );
        assert!(matches!(orchestrator.trigger(), SyncOutcome::Done(_)));
        assert!(store.query_all(SortOrder::default()).is_empty());
    }

    #[test]
    fn phases_are_published_in_order() {
        let orchestrator = SyncOrchestrator::new(
            Arc::new(HolidayStore::in_memory()),
            Arc::new(Canned::new(&[("US", Ok(US))])),
            Arc::new(settings(&["US"], true)),
            Arc::new(NoSchedule),
        );
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        orchestrator.subscribe_phase(move |p| sink.lock().unwrap().push(*p));

        orchestrator.trigger();
        assert_eq!(
            *seen.lock().unwrap(),
            vec![
                SyncPhase::Fetching,
                SyncPhase::Replacing,
                SyncPhase::Done,
                SyncPhase::Idle
            ]
        );
    }

    #[test]
    fn failed_sync_publishes_failed_then_idle() {
        let orchestrator = SyncOrchestrator::new(
            Arc::new(HolidayStore::in_memory()),
            Arc::new(Canned::new(&[(
                "US",
                Err(FetchError::NetworkUnavailable("offline".into())),
            )])),
            Arc::new(settings(&["US"], true)),
            Arc::new(NoSchedule),
        );
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        orchestrator.subscribe_phase(move |p| sink.lock().unwrap().push(*p));

        let outcome = orchestrator.trigger();
        let SyncOutcome::Failed(failure) = outcome else {
            panic!("expected Failed");
        };
        assert_eq!(failure.user_message(), NETWORK_PROBLEM_MESSAGE);
        assert_eq!(
            *seen.lock().unwrap(),
            vec![SyncPhase::Fetching, SyncPhase::Failed, SyncPhase::Idle]
        );
        assert!(matches!(orchestrator.last_sync(), LastSync::Failed { .. }));
        assert!(!orchestrator.is_fresh());
    }

    #[test]
    fn sync_if_empty_skips_populated_cache() {
        let store = Arc::new(HolidayStore::in_memory());
        store
            .replace_all(vec![HolidayRecord::new(code("US"), "X", "2017-01-01").unwrap()])
            .unwrap();
        let schedule = Arc::new(RecordingSchedule::default());
        let orchestrator = SyncOrchestrator::new(
            Arc::clone(&store),
            Arc::new(Canned::new(&[])),
            Arc::new(settings(&["US"], true)),
            schedule.clone(),
        );
        assert!(matches!(
            orchestrator.last_sync(),
            LastSync::Done { records: 1, .. }
        ));
        assert_eq!(orchestrator.sync_if_empty(), None);
        assert!(orchestrator.is_fresh());
        assert_eq!(schedule.0.lock().unwrap().len(), 1);
    }

    #[test]
    fn sync_if_empty_runs_on_empty_cache() {
        let orchestrator = SyncOrchestrator::new(
            Arc::new(HolidayStore::in_memory()),
            Arc::new(Canned::new(&[("US", Ok(US))])),
            Arc::new(settings(&["US"], true)),
            Arc::new(NoSchedule),
        );
        assert!(matches!(
            orchestrator.sync_if_empty(),
            Some(SyncOutcome::Done(_))
        ));
    }

    struct Panicking;

    impl HolidaySource for Panicking {
        fn fetch(&self, _: &CountryCode, _: i32) -> Result<RawResponse, FetchError> {
            panic!("source blew up");
        }
    }

    #[test]
    fn panic_releases_single_flight_flag() {
        let orchestrator = SyncOrchestrator::new(
            Arc::new(HolidayStore::in_memory()),
            Arc::new(Panicking),
            Arc::new(settings(&["US"], true)),
            Arc::new(NoSchedule),
        );
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            orchestrator.trigger();
        }));
        assert!(result.is_err());
        assert_eq!(orchestrator.phase(), SyncPhase::Idle);
        assert!(!orchestrator.in_flight.load(Ordering::Acquire));
    }
}
