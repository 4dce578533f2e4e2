//! Shared engine wiring used by the CLI and the daemon.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::NaiveDate;

use holidays_core::{settings, Settings};

use crate::daily::{self, DailyCheck, HolidayNotice};
use crate::error::SyncError;
use crate::fetch::{HolidaySource, HttpFetchClient};
use crate::orchestrator::{DailySchedule, SettingsFile, SyncOrchestrator, SyncOutcome};
use crate::store::HolidayStore;

/// Store, orchestrator and daily check rooted at one home directory.
pub struct Engine {
    home: PathBuf,
    store: Arc<HolidayStore>,
    orchestrator: Arc<SyncOrchestrator>,
    daily: DailyCheck,
}

impl Engine {
    /// Open the persisted cache under `home` and wire a network-backed
    /// orchestrator that re-reads `settings.yaml` on every sync.
    pub fn open_at(home: &Path, schedule: Arc<dyn DailySchedule>) -> Result<Self, SyncError> {
        let initial = load_settings(home)?;
        let source: Arc<dyn HolidaySource> = Arc::new(HttpFetchClient::from_settings(&initial));
        Self::with_source(home, source, schedule)
    }

    /// `open_at` convenience wrapper.
    pub fn open(schedule: Arc<dyn DailySchedule>) -> Result<Self, SyncError> {
        Self::open_at(&settings::home()?, schedule)
    }

    /// Like [`open_at`](Self::open_at) but fetching through `source`.
    pub fn with_source(
        home: &Path,
        source: Arc<dyn HolidaySource>,
        schedule: Arc<dyn DailySchedule>,
    ) -> Result<Self, SyncError> {
        let store = Arc::new(HolidayStore::open_at(home)?);
        let orchestrator = Arc::new(SyncOrchestrator::new(
            Arc::clone(&store),
            source,
            Arc::new(SettingsFile::new(home)),
            schedule,
        ));
        Ok(Self {
            home: home.to_path_buf(),
            daily: DailyCheck::new(Arc::clone(&store)),
            store,
            orchestrator,
        })
    }

    pub fn home(&self) -> &Path {
        &self.home
    }

    pub fn store(&self) -> &Arc<HolidayStore> {
        &self.store
    }

    pub fn orchestrator(&self) -> &Arc<SyncOrchestrator> {
        &self.orchestrator
    }

    /// Current settings with environment overrides applied.
    pub fn settings(&self) -> Result<Settings, SyncError> {
        load_settings(&self.home)
    }

    pub fn sync(&self) -> SyncOutcome {
        self.orchestrator.trigger()
    }

    /// Run the daily check for the local date (or `today` when given),
    /// delivering through the notifier configured in settings.
    pub fn run_daily_check(&self, today: Option<NaiveDate>) -> Result<Vec<HolidayNotice>, SyncError> {
        let settings = self.settings()?;
        let notifier = daily::notifier_for(&settings);
        let notices = match today {
            Some(today) => match daily::check_date(today, settings.year) {
                Some(date) => self.daily.run_for(date, notifier.as_ref()),
                None => Vec::new(),
            },
            None => self.daily.run(&settings, notifier.as_ref()),
        };
        Ok(notices)
    }
}

fn load_settings(home: &Path) -> Result<Settings, SyncError> {
    Ok(settings::load_at(home)?.with_env_overrides())
}
