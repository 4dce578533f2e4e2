//! Daily check: which cached holidays fall on "today".
//!
//! The check only selects records; presenting them is a [`Notifier`]'s job.

use std::process::Command;
use std::sync::Arc;

use chrono::{Datelike, Local, NaiveDate};

use holidays_core::{CountryCode, Settings, DATE_FORMAT};

use crate::store::HolidayStore;

/// One holiday celebrated today.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HolidayNotice {
    pub country: CountryCode,
    pub name: String,
    pub date: String,
}

impl HolidayNotice {
    pub fn message(&self) -> String {
        format!("{} celebrated today!", self.name)
    }
}

/// Receives one call per matching holiday.
///
/// Delivery failures are the notifier's own business; the check never sees
/// them.
pub trait Notifier: Send + Sync {
    fn notify(&self, notice: &HolidayNotice);
}

/// Writes each notice to the log at `info`.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&self, notice: &HolidayNotice) {
        tracing::info!("[{}] {}", notice.country, notice.message());
    }
}

/// Runs an external program per notice.
///
/// The message is passed as the only argument; `HOLIDAY_NAME`,
/// `HOLIDAY_COUNTRY` and `HOLIDAY_DATE` are set in its environment.
#[derive(Debug, Clone)]
pub struct CommandNotifier {
    program: String,
}

impl CommandNotifier {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

impl Notifier for CommandNotifier {
    fn notify(&self, notice: &HolidayNotice) {
        let status = Command::new(&self.program)
            .arg(notice.message())
            .env("HOLIDAY_NAME", &notice.name)
            .env("HOLIDAY_COUNTRY", notice.country.as_str())
            .env("HOLIDAY_DATE", &notice.date)
            .status();
        match status {
            Ok(status) if status.success() => {}
            Ok(status) => tracing::warn!("notify command '{}' exited with {}", self.program, status),
            Err(e) => tracing::warn!("notify command '{}' failed to start: {}", self.program, e),
        }
    }
}

/// The notifier configured in `settings`: the external command when one is
/// set, the log otherwise.
pub fn notifier_for(settings: &Settings) -> Arc<dyn Notifier> {
    match settings.notify_command.as_deref().map(str::trim) {
        Some(program) if !program.is_empty() => Arc::new(CommandNotifier::new(program)),
        _ => Arc::new(LogNotifier),
    }
}

/// The date whose holidays count as "today".
///
/// With a pinned year the current month and day are moved into it, so a
/// cache synced for that year still matches. `None` when the day does not
/// exist in the pinned year (29 February).
pub fn check_date(today: NaiveDate, pinned_year: Option<i32>) -> Option<NaiveDate> {
    match pinned_year {
        Some(year) => NaiveDate::from_ymd_opt(year, today.month(), today.day()),
        None => Some(today),
    }
}

/// `today` in the stored date format.
pub fn date_key(date: NaiveDate) -> String {
    date.format(DATE_FORMAT).to_string()
}

pub struct DailyCheck {
    store: Arc<HolidayStore>,
}

impl DailyCheck {
    pub fn new(store: Arc<HolidayStore>) -> Self {
        Self { store }
    }

    /// Notify once per record dated `date`. Returns what was sent.
    pub fn run_for(&self, date: NaiveDate, notifier: &dyn Notifier) -> Vec<HolidayNotice> {
        let key = date_key(date);
        let notices: Vec<HolidayNotice> = self
            .store
            .query_by_date(&key)
            .into_iter()
            .map(|r| HolidayNotice {
                country: r.country,
                name: r.name,
                date: r.date,
            })
            .collect();

        tracing::debug!("daily check for {}: {} matches", key, notices.len());
        for notice in &notices {
            notifier.notify(notice);
        }
        notices
    }

    /// Run for the local date, honouring a pinned year in `settings`.
    pub fn run(&self, settings: &Settings, notifier: &dyn Notifier) -> Vec<HolidayNotice> {
        match check_date(Local::now().date_naive(), settings.year) {
            Some(date) => self.run_for(date, notifier),
            None => Vec::new(),
        }
    }
}
