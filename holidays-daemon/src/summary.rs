//! Serializable views of engine state, shared by the socket protocol and the
//! CLI's `--json` output.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use holidays_sync::{CountryStatus, LastSync, SyncOutcome, SyncPhase};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CountrySummary {
    pub country: String,
    pub ok: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub records: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// One sync attempt, flattened for display.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncSummary {
    /// What asked for the sync: `cli`, `socket`, `watcher`, `startup`.
    pub source: String,
    /// `done`, `failed` or `already_running`.
    pub outcome: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub year: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub records: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub changed: Option<bool>,
    #[serde(default)]
    pub countries: Vec<CountrySummary>,
    /// User-facing notice for a failed sync.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    pub duration_ms: u128,
}

impl SyncSummary {
    pub fn from_outcome(outcome: &SyncOutcome, source: &str, duration: Duration) -> Self {
        let mut summary = Self {
            source: source.to_string(),
            outcome: String::new(),
            year: None,
            records: None,
            changed: None,
            countries: Vec::new(),
            message: None,
            detail: None,
            duration_ms: duration.as_millis(),
        };
        match outcome {
            SyncOutcome::AlreadyRunning => summary.outcome = "already_running".to_string(),
            SyncOutcome::Done(report) => {
                summary.outcome = "done".to_string();
                summary.year = Some(report.year);
                summary.records = Some(report.records);
                summary.changed = Some(report.changed);
                summary.countries = report.countries.iter().map(country_summary).collect();
            }
            SyncOutcome::Failed(failure) => {
                summary.outcome = "failed".to_string();
                summary.message = Some(failure.user_message().to_string());
                summary.detail = Some(failure.to_string());
                if let holidays_sync::SyncFailure::AllCountriesFailed(reports) = failure {
                    summary.countries = reports.iter().map(country_summary).collect();
                }
            }
        }
        summary
    }

    pub fn is_failed(&self) -> bool {
        self.outcome == "failed"
    }
}

fn country_summary(report: &holidays_sync::CountryReport) -> CountrySummary {
    let (ok, records, error) = match &report.status {
        CountryStatus::Synced { records } => (true, Some(*records), None),
        CountryStatus::FetchFailed(e) => (false, None, Some(e.to_string())),
        CountryStatus::ParseFailed(e) => (false, None, Some(e.to_string())),
    };
    CountrySummary {
        country: report.country.to_string(),
        ok,
        records,
        error,
    }
}

/// [`LastSync`] as JSON: `{"state":"never"}`, `{"state":"done",...}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum LastSyncSummary {
    Never,
    Done { at: DateTime<Utc>, records: usize },
    Failed { at: DateTime<Utc>, message: String },
}

impl From<&LastSync> for LastSyncSummary {
    fn from(last: &LastSync) -> Self {
        match last {
            LastSync::Never => Self::Never,
            LastSync::Done { at, records } => Self::Done {
                at: *at,
                records: *records,
            },
            LastSync::Failed { at, message } => Self::Failed {
                at: *at,
                message: message.clone(),
            },
        }
    }
}

pub fn phase_label(phase: SyncPhase) -> &'static str {
    match phase {
        SyncPhase::Idle => "idle",
        SyncPhase::Fetching => "fetching",
        SyncPhase::Replacing => "replacing",
        SyncPhase::Done => "done",
        SyncPhase::Failed => "failed",
    }
}
