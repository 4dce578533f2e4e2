//! # holidays-sync
//!
//! Fetch, parse and cache public holidays, and decide which of them fall on
//! today.
//!
//! [`Engine`] wires the pieces for a home directory; the individual modules
//! can be used on their own with substitute collaborators.

mod cache_file;
pub mod daily;
pub mod error;
pub mod fetch;
mod observers;
pub mod orchestrator;
pub mod parse;
pub mod pipeline;
pub mod store;

pub use cache_file::{cache_path_at, SCHEMA_VERSION};
pub use daily::{CommandNotifier, DailyCheck, HolidayNotice, LogNotifier, Notifier};
pub use error::{FetchError, ParseError, StoreError, SyncError};
pub use fetch::{HolidaySource, HttpFetchClient, RawResponse};
pub use observers::SubscriptionId;
pub use orchestrator::{
    CountryReport, CountryStatus, DailySchedule, LastSync, NoSchedule, PreferenceSource,
    SettingsFile, SyncFailure, SyncOrchestrator, SyncOutcome, SyncPhase, SyncReport,
    NETWORK_PROBLEM_MESSAGE,
};
pub use pipeline::Engine;
pub use store::{HolidayStore, ReplaceSummary, Snapshot, SortOrder, StoreChanged};
