//! Holidays core library — domain types, settings persistence, errors.
//!
//! - [`types`] — `CountryCode`, `HolidayRecord`
//! - [`error`] — [`RecordError`], [`SettingsError`]
//! - [`settings`] — load / save / update of `~/.holidays/settings.yaml`

pub mod error;
pub mod settings;
pub mod types;

pub use error::{RecordError, SettingsError};
pub use settings::Settings;
pub use types::{CountryCode, HolidayRecord, DATE_FORMAT, KNOWN_COUNTRIES};
