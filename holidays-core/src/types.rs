//! Domain types for the holiday cache.
//!
//! Dates stay in their wire form (`YYYY-MM-DD`) so that string comparison
//! against "today" is enough; validation happens once, at construction.

use std::fmt;
use std::str::FromStr;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::error::RecordError;

/// Storage and comparison format for holiday dates.
pub const DATE_FORMAT: &str = "%Y-%m-%d";

/// Countries the holiday API is known to serve, with display names.
pub const KNOWN_COUNTRIES: &[(&str, &str)] = &[
    ("US", "United States"),
    ("RU", "Russian Federation"),
    ("CN", "China"),
    ("DE", "Germany"),
    ("ES", "Spain"),
    ("FR", "France"),
    ("JP", "Japan"),
];

// ---------------------------------------------------------------------------
// Newtypes
// ---------------------------------------------------------------------------

/// An upper-cased ISO 3166 country code (alpha-2 or alpha-3).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct CountryCode(String);

impl CountryCode {
    pub fn new(code: &str) -> Result<Self, RecordError> {
        let trimmed = code.trim();
        let valid = (2..=3).contains(&trimmed.len())
            && trimmed.chars().all(|c| c.is_ascii_alphabetic());
        if !valid {
            return Err(RecordError::InvalidCountry(code.to_owned()));
        }
        Ok(Self(trimmed.to_ascii_uppercase()))
    }

    /// Build from a code already known to be valid upper-case ASCII.
    pub(crate) fn known(code: &'static str) -> Self {
        Self(code.to_owned())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Display name when the code is one of [`KNOWN_COUNTRIES`].
    pub fn display_name(&self) -> Option<&'static str> {
        KNOWN_COUNTRIES
            .iter()
            .find(|(code, _)| *code == self.0)
            .map(|(_, name)| *name)
    }
}

impl fmt::Display for CountryCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for CountryCode {
    type Err = RecordError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<String> for CountryCode {
    type Error = RecordError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::new(&s)
    }
}

impl From<CountryCode> for String {
    fn from(code: CountryCode) -> Self {
        code.0
    }
}

// ---------------------------------------------------------------------------
// Records
// ---------------------------------------------------------------------------

/// One celebrated day in one country.
///
/// Identity is the whole triple: two records with the same country, name and
/// date are the same holiday.
/// Deserialization goes through [`HolidayRecord::new`], so a record read back
/// from disk is held to the same rules as one built in code.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "RawHolidayRecord")]
pub struct HolidayRecord {
    pub country: CountryCode,
    pub name: String,
    pub date: String,
}

#[derive(Deserialize)]
struct RawHolidayRecord {
    country: CountryCode,
    name: String,
    date: String,
}

impl TryFrom<RawHolidayRecord> for HolidayRecord {
    type Error = RecordError;

    fn try_from(raw: RawHolidayRecord) -> Result<Self, Self::Error> {
        Self::new(raw.country, raw.name, raw.date)
    }
}

impl HolidayRecord {
    /// Build a record, rejecting an empty name or a date not in `YYYY-MM-DD`.
    pub fn new(
        country: CountryCode,
        name: impl Into<String>,
        date: impl Into<String>,
    ) -> Result<Self, RecordError> {
        let name = name.into();
        let date = date.into();
        if name.trim().is_empty() {
            return Err(RecordError::EmptyName);
        }
        if !is_valid_date(&date) {
            return Err(RecordError::InvalidDate(date));
        }
        Ok(Self {
            country,
            name,
            date,
        })
    }

    /// The calendar date, if the stored string parses.
    pub fn naive_date(&self) -> Option<NaiveDate> {
        NaiveDate::parse_from_str(&self.date, DATE_FORMAT).ok()
    }
}

/// `true` when `date` is a real calendar date written exactly as `YYYY-MM-DD`.
pub fn is_valid_date(date: &str) -> bool {
    date.len() == 10 && NaiveDate::parse_from_str(date, DATE_FORMAT).is_ok()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
