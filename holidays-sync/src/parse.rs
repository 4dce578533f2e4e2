//! Record parser: one country's raw payload → flat list of holiday records.
//!
//! Expected shape, holidays grouped by date:
//!
//! ```json
//! {"holidays": {"2024-01-01": [{"name": "New Year", "date": "2024-01-01"}]}}
//! ```
//!
//! Every entry is kept; de-duplication is the store's job.

use serde_json::Value;

use holidays_core::{types::is_valid_date, CountryCode, HolidayRecord};

use crate::error::ParseError;
use crate::fetch::RawResponse;

const HOLIDAYS_KEY: &str = "holidays";
const NAME_KEY: &str = "name";
const DATE_KEY: &str = "date";

/// Parse a fetched payload, tagging every record with `country`.
pub fn parse(raw: &RawResponse, country: &CountryCode) -> Result<Vec<HolidayRecord>, ParseError> {
    parse_str(&raw.body, country)
}

/// Parse a JSON body directly.
pub fn parse_str(body: &str, country: &CountryCode) -> Result<Vec<HolidayRecord>, ParseError> {
    let root: Value = serde_json::from_str(body)
        .map_err(|e| ParseError::MalformedPayload(format!("invalid JSON: {e}")))?;

    let groups = root
        .get(HOLIDAYS_KEY)
        .ok_or_else(|| ParseError::MalformedPayload(format!("missing `{HOLIDAYS_KEY}` key")))?
        .as_object()
        .ok_or_else(|| {
            ParseError::MalformedPayload(format!("`{HOLIDAYS_KEY}` is not an object"))
        })?;

    let mut records = Vec::new();
    for (group, entries) in groups {
        let entries = entries.as_array().ok_or_else(|| {
            ParseError::MalformedPayload(format!("`{HOLIDAYS_KEY}.{group}` is not an array"))
        })?;

        for (index, entry) in entries.iter().enumerate() {
            let name = required_str(entry, NAME_KEY, group, index)?;
            let date = required_str(entry, DATE_KEY, group, index)?;
            if !is_valid_date(date) {
                return Err(ParseError::MalformedPayload(format!(
                    "entry {index} under '{group}' has date '{date}', expected YYYY-MM-DD"
                )));
            }
            records.push(HolidayRecord {
                country: country.clone(),
                name: name.to_string(),
                date: date.to_string(),
            });
        }
    }

    Ok(records)
}

fn required_str<'a>(
    entry: &'a Value,
    field: &'static str,
    group: &str,
    index: usize,
) -> Result<&'a str, ParseError> {
    entry
        .get(field)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| ParseError::MissingField {
            field,
            group: group.to_string(),
            index,
        })
}
