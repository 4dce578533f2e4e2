//! Subcommand implementations plus the helpers they share.

pub mod config;
pub mod daemon;
pub mod list;
pub mod show;
pub mod status;
pub mod sync;
pub mod today;

use std::path::PathBuf;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tabled::{settings::Style, Table, Tabled};

use holidays_core::HolidayRecord;

pub(crate) fn home() -> Result<PathBuf> {
    dirs::home_dir().context("could not determine home directory")
}

#[derive(Tabled)]
struct RecordRow {
    #[tabled(rename = "date")]
    date: String,
    #[tabled(rename = "country")]
    country: String,
    #[tabled(rename = "holiday")]
    name: String,
}

/// Rounded table of records, in the order given.
pub(crate) fn print_records(records: &[HolidayRecord]) {
    let rows: Vec<RecordRow> = records
        .iter()
        .map(|r| RecordRow {
            date: r.date.clone(),
            country: r.country.to_string(),
            name: r.name.clone(),
        })
        .collect();
    let mut table = Table::new(rows);
    table.with(Style::rounded());
    println!("{table}");
}

pub(crate) fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    println!(
        "{}",
        serde_json::to_string_pretty(value).context("failed to serialize JSON output")?
    );
    Ok(())
}

/// "just now", "5m ago", "3h ago", "2d ago".
pub(crate) fn format_age(at: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let secs = (now - at).num_seconds().max(0);
    match secs {
        0..=59 => "just now".to_string(),
        60..=3599 => format!("{}m ago", secs / 60),
        3600..=86_399 => format!("{}h ago", secs / 3600),
        _ => format!("{}d ago", secs / 86_400),
    }
}
