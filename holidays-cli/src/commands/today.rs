//! `holidays today` — run the daily check now.

use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::NaiveDate;
use clap::Args;
use colored::Colorize;
use serde::Serialize;

use holidays_core::DATE_FORMAT;
use holidays_sync::{daily, Engine, HolidayNotice, NoSchedule};

use super::{home, print_json};

#[derive(Args, Debug)]
pub struct TodayArgs {
    /// Check this date instead of the local date.
    #[arg(long, value_parser = parse_date)]
    pub date: Option<NaiveDate>,

    /// Print matches without sending notifications.
    #[arg(long)]
    pub no_notify: bool,

    /// Emit machine-readable JSON.
    #[arg(long)]
    pub json: bool,
}

#[derive(Serialize)]
struct NoticeJson {
    country: String,
    name: String,
    date: String,
    message: String,
}

impl From<&HolidayNotice> for NoticeJson {
    fn from(notice: &HolidayNotice) -> Self {
        Self {
            country: notice.country.to_string(),
            name: notice.name.clone(),
            date: notice.date.clone(),
            message: notice.message(),
        }
    }
}

impl TodayArgs {
    pub fn run(self) -> Result<()> {
        let home = home()?;
        let engine =
            Engine::open_at(&home, Arc::new(NoSchedule)).context("failed to open holiday cache")?;
        let settings = engine.settings().context("failed to load settings")?;

        let notices = if self.no_notify || !settings.notifications_enabled {
            let today = self
                .date
                .unwrap_or_else(|| chrono::Local::now().date_naive());
            match daily::check_date(today, settings.year) {
                Some(date) => daily::DailyCheck::new(Arc::clone(engine.store()))
                    .run_for(date, &Silent),
                None => Vec::new(),
            }
        } else {
            engine
                .run_daily_check(self.date)
                .context("daily check failed")?
        };

        if self.json {
            let payload: Vec<NoticeJson> = notices.iter().map(NoticeJson::from).collect();
            return print_json(&payload);
        }
        if notices.is_empty() {
            println!("No holidays today.");
            return Ok(());
        }
        for notice in &notices {
            println!("{} {}", format!("[{}]", notice.country).cyan(), notice.message());
        }
        Ok(())
    }
}

struct Silent;

impl daily::Notifier for Silent {
    fn notify(&self, _notice: &HolidayNotice) {}
}

fn parse_date(s: &str) -> Result<NaiveDate, String> {
    NaiveDate::parse_from_str(s, DATE_FORMAT).map_err(|e| format!("'{s}' is not YYYY-MM-DD ({e})"))
}
