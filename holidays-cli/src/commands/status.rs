//! `holidays status` — cache freshness, settings and daemon visibility.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use clap::Args;
use colored::Colorize;
use serde::Serialize;
use serde_json::Value;

use holidays_core::settings;
use holidays_daemon::{send_request, DaemonRequest};
use holidays_sync::HolidayStore;

use super::{format_age, home, print_json};

/// Arguments for `holidays status`.
#[derive(Args, Debug)]
pub struct StatusArgs {
    /// Emit machine-readable JSON.
    #[arg(long)]
    pub json: bool,
}

#[derive(Debug, Serialize)]
struct StatusReport {
    cache: CacheStatus,
    settings: SettingsStatus,
    daemon: DaemonStatus,
}

#[derive(Debug, Serialize)]
struct CacheStatus {
    /// `never_synced` or `synced`.
    state: &'static str,
    records: usize,
    synced_at: Option<DateTime<Utc>>,
    path: Option<String>,
}

#[derive(Debug, Serialize)]
struct SettingsStatus {
    countries: Vec<String>,
    year: Option<i32>,
    notifications_enabled: bool,
    notify_at: String,
    api_key_set: bool,
}

#[derive(Debug, Serialize)]
struct DaemonStatus {
    running: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    phase: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    daily_check_at: Option<String>,
}

impl StatusArgs {
    pub fn run(self) -> Result<()> {
        let home = home()?;
        let store = HolidayStore::open_at(&home).context("failed to open holiday cache")?;
        let current = settings::load_at(&home)
            .context("failed to load settings")?
            .with_env_overrides();

        let synced_at = store.synced_at();
        let report = StatusReport {
            cache: CacheStatus {
                state: if synced_at.is_some() {
                    "synced"
                } else {
                    "never_synced"
                },
                records: store.len(),
                synced_at,
                path: store.path().map(|p| p.display().to_string()),
            },
            settings: SettingsStatus {
                countries: current.countries.iter().map(|c| c.to_string()).collect(),
                year: current.year,
                notifications_enabled: current.notifications_enabled,
                notify_at: current.notify_at.clone(),
                api_key_set: !current.api_key.is_empty(),
            },
            daemon: daemon_status(&home),
        };

        if self.json {
            return print_json(&report);
        }
        print_report(&report);
        Ok(())
    }
}

/// One attempt without retries; a missing socket just means "not running".
fn daemon_status(home: &std::path::Path) -> DaemonStatus {
    let data = send_request(home, &DaemonRequest::new("status"))
        .ok()
        .filter(|response| response.ok)
        .and_then(|response| response.data);
    match data {
        Some(data) => DaemonStatus {
            running: data.get("running").and_then(Value::as_bool).unwrap_or(true),
            phase: data.get("phase").and_then(Value::as_str).map(str::to_string),
            daily_check_at: data
                .get("daily_check_at")
                .and_then(Value::as_str)
                .map(str::to_string),
        },
        None => DaemonStatus {
            running: false,
            phase: None,
            daily_check_at: None,
        },
    }
}

fn print_report(report: &StatusReport) {
    println!("Holidays v{}", env!("CARGO_PKG_VERSION"));

    let cache = &report.cache;
    match cache.synced_at {
        Some(at) => println!(
            "  cache:         {} {} holidays, synced {}",
            "●".green(),
            cache.records,
            format_age(at, Utc::now())
        ),
        None => println!("  cache:         {} never synced", "○".yellow()),
    }

    let settings = &report.settings;
    let year = settings
        .year
        .map(|y| y.to_string())
        .unwrap_or_else(|| "current".to_string());
    println!("  countries:     {}", settings.countries.join(", "));
    println!("  year:          {year}");
    println!(
        "  notifications: {} at {}",
        if settings.notifications_enabled {
            "on".green()
        } else {
            "off".bright_black()
        },
        settings.notify_at
    );
    if !settings.api_key_set {
        println!(
            "  api key:       {} (set one with 'holidays config api-key')",
            "missing".red()
        );
    }

    let daemon = &report.daemon;
    if daemon.running {
        let phase = daemon.phase.as_deref().unwrap_or("unknown");
        println!("  daemon:        {} running ({phase})", "●".green());
    } else {
        println!("  daemon:        {} not running", "○".bright_black());
    }

    if cache.synced_at.is_none() {
        println!("Run 'holidays sync' to fetch holidays.");
    }
}
