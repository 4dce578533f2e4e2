//! `holidays sync`: one sync against the holiday API.
//!
//! A running daemon owns the cache, so the request goes over its socket.
//! Without one the sync runs in-process.

use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use anyhow::{bail, Context, Result};
use clap::Args;
use colored::Colorize;

use holidays_daemon::{request_sync, DaemonError, SyncSummary};
use holidays_sync::{Engine, NoSchedule};

use super::{home, print_json};

#[derive(Args, Debug)]
pub struct SyncArgs {
    /// Emit machine-readable JSON.
    #[arg(long)]
    pub json: bool,
}

impl SyncArgs {
    pub fn run(self) -> Result<()> {
        let home = home()?;
        let summary = match sync_via_daemon(&home)? {
            Some(summary) => summary,
            None => sync_in_process(&home)?,
        };

        if self.json {
            print_json(&summary)?;
        } else {
            print_summary(&summary);
        }

        if summary.is_failed() {
            bail!(
                "{}",
                summary.message.as_deref().unwrap_or("holiday sync failed")
            );
        }
        Ok(())
    }
}

/// `None` when no daemon answers on the socket.
fn sync_via_daemon(home: &Path) -> Result<Option<SyncSummary>> {
    match request_sync(home) {
        Ok(data) => {
            let summary =
                serde_json::from_value(data).context("unexpected sync response from daemon")?;
            Ok(Some(summary))
        }
        Err(DaemonError::DaemonNotRunning { .. }) => Ok(None),
        Err(err) => Err(err).context("daemon sync request failed"),
    }
}

fn sync_in_process(home: &Path) -> Result<SyncSummary> {
    let engine =
        Engine::open_at(home, Arc::new(NoSchedule)).context("failed to open holiday cache")?;
    let started = Instant::now();
    let outcome = engine.sync();
    Ok(SyncSummary::from_outcome(&outcome, "cli", started.elapsed()))
}

fn print_summary(summary: &SyncSummary) {
    for country in &summary.countries {
        match (&country.records, &country.error) {
            (Some(n), _) => println!("  {} {:<4} {n} holidays", "✓".green(), country.country),
            (None, Some(err)) => println!("  {} {:<4} {err}", "✗".red(), country.country),
            (None, None) => println!("  {} {}", "?".yellow(), country.country),
        }
    }

    match summary.outcome.as_str() {
        "done" => {
            let records = summary.records.unwrap_or(0);
            let year = summary
                .year
                .map(|y| y.to_string())
                .unwrap_or_else(|| "-".to_string());
            let note = if summary.changed == Some(false) {
                " (unchanged)".bright_black().to_string()
            } else {
                String::new()
            };
            println!(
                "{} {records} holidays cached for {year} in {}ms{note}",
                "synced".green().bold(),
                summary.duration_ms
            );
        }
        "already_running" => println!("{}", "a sync is already running".yellow()),
        _ => {
            if let Some(detail) = &summary.detail {
                eprintln!("{} {detail}", "sync failed:".red().bold());
            }
        }
    }
}
