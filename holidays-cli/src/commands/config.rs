//! `holidays config` — read and change `~/.holidays/settings.yaml`.

use anyhow::{bail, Context, Result};
use clap::{Subcommand, ValueEnum};
use colored::Colorize;

use holidays_core::{settings, CountryCode, Settings, KNOWN_COUNTRIES};

use super::home;

#[derive(Subcommand, Debug)]
pub enum ConfigCommand {
    /// Print the settings file (API key masked).
    Show,
    /// Replace the country selection; with no codes, list known countries.
    Countries { codes: Vec<CountryCode> },
    /// Turn the daily notification on or off.
    Notifications {
        #[arg(value_enum)]
        state: Toggle,
    },
    /// Store the holiday API key.
    ApiKey { key: String },
    /// Local time of the daily check, HH:MM.
    NotifyAt { time: String },
    /// Pin the year to fetch, or `current` to follow the calendar.
    Year { year: String },
    /// Program run per notification; `none` to log instead.
    NotifyCommand { program: String },
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
pub enum Toggle {
    On,
    Off,
}

pub fn run(command: ConfigCommand) -> Result<()> {
    let home = home()?;

    match command {
        ConfigCommand::Show => {
            let current = settings::load_at(&home).context("failed to load settings")?;
            print!("{}", render(&current)?);
        }
        ConfigCommand::Countries { codes } if codes.is_empty() => {
            let current = settings::load_at(&home).context("failed to load settings")?;
            for (code, name) in KNOWN_COUNTRIES {
                let selected = current.countries.iter().any(|c| c.as_str() == *code);
                let marker = if selected { "✓".green() } else { " ".normal() };
                println!("  {marker} {code}  {name}");
            }
        }
        ConfigCommand::Countries { codes } => {
            let saved = update(&home, |s| s.set_countries(codes))?;
            let joined: Vec<String> = saved.countries.iter().map(|c| c.to_string()).collect();
            println!("countries: {}", joined.join(", "));
        }
        ConfigCommand::Notifications { state } => {
            let enabled = state == Toggle::On;
            update(&home, |s| s.notifications_enabled = enabled)?;
            println!("notifications: {}", if enabled { "on" } else { "off" });
        }
        ConfigCommand::ApiKey { key } => {
            let key = key.trim().to_string();
            if key.is_empty() {
                bail!("API key must not be empty");
            }
            update(&home, |s| s.api_key = key)?;
            println!("api key saved");
        }
        ConfigCommand::NotifyAt { time } => {
            let saved = update(&home, |s| s.notify_at = time.trim().to_string())?;
            println!("notify_at: {}", saved.notify_at);
        }
        ConfigCommand::Year { year } => {
            let pinned = parse_year(&year)?;
            update(&home, |s| s.year = pinned)?;
            match pinned {
                Some(y) => println!("year: {y}"),
                None => println!("year: current"),
            }
        }
        ConfigCommand::NotifyCommand { program } => {
            let program = program.trim().to_string();
            let command = (!program.is_empty() && program != "none").then_some(program);
            update(&home, |s| s.notify_command = command.clone())?;
            match command {
                Some(p) => println!("notify_command: {p}"),
                None => println!("notify_command: none (log only)"),
            }
        }
    }
    Ok(())
}

fn update(home: &std::path::Path, change: impl FnOnce(&mut Settings)) -> Result<Settings> {
    settings::update_at(home, change).context("failed to update settings")
}

fn parse_year(raw: &str) -> Result<Option<i32>> {
    let raw = raw.trim();
    if raw.eq_ignore_ascii_case("current") {
        return Ok(None);
    }
    let year: i32 = raw
        .parse()
        .with_context(|| format!("'{raw}' is not a year or 'current'"))?;
    Ok(Some(year))
}

fn render(current: &Settings) -> Result<String> {
    let mut masked = current.clone();
    masked.api_key = mask(&masked.api_key);
    serde_yaml::to_string(&masked).context("failed to render settings")
}

fn mask(key: &str) -> String {
    let chars: Vec<char> = key.chars().collect();
    if chars.len() <= 4 {
        return "*".repeat(chars.len());
    }
    let tail: String = chars[chars.len() - 4..].iter().collect();
    format!("{}{tail}", "*".repeat(chars.len() - 4))
}
