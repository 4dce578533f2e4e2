//! `holidays show <name>`

use anyhow::{bail, Context, Result};
use clap::Args;
use colored::Colorize;

use holidays_sync::HolidayStore;

use super::{home, print_json};

#[derive(Args, Debug)]
pub struct ShowArgs {
    /// Holiday name; exact match first, then case-insensitive.
    pub name: String,

    /// Emit machine-readable JSON.
    #[arg(long)]
    pub json: bool,
}

impl ShowArgs {
    pub fn run(self) -> Result<()> {
        let home = home()?;
        let store = HolidayStore::open_at(&home).context("failed to open holiday cache")?;

        let Some(record) = store.query_by_name(&self.name) else {
            bail!("no cached holiday named '{}'", self.name);
        };

        if self.json {
            return print_json(&record);
        }
        let country = match record.country.display_name() {
            Some(display) => format!("{} ({display})", record.country),
            None => record.country.to_string(),
        };
        println!("{}", record.name.bold());
        println!("  date:    {}", record.date);
        println!("  country: {country}");
        Ok(())
    }
}
