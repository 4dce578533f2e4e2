//! `holidays list` — dump the cached snapshot.

use anyhow::{Context, Result};
use clap::{Args, ValueEnum};

use holidays_core::CountryCode;
use holidays_sync::{HolidayStore, SortOrder};

use super::{home, print_json, print_records};

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
pub enum OrderArg {
    Date,
    DateDesc,
    Country,
}

impl From<OrderArg> for SortOrder {
    fn from(order: OrderArg) -> Self {
        match order {
            OrderArg::Date => SortOrder::DateAscending,
            OrderArg::DateDesc => SortOrder::DateDescending,
            OrderArg::Country => SortOrder::CountryThenDate,
        }
    }
}

#[derive(Args, Debug)]
pub struct ListArgs {
    /// Only holidays of this country.
    #[arg(long)]
    pub country: Option<CountryCode>,

    #[arg(long, value_enum, default_value_t = OrderArg::Date)]
    pub order: OrderArg,

    /// Emit machine-readable JSON.
    #[arg(long)]
    pub json: bool,
}

impl ListArgs {
    pub fn run(self) -> Result<()> {
        let home = home()?;
        let store = HolidayStore::open_at(&home).context("failed to open holiday cache")?;

        let mut records = store.query_all(self.order.into());
        if let Some(country) = &self.country {
            records.retain(|r| &r.country == country);
        }

        if self.json {
            return print_json(&records);
        }
        if records.is_empty() {
            if store.synced_at().is_none() {
                println!("No holidays cached yet. Run 'holidays sync' first.");
            } else {
                println!("No holidays cached.");
            }
            return Ok(());
        }
        print_records(&records);
        Ok(())
    }
}
