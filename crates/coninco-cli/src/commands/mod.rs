//! CLI subcommand implementations.

pub mod bot;
pub mod calendar;
pub mod events;

use chrono::{Local, NaiveDate};

/// Today's date on the machine running the bot.
pub(crate) fn local_today() -> NaiveDate {
    Local::now().date_naive()
}
