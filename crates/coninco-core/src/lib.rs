//! Core domain logic for the coninco bot.
//!
//! This crate contains the transport-free parts of the bot:
//! - ICS reading: cutting feed text into `VEVENT` blocks and event records
//! - Announcement policy: day windows, the recurring schedule, payloads
//! - Commands: the table of chat commands and their arguments

pub mod command;
pub mod datetime;
pub mod event;
pub mod ics;
pub mod window;

pub use command::{COMMANDS, Command, CommandDefaults, CommandError, CommandParser};
pub use datetime::{ParseError, parse_datetime_token};
pub use event::{EventError, EventRecord, parse_events};
pub use ics::{EventBlock, EventBlockReader, LineCursor, event_blocks};
pub use window::{
    CalendarSchedule, EventWindow, NotificationPayload, PayloadField, calendar_link, select,
};
