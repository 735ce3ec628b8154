//! Compact iCalendar date-time tokens (`YYYYMMDD[THHMMSS]`).

use std::ops::Range;

use chrono::{NaiveDate, NaiveDateTime};
use thiserror::Error;

/// Minimum token length: the `YYYYMMDD` date part.
const DATE_LEN: usize = 8;

const YEAR: Range<usize> = 0..4;
const MONTH: Range<usize> = 4..6;
const DAY: Range<usize> = 6..8;
const HOUR: Range<usize> = 9..11;
const MINUTE: Range<usize> = 11..13;

/// A date-time token could not be parsed.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ParseError {
    /// Fewer than eight characters, so not even a date.
    #[error("date-time token {token:?} is shorter than 8 characters")]
    TooShort { token: String },

    /// A date or time component contains something other than ASCII digits.
    #[error("date-time token {token:?} has a malformed {part}")]
    NotNumeric { token: String, part: &'static str },

    /// The digits do not name a real calendar date or time of day.
    #[error("date-time token {token:?} is out of range")]
    OutOfRange { token: String },
}

/// Parses a compact date-time token into a naive local timestamp.
///
/// Hour and minute are read from fixed offsets after the `T` separator and
/// default to zero when the token stops before them, so `20240315` is
/// midnight. Seconds and any `Z`/offset suffix are ignored.
pub fn parse_datetime_token(token: &str) -> Result<NaiveDateTime, ParseError> {
    if token.len() < DATE_LEN {
        return Err(ParseError::TooShort {
            token: token.to_string(),
        });
    }

    let year = component(token, YEAR, "year")?;
    let month = component(token, MONTH, "month")?;
    let day = component(token, DAY, "day")?;
    let hour = component(token, HOUR, "hour")?;
    let minute = component(token, MINUTE, "minute")?;

    let out_of_range = || ParseError::OutOfRange {
        token: token.to_string(),
    };
    let year = i32::try_from(year).map_err(|_| out_of_range())?;

    NaiveDate::from_ymd_opt(year, month, day)
        .and_then(|date| date.and_hms_opt(hour, minute, 0))
        .ok_or_else(out_of_range)
}

/// Reads the digits at `range`, clamped to the token length.
///
/// An empty slice counts as zero; that only happens for the time components
/// since the date part is length-checked up front.
fn component(token: &str, range: Range<usize>, part: &'static str) -> Result<u32, ParseError> {
    let not_numeric = || ParseError::NotNumeric {
        token: token.to_string(),
        part,
    };

    let end = range.end.min(token.len());
    let start = range.start.min(end);
    let digits = token.get(start..end).ok_or_else(not_numeric)?;
    if digits.is_empty() {
        return Ok(0);
    }
    if !digits.bytes().all(|b| b.is_ascii_digit()) {
        return Err(not_numeric());
    }
    digits.parse().map_err(|_| not_numeric())
}
