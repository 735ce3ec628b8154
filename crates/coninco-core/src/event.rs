//! Calendar events extracted from `VEVENT` blocks.

use chrono::{NaiveDate, NaiveDateTime};
use serde::Serialize;
use thiserror::Error;

use crate::datetime::{ParseError, parse_datetime_token};
use crate::ics::{EventBlock, event_blocks};

/// Errors raised while building or querying an [`EventRecord`].
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum EventError {
    /// A `DTSTART`/`DTEND` value was malformed.
    #[error(transparent)]
    Parse(#[from] ParseError),

    /// An operation needed a field the event never had.
    #[error("event {summary:?} has no {field}")]
    MissingField {
        field: &'static str,
        summary: String,
    },
}

/// The recognised field keys, matched as line prefixes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Field {
    Start,
    End,
    Summary,
    Description,
}

impl Field {
    const KEYS: [(&'static str, Self); 4] = [
        ("DTSTART", Self::Start),
        ("DTEND", Self::End),
        ("SUMMARY", Self::Summary),
        ("DESCRIPTION", Self::Description),
    ];

    /// Prefix match, so `DTSTART;TZID=Asia/Tokyo:...` is a start line.
    fn of_line(line: &str) -> Option<Self> {
        Self::KEYS
            .iter()
            .find(|(key, _)| line.starts_with(key))
            .map(|(_, field)| *field)
    }
}

/// A parsed calendar event.
///
/// Construction only fails on malformed date values. Absent dates surface as
/// [`EventError::MissingField`] from the accessors that need them.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct EventRecord {
    pub summary: String,
    pub description: String,
    /// Unparsed `DTSTART` value, reused verbatim in calendar links.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_raw: Option<String>,
    /// Unparsed `DTEND` value.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_raw: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    start: Option<NaiveDateTime>,
    #[serde(skip_serializing_if = "Option::is_none")]
    end: Option<NaiveDateTime>,
}

impl EventRecord {
    /// Builds a record from the raw lines of one event block.
    ///
    /// The value is everything after the first `:`. Lines without a colon are
    /// skipped, and a repeated field overwrites the earlier one.
    pub fn from_block(block: &EventBlock) -> Result<Self, EventError> {
        let mut record = Self::default();

        for line in block.lines() {
            let Some(field) = Field::of_line(line) else {
                continue;
            };
            let Some((_, value)) = line.split_once(':') else {
                tracing::debug!(line, "skipping field line without a value");
                continue;
            };

            match field {
                Field::Start => {
                    record.start = Some(parse_datetime_token(value)?);
                    record.start_raw = Some(value.to_string());
                }
                Field::End => {
                    record.end = Some(parse_datetime_token(value)?);
                    record.end_raw = Some(value.to_string());
                }
                Field::Summary => record.summary = value.to_string(),
                Field::Description => record.description = value.to_string(),
            }
        }

        Ok(record)
    }

    pub fn start(&self) -> Result<NaiveDateTime, EventError> {
        self.start.ok_or_else(|| self.missing("DTSTART"))
    }

    pub fn end(&self) -> Result<NaiveDateTime, EventError> {
        self.end.ok_or_else(|| self.missing("DTEND"))
    }

    pub fn start_raw(&self) -> Result<&str, EventError> {
        self.start_raw
            .as_deref()
            .ok_or_else(|| self.missing("DTSTART"))
    }

    pub fn end_raw(&self) -> Result<&str, EventError> {
        self.end_raw.as_deref().ok_or_else(|| self.missing("DTEND"))
    }

    /// Whole days between `today` and the event's start date.
    ///
    /// Only dates are compared, so an event later today is `0` and one
    /// yesterday is `-1` regardless of the time of day.
    pub fn days_from(&self, today: NaiveDate) -> Result<i64, EventError> {
        Ok((self.start()?.date() - today).num_days())
    }

    fn missing(&self, field: &'static str) -> EventError {
        EventError::MissingField {
            field,
            summary: self.summary.clone(),
        }
    }
}

/// Parses every event of a feed document, in source order.
pub fn parse_events(text: &str) -> impl Iterator<Item = Result<EventRecord, EventError>> + '_ {
    event_blocks(text).map(|block| EventRecord::from_block(&block))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn block(lines: &[&str]) -> EventBlock {
        lines.iter().copied().collect()
    }

    fn at(y: i32, m: u32, d: u32, h: u32, min: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, m, d)
            .unwrap()
            .and_hms_opt(h, min, 0)
            .unwrap()
    }

    #[test]
    fn builds_record_from_block() {
        let record = EventRecord::from_block(&block(&[
            "SUMMARY:Test",
            "DTSTART:20240101T100000",
            "DTEND:20240101T110000",
        ]))
        .unwrap();

        assert_eq!(record.summary, "Test");
        assert_eq!(record.description, "");
        assert_eq!(record.start().unwrap(), at(2024, 1, 1, 10, 0));
        assert_eq!(record.end().unwrap(), at(2024, 1, 1, 11, 0));
        assert_eq!(record.start_raw().unwrap(), "20240101T100000");
        assert_eq!(record.end_raw().unwrap(), "20240101T110000");
    }

    #[test]
    fn field_order_does_not_matter() {
        let record = EventRecord::from_block(&block(&[
            "DTEND:20240101T110000",
            "DESCRIPTION:Bring snacks",
            "DTSTART:20240101T100000",
            "SUMMARY:Picnic",
        ]))
        .unwrap();
        assert_eq!(record.summary, "Picnic");
        assert_eq!(record.description, "Bring snacks");
        assert_eq!(record.start().unwrap(), at(2024, 1, 1, 10, 0));
    }

    #[test]
    fn parameterised_keys_match_by_prefix() {
        let record = EventRecord::from_block(&block(&[
            "DTSTART;TZID=Asia/Tokyo:20240315T090000",
            "DTEND;VALUE=DATE:20240316",
        ]))
        .unwrap();
        assert_eq!(record.start().unwrap(), at(2024, 3, 15, 9, 0));
        assert_eq!(record.end().unwrap(), at(2024, 3, 16, 0, 0));
        assert_eq!(record.start_raw().unwrap(), "20240315T090000");
    }

    #[test]
    fn value_keeps_text_after_first_colon() {
        let record =
            EventRecord::from_block(&block(&["DESCRIPTION:Meet at 10:30, room B"])).unwrap();
        assert_eq!(record.description, "Meet at 10:30, room B");
    }

    #[test]
    fn duplicate_field_overwrites() {
        let record = EventRecord::from_block(&block(&[
            "SUMMARY:First",
            "DESCRIPTION:Event body",
            "BEGIN:VALARM",
            "DESCRIPTION:Reminder",
            "END:VALARM",
            "SUMMARY:Second",
        ]))
        .unwrap();
        assert_eq!(record.summary, "Second");
        assert_eq!(record.description, "Reminder");
    }

    #[test]
    fn unrelated_and_valueless_lines_are_ignored() {
        let record = EventRecord::from_block(&block(&[
            "UID:abc@google.com",
            "SUMMARY",
            "LOCATION:Somewhere",
        ]))
        .unwrap();
        assert_eq!(record, EventRecord::default());
    }

    #[test]
    fn malformed_date_fails_construction() {
        let err =
            EventRecord::from_block(&block(&["SUMMARY:Bad", "DTSTART:2024031"])).unwrap_err();
        assert!(matches!(
            err,
            EventError::Parse(ParseError::TooShort { .. })
        ));
    }

    #[test]
    fn missing_start_fails_lazily() {
        let record = EventRecord::from_block(&block(&["SUMMARY:No dates"])).unwrap();
        assert_eq!(
            record.start(),
            Err(EventError::MissingField {
                field: "DTSTART",
                summary: "No dates".to_string()
            })
        );
        assert!(record.end_raw().is_err());
        assert!(record.days_from(NaiveDate::from_ymd_opt(2024, 1, 1).unwrap()).is_err());
    }

    #[test]
    fn days_from_compares_dates_only() {
        let record = EventRecord::from_block(&block(&["DTSTART:20240110T235900"])).unwrap();
        let today = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        assert_eq!(record.days_from(today).unwrap(), 9);

        let later = NaiveDate::from_ymd_opt(2024, 1, 12).unwrap();
        assert_eq!(record.days_from(later).unwrap(), -2);
    }

    #[test]
    fn parse_events_keeps_source_order() {
        let text = "BEGIN:VCALENDAR\n\
BEGIN:VEVENT\nSUMMARY:A\nDTSTART:20240101\nEND:VEVENT\n\
BEGIN:VEVENT\nSUMMARY:B\nDTSTART:20240102\nEND:VEVENT\n\
BEGIN:VEVENT\nSUMMARY:C\nDTSTART:20240103\nEND:VEVENT\n\
END:VCALENDAR\n";
        let summaries: Vec<_> = parse_events(text)
            .map(|event| event.unwrap().summary)
            .collect();
        assert_eq!(summaries, vec!["A", "B", "C"]);
    }

    #[test]
    fn serializes_for_listing() {
        let record = EventRecord::from_block(&block(&[
            "SUMMARY:Test",
            "DTSTART:20240101T100000",
        ]))
        .unwrap();
        insta::assert_snapshot!(
            serde_json::to_string(&record).unwrap(),
            @r#"{"summary":"Test","description":"","start_raw":"20240101T100000","start":"2024-01-01T10:00:00"}"#
        );
    }
}
