//! Which events get announced, and what the announcement looks like.

use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use url::form_urlencoded;

use crate::event::{EventError, EventRecord};

/// Base of the "add to Google Calendar" template link.
const CALENDAR_TEMPLATE_URL: &str = "https://www.google.com/calendar/render";

/// Prefix put in front of every announcement title.
const TITLE_GLYPH: &str = "🗓️  ";

/// Embed accent colour (green).
pub const NOTIFICATION_COLOR: u32 = 0x00ff00;

/// Display format for start/end fields, e.g. `2024/03/15(Fri) 09:00`.
const DISPLAY_FORMAT: &str = "%Y/%m/%d(%a) %H:%M";

/// Day offsets bounding which events are eligible.
///
/// Both bounds are exclusive: an event is inside when
/// `low < days_from_today < high`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventWindow {
    pub low: i64,
    pub high: i64,
}

impl EventWindow {
    pub const fn new(low: i64, high: i64) -> Self {
        Self { low, high }
    }

    pub const fn contains(&self, days_from_today: i64) -> bool {
        self.low < days_from_today && days_from_today < self.high
    }
}

/// One labelled value shown under an announcement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PayloadField {
    pub name: String,
    pub value: String,
    pub inline: bool,
}

/// A platform-neutral announcement of one calendar event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NotificationPayload {
    pub title: String,
    pub description: String,
    pub url: String,
    pub color: u32,
    pub fields: Vec<PayloadField>,
}

impl NotificationPayload {
    /// Builds the announcement for `event`, published under `feed_name`.
    pub fn for_event(event: &EventRecord, feed_name: &str) -> Result<Self, EventError> {
        Ok(Self {
            title: format!("{TITLE_GLYPH}{}", event.summary),
            description: event.description.clone(),
            url: calendar_link(event)?,
            color: NOTIFICATION_COLOR,
            fields: vec![
                PayloadField {
                    name: "Person".to_string(),
                    value: feed_name.to_string(),
                    inline: false,
                },
                PayloadField {
                    name: "From".to_string(),
                    value: display(event.start()?),
                    inline: true,
                },
                PayloadField {
                    name: "To".to_string(),
                    value: display(event.end()?),
                    inline: true,
                },
            ],
        })
    }
}

/// Link that opens a pre-filled "new event" form in Google Calendar.
pub fn calendar_link(event: &EventRecord) -> Result<String, EventError> {
    let dates = format!("{}/{}", event.start_raw()?, event.end_raw()?);
    let query = form_urlencoded::Serializer::new(String::new())
        .append_pair("action", "TEMPLATE")
        .append_pair("text", &event.summary)
        .append_pair("dates", &dates)
        .append_pair("details", &event.description)
        .finish();
    Ok(format!("{CALENDAR_TEMPLATE_URL}?{query}"))
}

fn display(at: NaiveDateTime) -> String {
    at.format(DISPLAY_FORMAT).to_string()
}

/// Announcements for the events that fall inside `window`, in input order.
///
/// An event outside the window is skipped. An event without a start date
/// cannot be placed at all and fails the whole selection.
pub fn select<'a, I>(
    events: I,
    window: EventWindow,
    today: NaiveDate,
    feed_name: &str,
) -> Result<Vec<NotificationPayload>, EventError>
where
    I: IntoIterator<Item = &'a EventRecord>,
{
    let mut payloads = Vec::new();
    for event in events {
        let days = event.days_from(today)?;
        if !window.contains(days) {
            continue;
        }
        tracing::debug!(summary = %event.summary, days, "event inside window");
        payloads.push(NotificationPayload::for_event(event, feed_name)?);
    }
    Ok(payloads)
}

/// Window policy for the recurring announcement cycle.
///
/// The first cycle after startup covers the coming week so nothing is
/// missed; every later cycle only looks at the day entering the horizon.
#[derive(Debug, Clone)]
pub struct CalendarSchedule {
    first: EventWindow,
    recurring: EventWindow,
    started: bool,
}

impl Default for CalendarSchedule {
    fn default() -> Self {
        Self::new(EventWindow::new(0, 9), EventWindow::new(9, 10))
    }
}

impl CalendarSchedule {
    pub const fn new(first: EventWindow, recurring: EventWindow) -> Self {
        Self {
            first,
            recurring,
            started: false,
        }
    }

    /// Window for the cycle about to run.
    pub fn next_window(&mut self) -> EventWindow {
        if self.started {
            self.recurring
        } else {
            self.started = true;
            self.first
        }
    }
}
