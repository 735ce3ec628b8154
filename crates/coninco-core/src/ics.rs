//! Line-oriented reader for iCalendar feeds.
//!
//! This is deliberately not a full RFC 5545 parser. Folded lines, escapes,
//! nested components and recurrence rules are passed through untouched; the
//! reader only cuts the document into `VEVENT` blocks of raw `KEY:VALUE` lines.

/// Marker line opening an event block.
pub const BEGIN_EVENT: &str = "BEGIN:VEVENT";

/// Marker line closing an event block.
pub const END_EVENT: &str = "END:VEVENT";

/// Iterates over the newline-terminated lines of a document, trimmed.
///
/// A final line that is not followed by `\n` is never yielded. Calendar
/// documents always end with `END:VCALENDAR`, so the only thing lost is the
/// calendar terminator.
#[derive(Debug, Clone)]
pub struct LineCursor<'a> {
    rest: &'a str,
}

impl<'a> LineCursor<'a> {
    pub const fn new(text: &'a str) -> Self {
        Self { rest: text }
    }
}

impl<'a> Iterator for LineCursor<'a> {
    type Item = &'a str;

    fn next(&mut self) -> Option<Self::Item> {
        let newline = self.rest.find('\n')?;
        let (line, rest) = self.rest.split_at(newline);
        self.rest = &rest[1..];
        Some(line.trim())
    }
}

/// The raw field lines of one `VEVENT`, without the closing marker.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct EventBlock {
    lines: Vec<String>,
}

impl EventBlock {
    pub fn new(lines: Vec<String>) -> Self {
        Self { lines }
    }

    pub fn lines(&self) -> impl Iterator<Item = &str> {
        self.lines.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }
}

impl<S: Into<String>> FromIterator<S> for EventBlock {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self::new(iter.into_iter().map(Into::into).collect())
    }
}

/// Groups lines into [`EventBlock`]s.
///
/// Everything before the first `BEGIN:VEVENT` is skipped once, on
/// construction. After that, every block runs up to the next `END:VEVENT`,
/// so lines sitting between two events (including the second
/// `BEGIN:VEVENT`) become part of the following block. A block that is still
/// open when input runs out is dropped.
#[derive(Debug)]
pub struct EventBlockReader<I> {
    lines: I,
}

impl<'a, I> EventBlockReader<I>
where
    I: Iterator<Item = &'a str>,
{
    pub fn new(mut lines: I) -> Self {
        let skipped = lines.by_ref().take_while(|line| *line != BEGIN_EVENT).count();
        tracing::trace!(skipped, "skipped calendar preamble");
        Self { lines }
    }
}

impl<'a, I> Iterator for EventBlockReader<I>
where
    I: Iterator<Item = &'a str>,
{
    type Item = EventBlock;

    fn next(&mut self) -> Option<Self::Item> {
        let mut lines = Vec::new();
        loop {
            let line = self.lines.next()?;
            if line == END_EVENT {
                return Some(EventBlock::new(lines));
            }
            lines.push(line.to_string());
        }
    }
}

/// Splits a whole feed document into event blocks.
pub fn event_blocks(text: &str) -> EventBlockReader<LineCursor<'_>> {
    EventBlockReader::new(LineCursor::new(text))
}
