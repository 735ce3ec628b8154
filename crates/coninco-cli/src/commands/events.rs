//! Events command for inspecting an iCalendar document offline.
//!
//! Plain output is one line per event; `--json` emits JSONL.

use std::fs;
use std::io::{self, Read, Write};
use std::path::Path;

use anyhow::{Context, Result};
use coninco_core::parse_events;

/// Runs the events command on a file, or stdin for `-`.
pub fn run<W: Write>(writer: &mut W, path: &Path, json: bool) -> Result<()> {
    let text = if path == Path::new("-") {
        let mut text = String::new();
        io::stdin()
            .read_to_string(&mut text)
            .context("failed to read stdin")?;
        text
    } else {
        fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))?
    };

    let count = write_events(writer, &text, json)?;
    tracing::debug!(count, "events listed");
    Ok(())
}

fn write_events<W: Write>(writer: &mut W, text: &str, json: bool) -> Result<usize> {
    let mut count = 0;
    for event in parse_events(text) {
        count += 1;
        let event = event.with_context(|| format!("event {count} is malformed"))?;
        if json {
            let line = serde_json::to_string(&event)?;
            writeln!(writer, "{line}")?;
        } else {
            writeln!(
                writer,
                "{:<15}  {:<15}  {}",
                event.start_raw.as_deref().unwrap_or("-"),
                event.end_raw.as_deref().unwrap_or("-"),
                event.summary
            )?;
        }
    }
    Ok(count)
}
