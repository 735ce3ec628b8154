//! On-disk log of observed chat messages and their attachments.
//!
//! Layout under the log root:
//!
//! ```text
//! <root>/<guild>/<channel>.txt      appended message log
//! <root>/<guild>/<YYYYMMDD>/<file>  attachments, by day received
//! ```
//!
//! Direct messages have no guild and are filed under `direct`.

use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::PathBuf;

use chrono::{DateTime, FixedOffset, NaiveDate};
use fs2::FileExt;

use crate::types::{ChannelId, GuildId, Message, MessageId, User};

/// Directory name used for messages outside any guild.
const DIRECT_MESSAGES: &str = "direct";

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.3f%:z";

/// Appends messages to per-channel text files and stores attachments.
#[derive(Debug, Clone)]
pub struct ChatLog {
    root: PathBuf,
}

impl ChatLog {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn guild_dir(&self, guild: Option<&GuildId>) -> PathBuf {
        self.root
            .join(guild.map_or(DIRECT_MESSAGES, GuildId::as_str))
    }

    /// Appends `message` to its channel log and returns the log path.
    ///
    /// The append happens under an exclusive lock on the log file so
    /// concurrent writers cannot interleave entries.
    pub fn record(&self, guild: Option<&GuildId>, message: &Message) -> io::Result<PathBuf> {
        let path = self.append(guild, &message.channel_id, &format_entry(message))?;
        tracing::debug!(path = %path.display(), id = %message.id, "message logged");
        Ok(path)
    }

    /// Notes in the channel log that a message by `author` was deleted `at`.
    pub fn record_deletion(
        &self,
        guild: Option<&GuildId>,
        channel: &ChannelId,
        message: &MessageId,
        author: &User,
        at: DateTime<FixedOffset>,
    ) -> io::Result<PathBuf> {
        let path = self.append(guild, channel, &format_deletion(author, at))?;
        tracing::debug!(path = %path.display(), id = %message, "deletion logged");
        Ok(path)
    }

    fn append(
        &self,
        guild: Option<&GuildId>,
        channel: &ChannelId,
        entry: &str,
    ) -> io::Result<PathBuf> {
        let dir = self.guild_dir(guild);
        fs::create_dir_all(&dir)?;
        let path = dir.join(format!("{channel}.txt"));

        let mut file = OpenOptions::new().create(true).append(true).open(&path)?;
        file.lock_exclusive()?;
        let written = file.write_all(entry.as_bytes());
        let unlocked = FileExt::unlock(&file);
        written?;
        unlocked?;
        Ok(path)
    }

    /// Writes an attachment into the day directory, never overwriting.
    ///
    /// When the file name is taken, `_` is prefixed until it is free.
    pub fn save_attachment(
        &self,
        guild: Option<&GuildId>,
        day: NaiveDate,
        filename: &str,
        data: &[u8],
    ) -> io::Result<PathBuf> {
        let dir = self
            .guild_dir(guild)
            .join(day.format("%Y%m%d").to_string());
        fs::create_dir_all(&dir)?;

        let mut name = sanitize_filename(filename);
        loop {
            let path = dir.join(&name);
            match OpenOptions::new().write(true).create_new(true).open(&path) {
                Ok(mut file) => {
                    file.write_all(data)?;
                    tracing::debug!(path = %path.display(), bytes = data.len(), "attachment saved");
                    return Ok(path);
                }
                Err(err) if err.kind() == io::ErrorKind::AlreadyExists => {
                    name.insert(0, '_');
                }
                Err(err) => return Err(err),
            }
        }
    }
}

/// Renders one log entry: a header line, the timestamp, then the indented
/// content.
pub fn format_entry(message: &Message) -> String {
    let author = &message.author;
    let mut entry = format!(
        "# {}: {}: {}\n{}\n",
        author.display_name(),
        author.username,
        author.id,
        message.timestamp.format(TIMESTAMP_FORMAT),
    );
    for line in message.content.lines() {
        entry.push_str("  ");
        entry.push_str(line);
        entry.push('\n');
    }
    entry
}

/// Renders a deletion entry: the author header marked `DELETED`, then the
/// time the deletion was observed.
pub fn format_deletion(author: &User, at: DateTime<FixedOffset>) -> String {
    format!(
        "# {}: {}: {}: DELETED\n{}\n",
        author.display_name(),
        author.username,
        author.id,
        at.format(TIMESTAMP_FORMAT),
    )
}

/// Keeps only the final path component of an uploaded file name.
fn sanitize_filename(filename: &str) -> String {
    let name = filename
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or_default()
        .trim();
    if name.is_empty() || name == "." || name == ".." {
        "attachment".to_string()
    } else {
        name.to_string()
    }
}
