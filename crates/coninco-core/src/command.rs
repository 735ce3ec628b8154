//! Chat commands and their argument parsing.

use thiserror::Error;

/// How many leading characters of a command name a message has to match.
const MATCH_LEN: usize = 3;

/// Token asking for the command and its output to be cleaned up.
const DELETE_TOKEN: &str = "del";

/// Command argument errors, reported back to the sender.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CommandError {
    /// A numeric argument does not fit the expected range.
    #[error("{command}: number {value} is too large")]
    NumberTooLarge {
        command: &'static str,
        value: String,
    },
}

/// A parsed chat command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// Post upcoming events of every feed.
    Calendar {
        /// Exclusive upper day bound; the window is `(0, days)`.
        days: i64,
        /// Delete the command message and expire the posted events.
        delete: bool,
    },
    /// Delete the most recent messages in the channel.
    Delete { count: u32 },
    /// Placeholder for reservations; does nothing yet.
    Reserve,
}

/// Values used when a command omits its numeric argument.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommandDefaults {
    pub calendar_days: i64,
    pub delete_count: u32,
}

impl Default for CommandDefaults {
    fn default() -> Self {
        Self {
            calendar_days: 10,
            delete_count: 1,
        }
    }
}

type ParseFn = fn(&[&str], &CommandDefaults) -> Result<Command, CommandError>;

/// An entry of the command table.
#[derive(Debug, Clone, Copy)]
pub struct CommandSpec {
    pub name: &'static str,
    parse: ParseFn,
}

impl CommandSpec {
    /// The part of the name a message must start with.
    pub fn trigger(&self) -> &'static str {
        &self.name[..MATCH_LEN.min(self.name.len())]
    }
}

/// Every command the bot understands.
pub const COMMANDS: &[CommandSpec] = &[
    CommandSpec {
        name: "calendar",
        parse: parse_calendar,
    },
    CommandSpec {
        name: "delete",
        parse: parse_delete,
    },
    CommandSpec {
        name: "reserve",
        parse: parse_reserve,
    },
];

/// Recognises commands in message text.
#[derive(Debug, Clone)]
pub struct CommandParser {
    prefix: char,
    defaults: CommandDefaults,
}

impl CommandParser {
    pub const fn new(prefix: char, defaults: CommandDefaults) -> Self {
        Self { prefix, defaults }
    }

    /// Parses `text` as a command.
    ///
    /// Returns `Ok(None)` for ordinary chat. The text must start with the
    /// prefix, directly followed by the first three letters of a command
    /// name (`!cal`, `!calendar 5`, `!del 3`).
    pub fn parse(&self, text: &str) -> Result<Option<Command>, CommandError> {
        let Some(body) = text.strip_prefix(self.prefix) else {
            return Ok(None);
        };
        let Some(spec) = COMMANDS.iter().find(|spec| body.starts_with(spec.trigger())) else {
            return Ok(None);
        };

        let tokens: Vec<&str> = text.split_whitespace().collect();
        (spec.parse)(&tokens, &self.defaults).map(Some)
    }
}

impl Default for CommandParser {
    fn default() -> Self {
        Self::new('!', CommandDefaults::default())
    }
}

fn parse_calendar(tokens: &[&str], defaults: &CommandDefaults) -> Result<Command, CommandError> {
    let days = first_number(tokens, "calendar")?.unwrap_or(defaults.calendar_days);
    Ok(Command::Calendar {
        days,
        delete: tokens.contains(&DELETE_TOKEN),
    })
}

fn parse_delete(tokens: &[&str], defaults: &CommandDefaults) -> Result<Command, CommandError> {
    let count = first_number(tokens, "delete")?.unwrap_or(defaults.delete_count);
    Ok(Command::Delete { count })
}

fn parse_reserve(_tokens: &[&str], _defaults: &CommandDefaults) -> Result<Command, CommandError> {
    Ok(Command::Reserve)
}

/// The first token made only of ASCII digits, parsed as `T`.
fn first_number<T: std::str::FromStr>(
    tokens: &[&str],
    command: &'static str,
) -> Result<Option<T>, CommandError> {
    let Some(token) = tokens
        .iter()
        .find(|token| token.bytes().all(|b| b.is_ascii_digit()))
    else {
        return Ok(None);
    };
    token
        .parse()
        .map(Some)
        .map_err(|_| CommandError::NumberTooLarge {
            command,
            value: (*token).to_string(),
        })
}
