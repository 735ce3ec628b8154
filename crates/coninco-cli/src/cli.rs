//! Command-line argument definitions.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use coninco_chat::ChannelId;

/// Chat bot that announces upcoming calendar events.
///
/// Watches chat channels for commands, keeps a log of what was said and
/// posts events from iCalendar feeds once a day.
#[derive(Debug, Parser)]
#[command(name = "coninco", version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose output.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Path to config file, or `-` to read TOML from stdin.
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Available subcommands.
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Run the bot until interrupted.
    Run {
        /// Skip the daily calendar announcements.
        #[arg(long)]
        no_schedule: bool,
    },

    /// Post upcoming events once and exit.
    Calendar {
        /// Announce events starting within this many days.
        #[arg(long)]
        days: Option<i64>,

        /// Download every feed even when a cached copy exists.
        #[arg(long)]
        overwrite: bool,

        /// Channel to post into instead of the configured one.
        #[arg(long)]
        channel: Option<ChannelId>,
    },

    /// List the events of an iCalendar file.
    Events {
        /// The file to read, or `-` for stdin.
        path: PathBuf,

        /// Output one JSON object per event.
        #[arg(long)]
        json: bool,
    },
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn calendar_accepts_channel_id() {
        let cli = Cli::try_parse_from(["coninco", "calendar", "--days", "3", "--channel", "123"])
            .unwrap();
        match cli.command {
            Some(Commands::Calendar {
                days,
                overwrite,
                channel,
            }) => {
                assert_eq!(days, Some(3));
                assert!(!overwrite);
                assert_eq!(channel.unwrap().as_str(), "123");
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn calendar_rejects_non_numeric_channel() {
        assert!(Cli::try_parse_from(["coninco", "calendar", "--channel", "general"]).is_err());
    }
}
