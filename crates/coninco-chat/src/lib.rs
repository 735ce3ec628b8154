//! Chat platform integration for the coninco bot.
//!
//! - [`ChatChannel`]: the send/delete/history operations the bot relies on
//! - [`DiscordClient`]: that interface over the Discord REST API
//! - [`Gateway`]: message events pushed over the gateway websocket
//! - [`ChatLog`]: the on-disk message and attachment log

use thiserror::Error;

mod channel;
pub mod discord;
pub mod gateway;
pub mod log;
pub mod types;

pub use channel::{ChatChannel, OutgoingMessage, SendOptions, Sent, schedule_delete, send_with};
pub use discord::DiscordClient;
pub use gateway::{Gateway, GatewayError, GatewayEvent};
pub use log::ChatLog;
pub use types::{Attachment, ChannelId, GuildId, IdError, Message, MessageId, User, UserId};

/// Chat client errors.
#[derive(Debug, Error)]
pub enum ChatError {
    /// The provided bot token was invalid.
    #[error("invalid bot token: {reason}")]
    InvalidToken { reason: &'static str },
    /// Failed to build HTTP client.
    #[error("failed to build HTTP client: {0}")]
    ClientBuild(#[source] reqwest::Error),
    /// HTTP request failed.
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
    /// API returned an error response.
    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },
    /// Failed to parse response.
    #[error("invalid response: {0}")]
    InvalidResponse(String),
}
