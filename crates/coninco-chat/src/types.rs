//! Discord object types used by the bot.

use std::fmt;

use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Validation errors for Discord identifiers.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum IdError {
    /// The provided value was empty.
    #[error("{field} cannot be empty")]
    Empty { field: &'static str },

    /// Snowflakes are decimal integers.
    #[error("{field} must be numeric, got {value:?}")]
    NotNumeric { field: &'static str, value: String },
}

/// Generates a validated snowflake ID newtype with common trait implementations.
macro_rules! define_snowflake {
    (
        $(#[$meta:meta])*
        $name:ident, $field_name:literal
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
        #[serde(into = "String")]
        pub struct $name(String);

        impl $name {
            /// Creates a new ID after validation.
            pub fn new(id: impl Into<String>) -> Result<Self, IdError> {
                let id = id.into();
                if id.is_empty() {
                    return Err(IdError::Empty { field: $field_name });
                }
                if !id.bytes().all(|b| b.is_ascii_digit()) {
                    return Err(IdError::NotNumeric {
                        field: $field_name,
                        value: id,
                    });
                }
                Ok(Self(id))
            }

            /// Returns the ID as a string slice.
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl TryFrom<String> for $name {
            type Error = IdError;

            fn try_from(value: String) -> Result<Self, Self::Error> {
                Self::new(value)
            }
        }

        // Config files and environment variables may carry IDs as integers.
        impl<'de> Deserialize<'de> for $name {
            fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                #[derive(Deserialize)]
                #[serde(untagged)]
                enum Raw {
                    Text(String),
                    Number(u64),
                }

                let raw = match Raw::deserialize(deserializer)? {
                    Raw::Text(text) => text,
                    Raw::Number(number) => number.to_string(),
                };
                Self::new(raw).map_err(serde::de::Error::custom)
            }
        }

        impl From<$name> for String {
            fn from(id: $name) -> Self {
                id.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl std::str::FromStr for $name {
            type Err = IdError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Self::new(s)
            }
        }
    };
}

define_snowflake!(
    /// A channel (or thread) identifier.
    ChannelId, "channel ID"
);

define_snowflake!(
    /// A message identifier.
    MessageId, "message ID"
);

define_snowflake!(
    /// A user identifier.
    UserId, "user ID"
);

define_snowflake!(
    /// A guild (server) identifier.
    GuildId, "guild ID"
);

/// A message author or mentioned user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub username: String,
    /// Display name, if the user set one.
    #[serde(default)]
    pub global_name: Option<String>,
    #[serde(default)]
    pub bot: bool,
}

impl User {
    /// The name shown in chat: the display name, falling back to the username.
    pub fn display_name(&self) -> &str {
        self.global_name.as_deref().unwrap_or(&self.username)
    }

    /// Text that pings this user when sent.
    pub fn mention(&self) -> String {
        format!("<@{}>", self.id)
    }
}

/// A file attached to a message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attachment {
    pub filename: String,
    pub url: String,
}

/// A message as returned by the channel messages endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub id: MessageId,
    pub channel_id: ChannelId,
    pub author: User,
    #[serde(default)]
    pub content: String,
    pub timestamp: DateTime<FixedOffset>,
    #[serde(default)]
    pub attachments: Vec<Attachment>,
    #[serde(default)]
    pub mentions: Vec<User>,
}

impl Message {
    pub fn mentions_user(&self, user: &UserId) -> bool {
        self.mentions.iter().any(|mentioned| mentioned.id == *user)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_reject_empty_and_non_numeric() {
        assert_eq!(
            ChannelId::new(""),
            Err(IdError::Empty {
                field: "channel ID"
            })
        );
        assert!(matches!(
            MessageId::new("12a"),
            Err(IdError::NotNumeric { .. })
        ));
        assert!(UserId::new("80351110224678912").is_ok());
    }

    #[test]
    fn id_serde_roundtrip() {
        let id = ChannelId::new("1234567890").unwrap();
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "\"1234567890\"");
        let parsed: ChannelId = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, id);
    }

    #[test]
    fn id_accepts_integer_form() {
        let parsed: ChannelId = serde_json::from_str("1234567890").unwrap();
        assert_eq!(parsed.as_str(), "1234567890");
        assert!(serde_json::from_str::<ChannelId>("\"abc\"").is_err());
    }

    #[test]
    fn message_deserializes_from_api_shape() {
        let json = r#"{
            "id": "1100000000000000002",
            "channel_id": "1100000000000000001",
            "author": {"id": "42", "username": "alice", "global_name": "Alice", "avatar": null},
            "content": "!cal 5",
            "timestamp": "2024-03-15T09:00:00.123000+00:00",
            "edited_timestamp": null,
            "attachments": [
                {"id": "7", "filename": "photo.png", "size": 1024,
                 "url": "https://cdn.discordapp.com/attachments/1/7/photo.png"}
            ],
            "mentions": [{"id": "99", "username": "coninco", "bot": true}],
            "type": 0
        }"#;

        let message: Message = serde_json::from_str(json).unwrap();
        assert_eq!(message.content, "!cal 5");
        assert_eq!(message.author.display_name(), "Alice");
        assert_eq!(message.attachments[0].filename, "photo.png");
        assert!(message.mentions_user(&UserId::new("99").unwrap()));
        assert!(!message.mentions_user(&UserId::new("42").unwrap()));
    }

    #[test]
    fn display_name_falls_back_to_username() {
        let user = User {
            id: UserId::new("42").unwrap(),
            username: "alice".to_string(),
            global_name: None,
            bot: false,
        };
        assert_eq!(user.display_name(), "alice");
        assert_eq!(user.mention(), "<@42>");
    }
}
