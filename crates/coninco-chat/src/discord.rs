//! Discord REST API client.

use std::fmt;
use std::future::Future;
use std::time::Duration;

use coninco_core::NotificationPayload;
use reqwest::{Method, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::ChatError;
use crate::channel::{ChatChannel, OutgoingMessage};
use crate::types::{ChannelId, Message, MessageId, User};

/// Default Discord API base URL.
pub const DEFAULT_API_BASE: &str = "https://discord.com/api/v10";

/// Default request timeout for API calls.
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// The API returns at most this many messages per page.
pub const MAX_PAGE: u8 = 100;

// Embed limits enforced by the API.
const TITLE_LIMIT: usize = 256;
const DESCRIPTION_LIMIT: usize = 4096;
const FIELD_VALUE_LIMIT: usize = 1024;
const CONTENT_LIMIT: usize = 2000;

/// Discord bot client.
///
/// # Thread Safety
///
/// The client is safe to clone and share across threads. Each clone shares
/// the underlying HTTP connection pool.
#[derive(Clone)]
pub struct DiscordClient {
    http: reqwest::Client,
    api_base: String,
    token: String,
}

impl fmt::Debug for DiscordClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DiscordClient")
            .field("api_base", &self.api_base)
            .field("token", &"[REDACTED]")
            .finish_non_exhaustive()
    }
}

impl DiscordClient {
    /// Creates a new client with the given bot token.
    ///
    /// # Errors
    ///
    /// Returns an error if the token is empty or whitespace-only, or if the
    /// HTTP client fails to build.
    pub fn new(token: impl Into<String>, api_base: impl Into<String>) -> Result<Self, ChatError> {
        let token = token.into();

        if token.is_empty() {
            return Err(ChatError::InvalidToken {
                reason: "bot token cannot be empty",
            });
        }
        if token.trim().is_empty() {
            return Err(ChatError::InvalidToken {
                reason: "bot token cannot be whitespace-only",
            });
        }

        let http = reqwest::Client::builder()
            .timeout(DEFAULT_TIMEOUT)
            .build()
            .map_err(ChatError::ClientBuild)?;

        Ok(Self {
            http,
            api_base: api_base.into().trim_end_matches('/').to_string(),
            token,
        })
    }

    /// The bot's own user.
    pub async fn current_user(&self) -> Result<User, ChatError> {
        self.call(self.request(Method::GET, "/users/@me")).await
    }

    /// Websocket address of the gateway, for [`crate::Gateway`].
    pub async fn gateway_url(&self) -> Result<String, ChatError> {
        #[derive(Deserialize)]
        struct GatewayBot {
            url: String,
        }

        let gateway: GatewayBot = self.call(self.request(Method::GET, "/gateway/bot")).await?;
        Ok(gateway.url)
    }

    /// Messages of `channel`, newest first.
    ///
    /// With `after` set, only messages newer than that one are returned.
    /// A `limit` of zero returns nothing without asking the API.
    pub async fn messages(
        &self,
        channel: &ChannelId,
        after: Option<&MessageId>,
        limit: u8,
    ) -> Result<Vec<Message>, ChatError> {
        if limit == 0 {
            return Ok(Vec::new());
        }
        let limit = limit.min(MAX_PAGE).to_string();
        let mut query = vec![("limit", limit)];
        if let Some(after) = after {
            query.push(("after", after.to_string()));
        }
        self.call(
            self.request(Method::GET, &format!("/channels/{channel}/messages"))
                .query(&query),
        )
        .await
    }

    /// Downloads an attachment from the CDN.
    pub async fn download(&self, url: &str) -> Result<Vec<u8>, ChatError> {
        let response = self.http.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(ChatError::Api {
                status: status.as_u16(),
                message: format!("download of {url} failed"),
            });
        }
        Ok(response.bytes().await?.to_vec())
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        self.http
            .request(method, format!("{}{path}", self.api_base))
            .header("Authorization", format!("Bot {}", self.token))
    }

    async fn call<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T, ChatError> {
        let body = self.call_raw(request).await?;
        serde_json::from_str(&body).map_err(|err| ChatError::InvalidResponse(err.to_string()))
    }

    async fn call_raw(&self, request: RequestBuilder) -> Result<String, ChatError> {
        let response = request.send().await?;
        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(parse_api_error(status, &body));
        }
        Ok(body)
    }
}

impl ChatChannel for DiscordClient {
    fn send(
        &self,
        channel: &ChannelId,
        message: &OutgoingMessage,
    ) -> impl Future<Output = Result<MessageId, ChatError>> + Send {
        let request = self
            .request(Method::POST, &format!("/channels/{channel}/messages"))
            .json(&CreateMessage::from(message));
        async move {
            let created: CreatedMessage = self.call(request).await?;
            tracing::debug!(id = %created.id, "message sent");
            Ok(created.id)
        }
    }

    fn delete(
        &self,
        channel: &ChannelId,
        message: &MessageId,
    ) -> impl Future<Output = Result<(), ChatError>> + Send {
        let request = self.request(
            Method::DELETE,
            &format!("/channels/{channel}/messages/{message}"),
        );
        async move {
            self.call_raw(request).await?;
            Ok(())
        }
    }

    fn recent_messages(
        &self,
        channel: &ChannelId,
        limit: u8,
    ) -> impl Future<Output = Result<Vec<Message>, ChatError>> + Send {
        self.messages(channel, None, limit)
    }
}

fn parse_api_error(status: StatusCode, body: &str) -> ChatError {
    #[derive(Deserialize)]
    struct ErrorPayload {
        message: String,
    }

    let message = serde_json::from_str::<ErrorPayload>(body)
        .map_or_else(|_| body.to_string(), |payload| payload.message);
    ChatError::Api {
        status: status.as_u16(),
        message,
    }
}

#[derive(Debug, Deserialize)]
struct CreatedMessage {
    id: MessageId,
}

/// Request body of the create-message endpoint.
#[derive(Debug, Serialize)]
struct CreateMessage {
    #[serde(skip_serializing_if = "Option::is_none")]
    content: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    embeds: Vec<Embed>,
    #[serde(skip_serializing_if = "Option::is_none")]
    message_reference: Option<MessageReference>,
}

#[derive(Debug, Serialize)]
struct MessageReference {
    message_id: MessageId,
    fail_if_not_exists: bool,
}

#[derive(Debug, Serialize)]
struct Embed {
    title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    description: Option<String>,
    url: String,
    color: u32,
    fields: Vec<EmbedField>,
}

#[derive(Debug, Serialize)]
struct EmbedField {
    name: String,
    value: String,
    inline: bool,
}

impl From<&OutgoingMessage> for CreateMessage {
    fn from(message: &OutgoingMessage) -> Self {
        match message {
            OutgoingMessage::Text { content, reply_to } => Self {
                content: Some(truncate(content, CONTENT_LIMIT)),
                embeds: Vec::new(),
                message_reference: reply_to.clone().map(|message_id| MessageReference {
                    message_id,
                    fail_if_not_exists: false,
                }),
            },
            OutgoingMessage::Notification(payload) => Self {
                content: None,
                embeds: vec![Embed::from(payload)],
                message_reference: None,
            },
        }
    }
}

impl From<&NotificationPayload> for Embed {
    fn from(payload: &NotificationPayload) -> Self {
        Self {
            title: truncate(&payload.title, TITLE_LIMIT),
            description: (!payload.description.is_empty())
                .then(|| truncate(&payload.description, DESCRIPTION_LIMIT)),
            url: payload.url.clone(),
            color: payload.color,
            fields: payload
                .fields
                .iter()
                .map(|field| EmbedField {
                    name: field.name.clone(),
                    // Empty field values are rejected by the API.
                    value: if field.value.is_empty() {
                        "-".to_string()
                    } else {
                        truncate(&field.value, FIELD_VALUE_LIMIT)
                    },
                    inline: field.inline,
                })
                .collect(),
        }
    }
}

/// Cuts `text` to at most `limit` characters.
fn truncate(text: &str, limit: usize) -> String {
    match text.char_indices().nth(limit) {
        Some((cut, _)) => text[..cut].to_string(),
        None => text.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use coninco_core::PayloadField;

    use super::*;

    fn payload() -> NotificationPayload {
        NotificationPayload {
            title: "🗓️  Dentist".to_string(),
            description: String::new(),
            url: "https://www.google.com/calendar/render?action=TEMPLATE&text=Dentist".to_string(),
            color: 0x00ff00,
            fields: vec![
                PayloadField {
                    name: "Person".to_string(),
                    value: "alice".to_string(),
                    inline: false,
                },
                PayloadField {
                    name: "From".to_string(),
                    value: "2024/03/15(Fri) 09:00".to_string(),
                    inline: true,
                },
            ],
        }
    }

    #[test]
    fn client_rejects_empty_token() {
        assert!(matches!(
            DiscordClient::new("", DEFAULT_API_BASE),
            Err(ChatError::InvalidToken { .. })
        ));
    }

    #[test]
    fn client_rejects_whitespace_token() {
        assert!(matches!(
            DiscordClient::new("   ", DEFAULT_API_BASE),
            Err(ChatError::InvalidToken { .. })
        ));
    }

    #[test]
    fn client_debug_redacts_token() {
        let client = DiscordClient::new("secret-token", DEFAULT_API_BASE).unwrap();
        let debug = format!("{client:?}");
        assert!(!debug.contains("secret-token"));
        assert!(debug.contains("[REDACTED]"));
    }

    #[test]
    fn client_trims_trailing_slash_from_base() {
        let client = DiscordClient::new("token", "http://localhost:8080/api/").unwrap();
        let request = client
            .request(Method::GET, "/users/@me")
            .build()
            .unwrap();
        assert_eq!(request.url().as_str(), "http://localhost:8080/api/users/@me");
        assert_eq!(
            request.headers()["Authorization"].to_str().unwrap(),
            "Bot token"
        );
    }

    #[test]
    fn notification_becomes_embed() {
        let body = CreateMessage::from(&OutgoingMessage::Notification(payload()));
        insta::assert_snapshot!(serde_json::to_string_pretty(&body).unwrap(), @r#"
        {
          "embeds": [
            {
              "title": "🗓️  Dentist",
              "url": "https://www.google.com/calendar/render?action=TEMPLATE&text=Dentist",
              "color": 65280,
              "fields": [
                {
                  "name": "Person",
                  "value": "alice",
                  "inline": false
                },
                {
                  "name": "From",
                  "value": "2024/03/15(Fri) 09:00",
                  "inline": true
                }
              ]
            }
          ]
        }
        "#);
    }

    #[test]
    fn reply_references_original_message() {
        let message = OutgoingMessage::reply("<@42> hi", MessageId::new("7").unwrap());
        let body = serde_json::to_value(CreateMessage::from(&message)).unwrap();
        assert_eq!(
            body,
            serde_json::json!({
                "content": "<@42> hi",
                "message_reference": {"message_id": "7", "fail_if_not_exists": false}
            })
        );
    }

    #[test]
    fn long_text_is_truncated_on_char_boundary() {
        let text = "日".repeat(300);
        assert_eq!(truncate(&text, TITLE_LIMIT).chars().count(), TITLE_LIMIT);
        assert_eq!(truncate("short", TITLE_LIMIT), "short");
    }

    #[test]
    fn api_error_uses_message_field() {
        let err = parse_api_error(
            StatusCode::FORBIDDEN,
            r#"{"message": "Missing Permissions", "code": 50013}"#,
        );
        assert_eq!(err.to_string(), "API error (403): Missing Permissions");
    }

    #[test]
    fn api_error_falls_back_to_body() {
        let err = parse_api_error(StatusCode::BAD_GATEWAY, "upstream down");
        assert!(matches!(err, ChatError::Api { status: 502, .. }));
        assert!(err.to_string().contains("upstream down"));
    }

    #[tokio::test]
    async fn zero_limit_lists_nothing_without_a_request() {
        let client = DiscordClient::new("token", "http://127.0.0.1:9").unwrap();
        let channel = ChannelId::new("500").unwrap();
        let recent = client.recent_messages(&channel, 0).await.unwrap();
        assert!(recent.is_empty());
    }

    #[tokio::test]
    async fn unreachable_api_is_a_request_error() {
        let client = DiscordClient::new("token", "http://127.0.0.1:9").unwrap();
        let err = client.current_user().await.unwrap_err();
        assert!(matches!(err, ChatError::Request(_)));
    }
}
