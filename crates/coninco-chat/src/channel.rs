//! The chat operations the bot needs, independent of the client behind them.

use std::future::Future;
use std::time::Duration;

use coninco_core::NotificationPayload;
use tokio::task::JoinHandle;

use crate::ChatError;
use crate::types::{ChannelId, Message, MessageId};

/// Something the bot can say in a channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutgoingMessage {
    /// Plain text, optionally as a reply to an earlier message.
    Text {
        content: String,
        reply_to: Option<MessageId>,
    },
    /// A calendar announcement rendered as a rich embed.
    Notification(NotificationPayload),
}

impl OutgoingMessage {
    pub fn text(content: impl Into<String>) -> Self {
        Self::Text {
            content: content.into(),
            reply_to: None,
        }
    }

    pub fn reply(content: impl Into<String>, to: MessageId) -> Self {
        Self::Text {
            content: content.into(),
            reply_to: Some(to),
        }
    }
}

/// Per-send options.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SendOptions {
    /// Delete the message again after this long.
    pub delete_after: Option<Duration>,
}

/// Chat operations used by command handlers and the notification cycle.
pub trait ChatChannel {
    /// Posts `message` and returns the ID of the created message.
    fn send(
        &self,
        channel: &ChannelId,
        message: &OutgoingMessage,
    ) -> impl Future<Output = Result<MessageId, ChatError>> + Send;

    fn delete(
        &self,
        channel: &ChannelId,
        message: &MessageId,
    ) -> impl Future<Output = Result<(), ChatError>> + Send;

    /// Up to `limit` of the newest messages, newest first.
    fn recent_messages(
        &self,
        channel: &ChannelId,
        limit: u8,
    ) -> impl Future<Output = Result<Vec<Message>, ChatError>> + Send;
}

/// A sent message and, if it expires, the task that will delete it.
#[derive(Debug)]
pub struct Sent {
    pub id: MessageId,
    pub expiry: Option<JoinHandle<()>>,
}

impl Sent {
    /// Waits for a pending deletion, if any.
    pub async fn settle(self) {
        if let Some(expiry) = self.expiry {
            if let Err(err) = expiry.await {
                tracing::warn!(%err, "message expiry task failed");
            }
        }
    }
}

/// Sends `message` and schedules its deletion when `options` ask for it.
///
/// The deletion runs as a detached task; a failure there is only logged.
pub async fn send_with<C>(
    chat: &C,
    channel: &ChannelId,
    message: &OutgoingMessage,
    options: SendOptions,
) -> Result<Sent, ChatError>
where
    C: ChatChannel + Clone + Send + Sync + 'static,
{
    let id = chat.send(channel, message).await?;
    let expiry = options
        .delete_after
        .map(|delay| schedule_delete(chat.clone(), channel.clone(), id.clone(), delay));
    Ok(Sent { id, expiry })
}

/// Deletes `message` after `delay` in a background task.
pub fn schedule_delete<C>(
    chat: C,
    channel: ChannelId,
    message: MessageId,
    delay: Duration,
) -> JoinHandle<()>
where
    C: ChatChannel + Send + Sync + 'static,
{
    tokio::spawn(async move {
        tokio::time::sleep(delay).await;
        match chat.delete(&channel, &message).await {
            Ok(()) => tracing::debug!(%channel, %message, "expired message deleted"),
            Err(err) => {
                tracing::warn!(%channel, %message, %err, "failed to delete expired message");
            }
        }
    })
}

#[cfg(test)]
pub(crate) mod testing {
    //! In-memory chat channel for tests.

    use std::sync::{Arc, Mutex};

    use super::*;

    #[derive(Debug, Default, Clone)]
    pub struct RecordingChannel {
        pub sent: Arc<Mutex<Vec<(ChannelId, OutgoingMessage)>>>,
        pub deleted: Arc<Mutex<Vec<MessageId>>>,
    }

    impl ChatChannel for RecordingChannel {
        fn send(
            &self,
            channel: &ChannelId,
            message: &OutgoingMessage,
        ) -> impl Future<Output = Result<MessageId, ChatError>> + Send {
            let mut sent = self.sent.lock().unwrap();
            sent.push((channel.clone(), message.clone()));
            let id = MessageId::new((1000 + sent.len()).to_string()).unwrap();
            async move { Ok(id) }
        }

        fn delete(
            &self,
            _channel: &ChannelId,
            message: &MessageId,
        ) -> impl Future<Output = Result<(), ChatError>> + Send {
            self.deleted.lock().unwrap().push(message.clone());
            async { Ok(()) }
        }

        fn recent_messages(
            &self,
            _channel: &ChannelId,
            _limit: u8,
        ) -> impl Future<Output = Result<Vec<Message>, ChatError>> + Send {
            async { Ok(Vec::new()) }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::testing::RecordingChannel;
    use super::*;

    fn channel() -> ChannelId {
        ChannelId::new("1").unwrap()
    }

    #[tokio::test]
    async fn send_without_expiry_keeps_message() {
        let chat = RecordingChannel::default();
        let sent = send_with(
            &chat,
            &channel(),
            &OutgoingMessage::text("hello"),
            SendOptions::default(),
        )
        .await
        .unwrap();

        assert!(sent.expiry.is_none());
        sent.settle().await;
        assert_eq!(chat.sent.lock().unwrap().len(), 1);
        assert!(chat.deleted.lock().unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn expiring_message_is_deleted_after_delay() {
        let chat = RecordingChannel::default();
        let sent = send_with(
            &chat,
            &channel(),
            &OutgoingMessage::text("temporary"),
            SendOptions {
                delete_after: Some(Duration::from_secs(15)),
            },
        )
        .await
        .unwrap();

        let id = sent.id.clone();
        assert!(chat.deleted.lock().unwrap().is_empty());
        sent.settle().await;
        assert_eq!(*chat.deleted.lock().unwrap(), vec![id]);
    }
}
