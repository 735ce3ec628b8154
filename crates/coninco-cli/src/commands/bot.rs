//! The long-running bot: gateway events, the chat log, commands and the
//! daily announcement cycle.

use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use anyhow::{Context, Result, bail};
use chrono::{DateTime, FixedOffset, Local, NaiveDate};
use coninco_chat::discord::MAX_PAGE;
use coninco_chat::{
    ChannelId, ChatChannel, ChatLog, DiscordClient, Gateway, GatewayEvent, GuildId, Message,
    MessageId, OutgoingMessage, SendOptions, User, UserId,
};
use coninco_core::{Command, CommandParser, EventWindow};
use coninco_feed::{BlobStore, FeedCache, Transport};

use crate::commands::calendar::{DailyCycle, PostRequest, feed_cache, post_all};
use crate::commands::local_today;
use crate::{Config, FeedConfig};

/// Settings the bot consults while handling messages.
#[derive(Debug, Clone)]
pub struct BotSettings {
    pub feeds: Vec<FeedConfig>,
    pub mention_reply: String,
    pub delete_after: Duration,
    /// Authors remembered for deletion entries.
    pub remembered_messages: usize,
}

impl From<&Config> for BotSettings {
    fn from(config: &Config) -> Self {
        Self {
            feeds: config.feeds.clone(),
            mention_reply: config.mention_reply.clone(),
            delete_after: config.delete_after(),
            remembered_messages: config.message_cache_size,
        }
    }
}

/// Authors of the most recently seen messages, oldest forgotten first.
///
/// Deletion events carry only the message ID, so the author for the log
/// entry has to come from here.
#[derive(Debug)]
struct RecentAuthors {
    capacity: usize,
    order: VecDeque<MessageId>,
    authors: HashMap<MessageId, User>,
}

impl RecentAuthors {
    fn new(capacity: usize) -> Self {
        Self {
            capacity,
            order: VecDeque::new(),
            authors: HashMap::new(),
        }
    }

    fn remember(&mut self, message: &Message) {
        if self.capacity == 0 {
            return;
        }
        if self
            .authors
            .insert(message.id.clone(), message.author.clone())
            .is_none()
        {
            self.order.push_back(message.id.clone());
        }
        while self.order.len() > self.capacity {
            if let Some(oldest) = self.order.pop_front() {
                self.authors.remove(&oldest);
            }
        }
    }

    fn forget(&mut self, id: &MessageId) -> Option<User> {
        let author = self.authors.remove(id)?;
        self.order.retain(|seen| seen != id);
        Some(author)
    }
}

/// Reacts to chat messages and runs the announcement cycle.
#[derive(Debug)]
pub struct Bot<C, T, S> {
    chat: C,
    cache: FeedCache<T, S>,
    log: ChatLog,
    parser: CommandParser,
    settings: BotSettings,
    me: UserId,
    seen: Mutex<RecentAuthors>,
}

impl<C, T, S> Bot<C, T, S>
where
    C: ChatChannel + Clone + Send + Sync + 'static,
    T: Transport,
    S: BlobStore,
{
    pub fn new(
        chat: C,
        cache: FeedCache<T, S>,
        log: ChatLog,
        parser: CommandParser,
        settings: BotSettings,
        me: UserId,
    ) -> Self {
        let seen = Mutex::new(RecentAuthors::new(settings.remembered_messages));
        Self {
            chat,
            cache,
            log,
            parser,
            settings,
            me,
            seen,
        }
    }

    pub const fn log(&self) -> &ChatLog {
        &self.log
    }

    /// Logs `message`, answers mentions and runs any command it carries.
    ///
    /// A command that fails is answered with an error reply in the same
    /// channel. The bot's own messages are logged but never acted on.
    pub async fn handle_message(
        &self,
        guild: Option<&GuildId>,
        message: &Message,
        today: NaiveDate,
    ) -> Result<()> {
        if let Err(err) = self.log.record(guild, message) {
            tracing::warn!(id = %message.id, %err, "failed to log message");
        }
        self.seen
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remember(message);
        if message.author.id == self.me {
            return Ok(());
        }

        if message.mentions_user(&self.me) {
            let reply = self
                .settings
                .mention_reply
                .replace("{mention}", &message.author.mention());
            self.chat
                .send(
                    &message.channel_id,
                    &OutgoingMessage::reply(reply, message.id.clone()),
                )
                .await
                .context("failed to answer mention")?;
        }

        let command = match self.parser.parse(&message.content) {
            Ok(Some(command)) => command,
            Ok(None) => return Ok(()),
            Err(err) => return self.report_error(message, &anyhow::Error::from(err)).await,
        };
        tracing::info!(author = %message.author.username, ?command, "command received");

        if let Err(err) = self.execute(command, message, today).await {
            tracing::error!(?command, "command failed: {err:#}");
            self.report_error(message, &err).await?;
        }
        Ok(())
    }

    /// Logs that a message was deleted, if its author is still remembered.
    ///
    /// Returns whether an entry was written.
    pub fn handle_deletion(
        &self,
        guild: Option<&GuildId>,
        channel: &ChannelId,
        id: &MessageId,
        at: DateTime<FixedOffset>,
    ) -> Result<bool> {
        let author = self
            .seen
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .forget(id);
        let Some(author) = author else {
            tracing::debug!(%id, "deleted message was not seen");
            return Ok(false);
        };
        self.log
            .record_deletion(guild, channel, id, &author, at)
            .with_context(|| format!("failed to log deletion of {id}"))?;
        Ok(true)
    }

    /// Runs one daily cycle, logging how it went.
    pub async fn run_cycle(&self, cycle: &mut DailyCycle, today: NaiveDate) {
        let (window, posted) = cycle
            .run_once(&self.chat, &self.cache, &self.settings.feeds, today)
            .await;
        tracing::info!(
            low = window.low,
            high = window.high,
            posted = posted.sent.len(),
            failed = posted.failed.len(),
            "calendar cycle finished"
        );
    }

    async fn execute(&self, command: Command, message: &Message, today: NaiveDate) -> Result<()> {
        let channel = &message.channel_id;
        match command {
            Command::Calendar { days, delete } => {
                if delete {
                    self.chat
                        .delete(channel, &message.id)
                        .await
                        .context("failed to delete command message")?;
                }
                let request = PostRequest {
                    window: EventWindow::new(0, days),
                    today,
                    overwrite: false,
                    options: SendOptions {
                        delete_after: delete.then_some(self.settings.delete_after),
                    },
                };
                let posted =
                    post_all(&self.chat, &self.cache, channel, &self.settings.feeds, request).await;
                if !posted.failed.is_empty() {
                    bail!("could not post {}", posted.failed.join(", "));
                }
            }
            Command::Delete { count } => {
                let deleted = self.delete_recent(channel, count).await?;
                tracing::info!(%channel, deleted, "recent messages deleted");
            }
            Command::Reserve => tracing::debug!("reserve has no effect"),
        }
        Ok(())
    }

    /// Deletes up to `count` of the newest messages in `channel`.
    async fn delete_recent(&self, channel: &ChannelId, count: u32) -> Result<usize> {
        if count == 0 {
            return Ok(0);
        }
        let limit = u8::try_from(count).unwrap_or(u8::MAX).min(MAX_PAGE);
        let recent = self
            .chat
            .recent_messages(channel, limit)
            .await
            .context("failed to list recent messages")?;
        for old in &recent {
            self.chat
                .delete(channel, &old.id)
                .await
                .with_context(|| format!("failed to delete message {}", old.id))?;
        }
        Ok(recent.len())
    }

    async fn report_error(&self, message: &Message, err: &anyhow::Error) -> Result<()> {
        let reply = OutgoingMessage::reply(format!("error: {err:#}"), message.id.clone());
        self.chat
            .send(&message.channel_id, &reply)
            .await
            .context("failed to report command error")?;
        Ok(())
    }
}

/// Downloads every attachment of `message` into the log.
async fn archive_attachments(
    client: &DiscordClient,
    log: &ChatLog,
    guild: Option<&GuildId>,
    message: &Message,
) {
    let day = message.timestamp.with_timezone(&Local).date_naive();
    for attachment in &message.attachments {
        let saved = match client.download(&attachment.url).await {
            Ok(data) => log
                .save_attachment(guild, day, &attachment.filename, &data)
                .map_err(anyhow::Error::from),
            Err(err) => Err(err.into()),
        };
        match saved {
            Ok(path) => tracing::info!(path = %path.display(), "attachment saved"),
            Err(err) => tracing::warn!(
                file = %attachment.filename,
                "failed to save attachment: {err:#}"
            ),
        }
    }
}

/// Routes one gateway event to the bot.
async fn dispatch<T, S>(
    client: &DiscordClient,
    bot: &Bot<DiscordClient, T, S>,
    event: GatewayEvent,
) where
    T: Transport,
    S: BlobStore,
{
    match event {
        GatewayEvent::Ready { user, .. } => {
            tracing::debug!(user = %user.username, "receiving messages");
        }
        GatewayEvent::MessageCreate { guild_id, message } => {
            let guild = guild_id.as_ref();
            archive_attachments(client, bot.log(), guild, &message).await;
            if let Err(err) = bot.handle_message(guild, &message, local_today()).await {
                tracing::warn!(id = %message.id, "{err:#}");
            }
        }
        GatewayEvent::MessageDelete {
            id,
            channel_id,
            guild_id,
        } => {
            let at = Local::now().fixed_offset();
            if let Err(err) = bot.handle_deletion(guild_id.as_ref(), &channel_id, &id, at) {
                tracing::warn!(%id, "{err:#}");
            }
        }
    }
}

/// Runs the `run` subcommand until Ctrl-C.
pub fn run(config: &Config, no_schedule: bool) -> Result<()> {
    let runtime = tokio::runtime::Runtime::new().context("failed to initialize tokio runtime")?;
    runtime.block_on(serve(config, no_schedule))
}

async fn serve(config: &Config, no_schedule: bool) -> Result<()> {
    let token = config.require_token()?;
    let client = DiscordClient::new(token, config.api_base.as_str())
        .context("failed to create chat client")?;
    let me = client
        .current_user()
        .await
        .context("failed to identify the bot user")?;
    tracing::info!(user = %me.username, id = %me.id, "logged in");

    let gateway_url = match &config.gateway_url {
        Some(url) => url.clone(),
        None => client
            .gateway_url()
            .await
            .context("failed to look up the gateway address")?,
    };
    let (mut events, gateway) = Gateway::new(gateway_url, token).spawn();

    let bot = Bot::new(
        client.clone(),
        feed_cache(config)?,
        ChatLog::new(&config.log_dir),
        CommandParser::new(config.command_prefix, config.command_defaults()),
        BotSettings::from(config),
        me.id,
    );

    let mut cycle = match &config.calendar_channel {
        _ if no_schedule => None,
        Some(channel) => Some(DailyCycle::new(channel.clone())),
        None => {
            tracing::warn!("no calendar_channel configured, daily announcements disabled");
            None
        }
    };

    let mut notify = tokio::time::interval(config.notify_interval());
    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            result = &mut shutdown => {
                gateway.abort();
                result.context("failed to listen for Ctrl-C")?;
                tracing::info!("shutting down");
                return Ok(());
            }
            _ = notify.tick(), if cycle.is_some() => {
                if let Some(cycle) = cycle.as_mut() {
                    bot.run_cycle(cycle, local_today()).await;
                }
            }
            event = events.recv() => {
                let Some(event) = event else {
                    bail!("gateway connection ended");
                };
                dispatch(&client, &bot, event).await;
            }
        }
    }
}
