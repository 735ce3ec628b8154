//! Posting calendar announcements, on demand and once a day.

use std::io::Write;

use anyhow::{Context, Result};
use chrono::NaiveDate;
use coninco_chat::{
    ChannelId, ChatChannel, DiscordClient, OutgoingMessage, SendOptions, Sent, send_with,
};
use coninco_core::{CalendarSchedule, EventWindow, parse_events, select};
use coninco_feed::{BlobStore, FeedCache, FsBlobStore, HttpTransport, Transport};

use crate::commands::local_today;
use crate::{Config, FeedConfig};

/// How one round of announcements is made.
#[derive(Debug, Clone, Copy)]
pub struct PostRequest {
    pub window: EventWindow,
    pub today: NaiveDate,
    /// Download feeds even when a cached copy exists.
    pub overwrite: bool,
    pub options: SendOptions,
}

/// Outcome of posting every configured feed.
#[derive(Debug, Default)]
pub struct Posted {
    pub sent: Vec<Sent>,
    /// Names of the feeds that could not be posted.
    pub failed: Vec<String>,
}

/// Posts the events of one feed that fall inside the requested window.
///
/// Nothing is sent unless the whole feed parses and every event can be
/// placed, so a broken feed never produces a partial announcement.
pub async fn post_feed<C, T, S>(
    chat: &C,
    cache: &FeedCache<T, S>,
    channel: &ChannelId,
    feed: &FeedConfig,
    request: PostRequest,
) -> Result<Vec<Sent>>
where
    C: ChatChannel + Clone + Send + Sync + 'static,
    T: Transport,
    S: BlobStore,
{
    let text = cache
        .fetch(&feed.url, &feed.name, request.overwrite)
        .await
        .with_context(|| format!("failed to fetch feed {}", feed.name))?;
    let events = parse_events(&text)
        .collect::<Result<Vec<_>, _>>()
        .with_context(|| format!("failed to parse feed {}", feed.name))?;
    let payloads = select(&events, request.window, request.today, &feed.name)
        .with_context(|| format!("failed to select events of feed {}", feed.name))?;
    tracing::debug!(
        feed = %feed.name,
        events = events.len(),
        selected = payloads.len(),
        "feed parsed"
    );

    let mut sent = Vec::with_capacity(payloads.len());
    for payload in payloads {
        let message = OutgoingMessage::Notification(payload);
        let posted = send_with(chat, channel, &message, request.options)
            .await
            .with_context(|| format!("failed to post an event of feed {}", feed.name))?;
        sent.push(posted);
    }
    Ok(sent)
}

/// Posts every feed in order; a failing feed is logged and skipped.
pub async fn post_all<C, T, S>(
    chat: &C,
    cache: &FeedCache<T, S>,
    channel: &ChannelId,
    feeds: &[FeedConfig],
    request: PostRequest,
) -> Posted
where
    C: ChatChannel + Clone + Send + Sync + 'static,
    T: Transport,
    S: BlobStore,
{
    let mut posted = Posted::default();
    for feed in feeds {
        match post_feed(chat, cache, channel, feed, request).await {
            Ok(sent) => {
                tracing::info!(feed = %feed.name, events = sent.len(), "feed posted");
                posted.sent.extend(sent);
            }
            Err(err) => {
                tracing::error!(feed = %feed.name, "{err:#}");
                posted.failed.push(feed.name.clone());
            }
        }
    }
    posted
}

/// The recurring announcement into the calendar channel.
#[derive(Debug)]
pub struct DailyCycle {
    schedule: CalendarSchedule,
    channel: ChannelId,
}

impl DailyCycle {
    pub fn new(channel: ChannelId) -> Self {
        Self {
            schedule: CalendarSchedule::default(),
            channel,
        }
    }

    /// Runs one cycle with fresh downloads and returns the window it used.
    pub async fn run_once<C, T, S>(
        &mut self,
        chat: &C,
        cache: &FeedCache<T, S>,
        feeds: &[FeedConfig],
        today: NaiveDate,
    ) -> (EventWindow, Posted)
    where
        C: ChatChannel + Clone + Send + Sync + 'static,
        T: Transport,
        S: BlobStore,
    {
        let window = self.schedule.next_window();
        tracing::info!(low = window.low, high = window.high, "calendar cycle started");
        let request = PostRequest {
            window,
            today,
            overwrite: true,
            options: SendOptions::default(),
        };
        let posted = post_all(chat, cache, &self.channel, feeds, request).await;
        (window, posted)
    }
}

/// Builds the cache of configured feeds in front of an HTTP transport.
pub fn feed_cache(config: &Config) -> Result<FeedCache<HttpTransport, FsBlobStore>> {
    let transport =
        HttpTransport::new(config.fetch_timeout()).context("failed to build feed transport")?;
    Ok(FeedCache::new(
        transport,
        FsBlobStore::new(&config.calendar_dir),
    ))
}

/// Runs the one-shot `calendar` subcommand.
pub fn run<W: Write>(
    writer: &mut W,
    config: &Config,
    days: Option<i64>,
    overwrite: bool,
    channel: Option<ChannelId>,
) -> Result<()> {
    let channel = channel
        .or_else(|| config.calendar_channel.clone())
        .context("no channel given and no calendar_channel configured")?;
    let chat = DiscordClient::new(config.require_token()?, config.api_base.as_str())
        .context("failed to create chat client")?;
    let cache = feed_cache(config)?;
    let request = PostRequest {
        window: EventWindow::new(0, days.unwrap_or(config.default_days)),
        today: local_today(),
        overwrite,
        options: SendOptions::default(),
    };

    let runtime = tokio::runtime::Runtime::new().context("failed to initialize tokio runtime")?;
    let posted = runtime.block_on(post_all(&chat, &cache, &channel, &config.feeds, request));

    writeln!(writer, "Posted {} events to {channel}", posted.sent.len())?;
    if !posted.failed.is_empty() {
        anyhow::bail!("failed feeds: {}", posted.failed.join(", "));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use coninco_core::NotificationPayload;

    use super::*;
    use crate::commands::testing::{
        MemoryStore, RecordingChat, StaticTransport, TEAM_ICS, channel, today,
    };

    const TEAM_URL: &str = "https://example.com/team.ics";

    fn team() -> FeedConfig {
        FeedConfig {
            name: "team".to_string(),
            url: TEAM_URL.to_string(),
        }
    }

    fn request(window: EventWindow) -> PostRequest {
        PostRequest {
            window,
            today: today(),
            overwrite: false,
            options: SendOptions::default(),
        }
    }

    fn titles(chat: &RecordingChat) -> Vec<String> {
        chat.sent()
            .into_iter()
            .filter_map(|message| match message {
                OutgoingMessage::Notification(NotificationPayload { title, .. }) => Some(title),
                OutgoingMessage::Text { .. } => None,
            })
            .collect()
    }

    #[tokio::test]
    async fn posts_events_inside_window_in_feed_order() {
        let chat = RecordingChat::default();
        let cache = FeedCache::new(
            StaticTransport::with(TEAM_URL, TEAM_ICS),
            MemoryStore::default(),
        );

        let sent = post_feed(&chat, &cache, &channel(), &team(), request(EventWindow::new(0, 10)))
            .await
            .unwrap();

        assert_eq!(sent.len(), 2);
        assert_eq!(titles(&chat), ["🗓️  Standup", "🗓️  Retro"]);
    }

    #[tokio::test]
    async fn cached_feed_is_reused_without_overwrite() {
        let chat = RecordingChat::default();
        let store = MemoryStore::default();
        store.write("team", TEAM_ICS).unwrap();
        // The transport knows no documents, so any download would fail.
        let cache = FeedCache::new(StaticTransport::default(), store);

        let posted =
            post_all(&chat, &cache, &channel(), &[team()], request(EventWindow::new(0, 10))).await;

        assert!(posted.failed.is_empty());
        assert_eq!(posted.sent.len(), 2);
    }

    #[tokio::test]
    async fn overwrite_requires_download() {
        let chat = RecordingChat::default();
        let store = MemoryStore::default();
        store.write("team", TEAM_ICS).unwrap();
        let cache = FeedCache::new(StaticTransport::default(), store);
        let mut request = request(EventWindow::new(0, 10));
        request.overwrite = true;

        let posted = post_all(&chat, &cache, &channel(), &[team()], request).await;

        assert_eq!(posted.failed, ["team"]);
        assert!(chat.sent().is_empty());
    }

    #[tokio::test]
    async fn failing_feed_is_skipped() {
        let chat = RecordingChat::default();
        let cache = FeedCache::new(
            StaticTransport::with(TEAM_URL, TEAM_ICS),
            MemoryStore::default(),
        );
        let feeds = [
            FeedConfig {
                name: "gone".to_string(),
                url: "https://example.com/gone.ics".to_string(),
            },
            team(),
        ];

        let posted =
            post_all(&chat, &cache, &channel(), &feeds, request(EventWindow::new(0, 10))).await;

        assert_eq!(posted.failed, ["gone"]);
        assert_eq!(posted.sent.len(), 2);
    }

    #[tokio::test]
    async fn event_without_start_fails_whole_feed() {
        let chat = RecordingChat::default();
        let broken = "BEGIN:VEVENT
SUMMARY:Standup
DTSTART:20240312T100000
DTEND:20240312T103000
END:VEVENT
BEGIN:VEVENT
SUMMARY:Undated
END:VEVENT
";
        let cache = FeedCache::new(
            StaticTransport::with(TEAM_URL, broken),
            MemoryStore::default(),
        );

        let err = post_feed(&chat, &cache, &channel(), &team(), request(EventWindow::new(0, 10)))
            .await
            .unwrap_err();

        assert!(format!("{err:#}").contains("DTSTART"));
        assert!(chat.sent().is_empty());
    }

    #[tokio::test]
    async fn daily_cycles_switch_window_once() {
        let chat = RecordingChat::default();
        let cache = FeedCache::new(
            StaticTransport::with(TEAM_URL, TEAM_ICS),
            MemoryStore::default(),
        );
        let feeds = [team()];
        let mut cycle = DailyCycle::new(channel());

        let (first, posted) = cycle.run_once(&chat, &cache, &feeds, today()).await;
        assert_eq!(first, EventWindow::new(0, 9));
        assert_eq!(posted.sent.len(), 2);

        let (second, _) = cycle.run_once(&chat, &cache, &feeds, today()).await;
        let (third, _) = cycle.run_once(&chat, &cache, &feeds, today()).await;
        assert_eq!(second, EventWindow::new(9, 10));
        assert_eq!(third, EventWindow::new(9, 10));
        assert_eq!(cache.store().entries.lock().unwrap().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn expiring_announcements_are_deleted() {
        let chat = RecordingChat::default();
        let cache = FeedCache::new(
            StaticTransport::with(TEAM_URL, TEAM_ICS),
            MemoryStore::default(),
        );
        let mut request = request(EventWindow::new(0, 10));
        request.options.delete_after = Some(Duration::from_secs(15));

        let sent = post_feed(&chat, &cache, &channel(), &team(), request)
            .await
            .unwrap();
        for message in sent {
            message.settle().await;
        }

        let mut deleted = chat.deleted();
        deleted.sort();
        assert_eq!(deleted, ["9001", "9002"]);
    }
}
