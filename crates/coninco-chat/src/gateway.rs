//! Discord gateway connection.
//!
//! A background task holds the websocket: it identifies (or resumes), keeps
//! the heartbeat going and forwards the message events the bot reacts to
//! over a channel. Dropped connections are reopened with backoff; a close
//! code that rejects the bot itself ends the task.

use std::fmt;
use std::time::Duration;

use futures_util::{Sink, SinkExt, StreamExt};
use serde::Deserialize;
use serde_json::json;
use serde_json::value::RawValue;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::{self, Message as WsMessage};

use crate::types::{ChannelId, GuildId, Message, MessageId, User};

pub const GUILDS: u64 = 1 << 0;
pub const GUILD_MESSAGES: u64 = 1 << 9;
pub const DIRECT_MESSAGES: u64 = 1 << 12;
/// Privileged; without it message content arrives empty.
pub const MESSAGE_CONTENT: u64 = 1 << 15;

/// Everything the bot needs: guild and direct messages with their content.
pub const DEFAULT_INTENTS: u64 = GUILDS | GUILD_MESSAGES | DIRECT_MESSAGES | MESSAGE_CONTENT;

const GATEWAY_QUERY: &str = "?v=10&encoding=json";
const EVENT_BUFFER: usize = 64;
const MAX_BACKOFF: Duration = Duration::from_secs(60);

const OP_DISPATCH: u8 = 0;
const OP_HEARTBEAT: u8 = 1;
const OP_IDENTIFY: u8 = 2;
const OP_RESUME: u8 = 6;
const OP_RECONNECT: u8 = 7;
const OP_INVALID_SESSION: u8 = 9;
const OP_HELLO: u8 = 10;
const OP_HEARTBEAT_ACK: u8 = 11;

/// Gateway connection errors.
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("websocket error: {0}")]
    WebSocket(Box<tungstenite::Error>),
    #[error("invalid gateway payload: {0}")]
    Payload(#[from] serde_json::Error),
    #[error("unexpected gateway payload: {0}")]
    Protocol(String),
    #[error("gateway closed the connection ({code}): {reason}")]
    Closed { code: u16, reason: String },
}

impl From<tungstenite::Error> for GatewayError {
    fn from(err: tungstenite::Error) -> Self {
        Self::WebSocket(Box::new(err))
    }
}

impl GatewayError {
    /// Close codes after which reconnecting cannot succeed: a bad token,
    /// or intents the application may not use.
    pub const fn is_fatal(&self) -> bool {
        matches!(self, Self::Closed { code: 4004 | 4010..=4014, .. })
    }
}

/// Events forwarded to the bot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GatewayEvent {
    /// The session is established.
    Ready {
        user: User,
        session_id: String,
        resume_url: String,
    },
    MessageCreate {
        /// Absent for direct messages.
        guild_id: Option<GuildId>,
        message: Message,
    },
    MessageDelete {
        id: MessageId,
        channel_id: ChannelId,
        guild_id: Option<GuildId>,
    },
}

/// One decoded gateway payload.
#[derive(Debug, PartialEq, Eq)]
enum Frame {
    Hello { heartbeat_interval: Duration },
    /// `event` is `None` for dispatches the bot does not handle.
    Dispatch {
        seq: Option<u64>,
        event: Option<GatewayEvent>,
    },
    HeartbeatRequest,
    HeartbeatAck,
    Reconnect,
    InvalidSession { resumable: bool },
    Other,
}

#[derive(Debug, Deserialize)]
struct Envelope {
    op: u8,
    #[serde(default)]
    d: Option<Box<RawValue>>,
    #[serde(default)]
    s: Option<u64>,
    #[serde(default)]
    t: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Hello {
    heartbeat_interval: u64,
}

#[derive(Debug, Deserialize)]
struct Ready {
    user: User,
    session_id: String,
    resume_gateway_url: String,
}

#[derive(Debug, Deserialize)]
struct MessageCreate {
    #[serde(default)]
    guild_id: Option<GuildId>,
    #[serde(flatten)]
    message: Message,
}

#[derive(Debug, Deserialize)]
struct MessageDelete {
    id: MessageId,
    channel_id: ChannelId,
    #[serde(default)]
    guild_id: Option<GuildId>,
}

fn decode_frame(text: &str) -> Result<Frame, GatewayError> {
    let envelope: Envelope = serde_json::from_str(text)?;
    let data = envelope.d.as_deref().map_or("null", RawValue::get);

    let frame = match envelope.op {
        OP_HELLO => {
            let hello: Hello = serde_json::from_str(data)?;
            Frame::Hello {
                heartbeat_interval: Duration::from_millis(hello.heartbeat_interval),
            }
        }
        OP_DISPATCH => {
            let name = envelope.t.as_deref().unwrap_or_default();
            let event = decode_event(name, data).unwrap_or_else(|err| {
                tracing::warn!(event = name, %err, "skipping undecodable event");
                None
            });
            Frame::Dispatch {
                seq: envelope.s,
                event,
            }
        }
        OP_HEARTBEAT => Frame::HeartbeatRequest,
        OP_HEARTBEAT_ACK => Frame::HeartbeatAck,
        OP_RECONNECT => Frame::Reconnect,
        OP_INVALID_SESSION => Frame::InvalidSession {
            resumable: serde_json::from_str(data).unwrap_or(false),
        },
        op => {
            tracing::trace!(op, "ignoring gateway opcode");
            Frame::Other
        }
    };
    Ok(frame)
}

fn decode_event(name: &str, data: &str) -> Result<Option<GatewayEvent>, serde_json::Error> {
    let event = match name {
        "READY" => {
            let ready: Ready = serde_json::from_str(data)?;
            GatewayEvent::Ready {
                user: ready.user,
                session_id: ready.session_id,
                resume_url: ready.resume_gateway_url,
            }
        }
        "MESSAGE_CREATE" => {
            let created: MessageCreate = serde_json::from_str(data)?;
            GatewayEvent::MessageCreate {
                guild_id: created.guild_id,
                message: created.message,
            }
        }
        "MESSAGE_DELETE" => {
            let deleted: MessageDelete = serde_json::from_str(data)?;
            GatewayEvent::MessageDelete {
                id: deleted.id,
                channel_id: deleted.channel_id,
                guild_id: deleted.guild_id,
            }
        }
        _ => return Ok(None),
    };
    Ok(Some(event))
}

/// Turns a websocket message into a frame; control messages yield `None`.
fn read_frame(message: WsMessage) -> Result<Option<Frame>, GatewayError> {
    match message {
        WsMessage::Text(text) => decode_frame(&text).map(Some),
        WsMessage::Binary(bytes) => {
            let text = String::from_utf8(bytes)
                .map_err(|err| GatewayError::Protocol(format!("invalid utf-8 payload: {err}")))?;
            decode_frame(&text).map(Some)
        }
        WsMessage::Close(Some(frame)) => Err(GatewayError::Closed {
            code: u16::from(frame.code),
            reason: frame.reason.into_owned(),
        }),
        WsMessage::Close(None)
        | WsMessage::Ping(_)
        | WsMessage::Pong(_)
        | WsMessage::Frame(_) => Ok(None),
    }
}

fn identify_payload(token: &str, intents: u64) -> String {
    json!({
        "op": OP_IDENTIFY,
        "d": {
            "token": token,
            "intents": intents,
            "properties": {
                "os": std::env::consts::OS,
                "browser": "coninco",
                "device": "coninco",
            },
        },
    })
    .to_string()
}

fn resume_payload(token: &str, session_id: &str, seq: u64) -> String {
    json!({
        "op": OP_RESUME,
        "d": {"token": token, "session_id": session_id, "seq": seq},
    })
    .to_string()
}

fn heartbeat_payload(seq: Option<u64>) -> String {
    json!({"op": OP_HEARTBEAT, "d": seq}).to_string()
}

/// Delay before reconnecting after `failures` consecutive errors.
fn backoff(failures: u32) -> Duration {
    Duration::from_secs(1 << failures.min(6)).min(MAX_BACKOFF)
}

/// What survives a dropped connection.
#[derive(Debug, Default)]
struct Session {
    id: Option<String>,
    resume_url: Option<String>,
    seq: Option<u64>,
}

impl Session {
    fn greeting(&self, token: &str, intents: u64) -> String {
        match (&self.id, self.seq) {
            (Some(id), Some(seq)) => resume_payload(token, id, seq),
            _ => identify_payload(token, intents),
        }
    }
}

/// Why a connection ended without an error.
#[derive(Debug, PartialEq, Eq)]
enum Disconnect {
    Reconnect,
    /// Nobody is listening for events any more.
    Stopped,
}

/// Gateway client configuration; [`Gateway::spawn`] starts the connection.
#[derive(Clone)]
pub struct Gateway {
    url: String,
    token: String,
    intents: u64,
}

impl fmt::Debug for Gateway {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Gateway")
            .field("url", &self.url)
            .field("token", &"[REDACTED]")
            .field("intents", &self.intents)
            .finish()
    }
}

impl Gateway {
    pub fn new(url: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            token: token.into(),
            intents: DEFAULT_INTENTS,
        }
    }

    /// Connects in a background task and returns the event stream.
    ///
    /// The receiver yields `None` once the task gives up, which only
    /// happens on a fatal close code. Dropping the receiver stops the task
    /// at the next event.
    pub fn spawn(self) -> (mpsc::Receiver<GatewayEvent>, JoinHandle<()>) {
        let (events, receiver) = mpsc::channel(EVENT_BUFFER);
        let handle = tokio::spawn(self.run(events));
        (receiver, handle)
    }

    async fn run(self, events: mpsc::Sender<GatewayEvent>) {
        let mut session = Session::default();
        let mut failures: u32 = 0;
        while !events.is_closed() {
            match self.connect(&mut session, &events).await {
                Ok(Disconnect::Stopped) => return,
                Ok(Disconnect::Reconnect) => failures = 0,
                Err(err) if err.is_fatal() => {
                    tracing::error!(%err, "gateway rejected the bot");
                    return;
                }
                Err(err) => {
                    failures = failures.saturating_add(1);
                    tracing::warn!(%err, failures, "gateway connection lost");
                }
            }
            tokio::time::sleep(backoff(failures)).await;
        }
    }

    async fn connect(
        &self,
        session: &mut Session,
        events: &mpsc::Sender<GatewayEvent>,
    ) -> Result<Disconnect, GatewayError> {
        let base = session.resume_url.as_deref().unwrap_or(&self.url);
        let url = format!("{}/{GATEWAY_QUERY}", base.trim_end_matches('/'));
        let (stream, _response) = connect_async(url.as_str()).await?;
        let (mut sink, mut source) = stream.split();
        tracing::debug!(%url, "gateway connected");

        let interval = loop {
            let Some(message) = source.next().await else {
                return Ok(Disconnect::Reconnect);
            };
            match read_frame(message?)? {
                Some(Frame::Hello { heartbeat_interval }) => break heartbeat_interval,
                Some(other) => {
                    return Err(GatewayError::Protocol(format!(
                        "expected hello, got {other:?}"
                    )));
                }
                None => {}
            }
        };
        send_text(&mut sink, session.greeting(&self.token, self.intents)).await?;

        let mut heartbeat = tokio::time::interval_at(Instant::now() + interval, interval);
        heartbeat.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut acknowledged = true;

        loop {
            tokio::select! {
                _ = heartbeat.tick() => {
                    if !acknowledged {
                        tracing::warn!("heartbeat not acknowledged");
                        return Ok(Disconnect::Reconnect);
                    }
                    acknowledged = false;
                    send_text(&mut sink, heartbeat_payload(session.seq)).await?;
                }
                maybe_message = source.next() => {
                    let Some(message) = maybe_message else {
                        return Ok(Disconnect::Reconnect);
                    };
                    let Some(frame) = read_frame(message?)? else {
                        continue;
                    };
                    match frame {
                        Frame::HeartbeatAck => acknowledged = true,
                        Frame::HeartbeatRequest => {
                            send_text(&mut sink, heartbeat_payload(session.seq)).await?;
                        }
                        Frame::Reconnect => return Ok(Disconnect::Reconnect),
                        Frame::InvalidSession { resumable } => {
                            if !resumable {
                                *session = Session::default();
                            }
                            return Ok(Disconnect::Reconnect);
                        }
                        Frame::Dispatch { seq, event } => {
                            if seq.is_some() {
                                session.seq = seq;
                            }
                            let Some(event) = event else {
                                continue;
                            };
                            if let GatewayEvent::Ready { user, session_id, resume_url } = &event {
                                tracing::info!(user = %user.username, "gateway session ready");
                                session.id = Some(session_id.clone());
                                session.resume_url = Some(resume_url.clone());
                            }
                            if events.send(event).await.is_err() {
                                return Ok(Disconnect::Stopped);
                            }
                        }
                        Frame::Hello { .. } | Frame::Other => {}
                    }
                }
            }
        }
    }
}

async fn send_text<S>(sink: &mut S, text: String) -> Result<(), GatewayError>
where
    S: Sink<WsMessage, Error = tungstenite::Error> + Unpin,
{
    sink.send(WsMessage::Text(text)).await?;
    Ok(())
}
