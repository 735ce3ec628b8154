//! Configuration loading and management.

use std::fmt;
use std::fs;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, bail, ensure};
use coninco_chat::ChannelId;
use coninco_chat::discord::DEFAULT_API_BASE;
use coninco_core::CommandDefaults;
use coninco_feed::DEFAULT_TIMEOUT;
use figment::Figment;
use figment::providers::{Data, Env, Format, Serialized, Toml};
use serde::{Deserialize, Serialize};

/// `--config` value that reads the configuration from stdin.
const STDIN_PATH: &str = "-";

/// A calendar feed to announce.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedConfig {
    /// Shown on every announcement; also names the cached copy.
    pub name: String,
    /// `https://` or `webcal://` address of the iCalendar document.
    pub url: String,
}

/// Application configuration.
#[derive(Clone, Serialize, Deserialize)]
pub struct Config {
    /// Bot token used to authenticate against the chat API.
    pub token: Option<String>,
    pub api_base: String,
    /// Gateway websocket address; looked up through the API when unset.
    pub gateway_url: Option<String>,
    /// First character of every command.
    pub command_prefix: char,
    /// Root of the message and attachment log.
    pub log_dir: PathBuf,
    /// Where downloaded feeds are cached.
    pub calendar_dir: PathBuf,
    /// Channel receiving the daily announcements.
    pub calendar_channel: Option<ChannelId>,
    pub feeds: Vec<FeedConfig>,
    /// How many recent messages are remembered to log their deletion.
    pub message_cache_size: usize,
    pub notify_interval_hours: u64,
    pub fetch_timeout_secs: u64,
    /// Delay before `del` announcements disappear.
    pub delete_after_secs: u64,
    /// Day horizon of the calendar command when none is given.
    pub default_days: i64,
    /// Reply to a mention; `{mention}` is replaced by the author's mention.
    pub mention_reply: String,
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("token", &self.token.as_ref().map(|_| "[REDACTED]"))
            .field("api_base", &self.api_base)
            .field("gateway_url", &self.gateway_url)
            .field("command_prefix", &self.command_prefix)
            .field("log_dir", &self.log_dir)
            .field("calendar_dir", &self.calendar_dir)
            .field("calendar_channel", &self.calendar_channel)
            .field("feeds", &self.feeds)
            .field("message_cache_size", &self.message_cache_size)
            .field("notify_interval_hours", &self.notify_interval_hours)
            .field("fetch_timeout_secs", &self.fetch_timeout_secs)
            .field("delete_after_secs", &self.delete_after_secs)
            .field("default_days", &self.default_days)
            .field("mention_reply", &self.mention_reply)
            .finish()
    }
}

impl Default for Config {
    fn default() -> Self {
        let data_dir = dirs_data_path().unwrap_or_else(|| PathBuf::from("."));
        Self {
            token: None,
            api_base: DEFAULT_API_BASE.to_string(),
            gateway_url: None,
            command_prefix: '!',
            log_dir: data_dir.join("log"),
            calendar_dir: data_dir.join("calendar"),
            calendar_channel: None,
            feeds: Vec::new(),
            message_cache_size: 1000,
            notify_interval_hours: 24,
            fetch_timeout_secs: DEFAULT_TIMEOUT.as_secs(),
            delete_after_secs: 15,
            default_days: 10,
            mention_reply: "{mention} you called? I'm still under construction.".to_string(),
        }
    }
}

impl Config {
    /// Loads configuration, optionally from a specific file or stdin (`-`).
    #[expect(
        clippy::result_large_err,
        reason = "figment::Error is large but only returned at startup"
    )]
    pub fn load_from(config_path: Option<&Path>) -> Result<Self, figment::Error> {
        let source = match config_path {
            None => None,
            Some(path) if path == Path::new(STDIN_PATH) => {
                let mut text = String::new();
                io::stdin()
                    .read_to_string(&mut text)
                    .map_err(|err| format!("failed to read config from stdin: {err}"))?;
                Some(Toml::string(&text))
            }
            Some(path) => {
                if !path.is_file() {
                    return Err(format!("config file {} does not exist", path.display()).into());
                }
                Some(Toml::file(path))
            }
        };
        layered(source).extract()
    }

    /// Checks values that would otherwise fail deep inside the bot.
    pub fn validate(&self) -> Result<()> {
        ensure!(self.message_cache_size > 0, "message_cache_size must be positive");
        ensure!(
            self.notify_interval_hours > 0,
            "notify_interval_hours must be positive"
        );
        ensure!(self.fetch_timeout_secs > 0, "fetch_timeout_secs must be positive");
        for feed in &self.feeds {
            let name = feed.name.as_str();
            if name.is_empty() || name == "." || name == ".." || name.contains(['/', '\\']) {
                bail!("feed name {name:?} cannot be used as a file name");
            }
            ensure!(!feed.url.trim().is_empty(), "feed {name} has no url");
        }
        Ok(())
    }

    /// The bot token, which every chat operation needs.
    pub fn require_token(&self) -> Result<&str> {
        self.token
            .as_deref()
            .filter(|token| !token.trim().is_empty())
            .context("no bot token configured (set `token` or CONINCO_TOKEN)")
    }

    /// Creates the log and feed cache directories.
    pub fn ensure_directories(&self) -> Result<()> {
        for dir in [&self.log_dir, &self.calendar_dir] {
            fs::create_dir_all(dir)
                .with_context(|| format!("failed to create {}", dir.display()))?;
        }
        Ok(())
    }

    pub const fn command_defaults(&self) -> CommandDefaults {
        CommandDefaults {
            calendar_days: self.default_days,
            delete_count: 1,
        }
    }

    pub const fn notify_interval(&self) -> Duration {
        Duration::from_secs(self.notify_interval_hours.saturating_mul(60 * 60))
    }

    pub const fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs)
    }

    pub const fn delete_after(&self) -> Duration {
        Duration::from_secs(self.delete_after_secs)
    }
}

fn layered(source: Option<Data<Toml>>) -> Figment {
    let mut figment = Figment::from(Serialized::defaults(Config::default()));

    // Load from default config location
    if let Some(config_dir) = dirs_config_path() {
        figment = figment.merge(Toml::file(config_dir.join("config.toml")));
    }

    // Load from specified config file or stdin
    if let Some(source) = source {
        figment = figment.merge(source);
    }

    // Load from environment variables (CONINCO_*)
    figment.merge(Env::prefixed("CONINCO_"))
}

/// Returns the platform-specific config directory for coninco.
fn dirs_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|p| p.join("coninco"))
}

/// Returns the platform-specific data directory for coninco.
///
/// On Linux: `~/.local/share/coninco`
pub fn dirs_data_path() -> Option<PathBuf> {
    dirs::data_dir().map(|p| p.join("coninco"))
}
