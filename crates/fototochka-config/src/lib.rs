//! FotoTochka Configuration
//!
//! TOML configuration loading with environment variable support

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const ENV_BOT_TOKEN: &str = "FOTOTOCHKA_BOT_TOKEN";
pub const ENV_PORT: &str = "PORT";

const DEFAULT_API_BASE: &str = "https://api.telegram.org";

const DEFAULT_REPEAT_ADVISORY_TEXT: &str =
    "📞 Вы уже спрашивали об этом! Уточните вопрос или позвоните нам: +7 (999) 123-45-67";

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub core: CoreConfig,
    #[serde(default)]
    pub telegram: TelegramConfig,
    #[serde(default)]
    pub bot: BotConfig,
    #[serde(default)]
    pub health: HealthConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct CoreConfig {
    pub data_dir: Option<String>,
    pub log_level: Option<String>,
    /// Replaces the built-in knowledge base when set.
    #[serde(default)]
    pub knowledge_file: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelegramConfig {
    #[serde(default)]
    pub bot_token: String,
    /// Bot API root; the token is appended as `/bot<token>`.
    #[serde(default = "default_api_base")]
    pub api_base: String,
    #[serde(default = "default_poll_timeout_secs")]
    pub poll_timeout_secs: u64,
    #[serde(default = "default_client_recreate_interval_secs")]
    pub client_recreate_interval_secs: u64,
    #[serde(default = "default_retry_backoff_secs")]
    pub retry_backoff_secs: u64,
    #[serde(default = "default_chunk_delay_ms")]
    pub chunk_delay_ms: u64,
}

impl Default for TelegramConfig {
    fn default() -> Self {
        Self {
            bot_token: String::new(),
            api_base: default_api_base(),
            poll_timeout_secs: default_poll_timeout_secs(),
            client_recreate_interval_secs: default_client_recreate_interval_secs(),
            retry_backoff_secs: default_retry_backoff_secs(),
            chunk_delay_ms: default_chunk_delay_ms(),
        }
    }
}

impl TelegramConfig {
    pub fn account_tag(&self) -> String {
        telegram_account_tag(&self.bot_token)
    }

    pub fn api_url(&self) -> String {
        format!(
            "{}/bot{}",
            self.api_base.trim().trim_end_matches('/'),
            self.bot_token.trim()
        )
    }
}

/// What a user gets when they ask the same thing twice in a row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum RepeatResponse {
    #[default]
    Advisory, // Fixed text with the shop's phone number
    Fallback, // The "непонятно" knowledge base entry
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BotConfig {
    #[serde(default = "default_max_history")]
    pub max_history: usize,
    #[serde(default)]
    pub repeat_response: RepeatResponse,
    #[serde(default = "default_repeat_advisory_text")]
    pub repeat_advisory_text: String,
    #[serde(default)]
    pub session_idle_ttl_secs: Option<u64>,
    #[serde(default)]
    pub max_sessions: Option<usize>,
}

impl Default for BotConfig {
    fn default() -> Self {
        Self {
            max_history: default_max_history(),
            repeat_response: RepeatResponse::default(),
            repeat_advisory_text: default_repeat_advisory_text(),
            session_idle_ttl_secs: None,
            max_sessions: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_health_host")]
    pub host: String,
    #[serde(default = "default_health_port")]
    pub port: u16,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            host: default_health_host(),
            port: default_health_port(),
        }
    }
}

pub fn telegram_account_tag(bot_token: &str) -> String {
    bot_token.split(':').next().unwrap_or("default").to_string()
}

fn default_true() -> bool {
    true
}

fn default_api_base() -> String {
    DEFAULT_API_BASE.to_string()
}

fn default_poll_timeout_secs() -> u64 {
    60
}

fn default_client_recreate_interval_secs() -> u64 {
    60
}

fn default_retry_backoff_secs() -> u64 {
    10
}

fn default_chunk_delay_ms() -> u64 {
    1000
}

fn default_max_history() -> usize {
    10
}

fn default_repeat_advisory_text() -> String {
    DEFAULT_REPEAT_ADVISORY_TEXT.to_string()
}

fn default_health_host() -> String {
    "0.0.0.0".to_string()
}

fn default_health_port() -> u16 {
    5000
}

impl Config {
    pub fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let config = Self::read(path)?;
        config.validate()?;
        Ok(config)
    }

    /// Parses the file and applies env overrides without validating.
    pub fn read<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        let mut config: Config = toml::from_str(&content)?;
        config.apply_env_overrides(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    /// Defaults plus env overrides, validated. For deployments without a config file.
    pub fn from_env<F>(lookup: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Config::default();
        config.apply_env_overrides(lookup)?;
        config.validate()?;
        Ok(config)
    }

    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("fototochka").join("config.toml"))
    }

    /// Environment wins over the file for the bot token and the health port.
    pub fn apply_env_overrides<F>(&mut self, lookup: F) -> anyhow::Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(token) = lookup(ENV_BOT_TOKEN) {
            let token = token.trim();
            if !token.is_empty() {
                self.telegram.bot_token = token.to_string();
            }
        }

        if let Some(port) = lookup(ENV_PORT) {
            let port = port.trim();
            if !port.is_empty() {
                self.health.port = port.parse().map_err(|_| {
                    anyhow::anyhow!("{} must be a valid TCP port, got '{}'", ENV_PORT, port)
                })?;
            }
        }

        Ok(())
    }

    pub fn data_dir(&self) -> PathBuf {
        match &self.core.data_dir {
            Some(data_dir) => expand_user_path(data_dir),
            None => dirs::home_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join(".fototochka"),
        }
    }

    pub fn knowledge_path(&self) -> Option<PathBuf> {
        self.core
            .knowledge_file
            .as_deref()
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .map(expand_user_path)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        let token = self.telegram.bot_token.trim();
        if token.is_empty() {
            anyhow::bail!(
                "telegram.bot_token cannot be empty (set it in the config or via {})",
                ENV_BOT_TOKEN
            );
        }
        if telegram_account_tag(token).trim().is_empty() {
            anyhow::bail!("telegram.bot_token has invalid account tag");
        }
        let api_base = self.telegram.api_base.trim();
        if !api_base.starts_with("http://") && !api_base.starts_with("https://") {
            anyhow::bail!("telegram.api_base must be an http(s) URL, got '{}'", api_base);
        }
        if self.telegram.poll_timeout_secs > 600 {
            anyhow::bail!("telegram.poll_timeout_secs must be <= 600");
        }
        if self.telegram.client_recreate_interval_secs == 0 {
            anyhow::bail!("telegram.client_recreate_interval_secs must be > 0");
        }
        if self.telegram.retry_backoff_secs == 0 {
            anyhow::bail!("telegram.retry_backoff_secs must be > 0");
        }

        if self.bot.max_history == 0 {
            anyhow::bail!("bot.max_history must be >= 1");
        }
        if self.bot.repeat_response == RepeatResponse::Advisory
            && self.bot.repeat_advisory_text.trim().is_empty()
        {
            anyhow::bail!("bot.repeat_advisory_text cannot be empty when repeat_response=advisory");
        }
        if let Some(ttl) = self.bot.session_idle_ttl_secs {
            if ttl == 0 {
                anyhow::bail!("bot.session_idle_ttl_secs must be > 0");
            }
        }
        if let Some(max_sessions) = self.bot.max_sessions {
            if max_sessions == 0 {
                anyhow::bail!("bot.max_sessions must be >= 1");
            }
        }

        if self.health.enabled && self.health.host.trim().is_empty() {
            anyhow::bail!("health.host cannot be empty");
        }

        if let Some(path) = &self.core.knowledge_file {
            if path.trim().is_empty() {
                anyhow::bail!("core.knowledge_file cannot be an empty path");
            }
        }

        Ok(())
    }

    pub fn template() -> String {
        format!(
            r#"[core]
data_dir = "~/.fototochka"
log_level = "info"
# knowledge_file = "~/.fototochka/knowledge.toml"

[telegram]
bot_token = ""
api_base = "{api_base}"
poll_timeout_secs = {poll}
client_recreate_interval_secs = {recreate}
retry_backoff_secs = {backoff}
chunk_delay_ms = {delay}

[bot]
max_history = {history}
repeat_response = "advisory"
# session_idle_ttl_secs = 86400
# max_sessions = 10000

[health]
enabled = true
host = "0.0.0.0"
port = {port}
"#,
            api_base = DEFAULT_API_BASE,
            poll = default_poll_timeout_secs(),
            recreate = default_client_recreate_interval_secs(),
            backoff = default_retry_backoff_secs(),
            delay = default_chunk_delay_ms(),
            history = default_max_history(),
            port = default_health_port(),
        )
    }
}

pub fn expand_user_path(path: &str) -> PathBuf {
    if path == "~" || path.starts_with("~/") {
        let home = dirs::home_dir().unwrap_or_else(|| PathBuf::from("."));
        if path == "~" {
            home
        } else {
            home.join(path.trim_start_matches("~/"))
        }
    } else {
        PathBuf::from(path)
    }
}
