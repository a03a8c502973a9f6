//! FotoTochka Telegram Adapter
//!
//! Telegram Bot API long-polling with client recreation, reply keyboards
//! and paced message chunking

pub mod dispatcher;

pub use dispatcher::{chunk_message, DispatchError, MessageDispatcher, Transport};

use anyhow::Result;
use async_trait::async_trait;
use fototochka_config::TelegramConfig;
use fototochka_ipc::{Envelope, EventBus, ReplyKeyboard};
use reqwest::{Client, ClientBuilder};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

pub const CHANNEL: &str = "telegram";

/// Commands advertised through `setMyCommands`, as (command, description).
pub const BOT_COMMANDS: &[(&str, &str)] = &[
    ("start", "Главное меню"),
    ("help", "Список команд"),
    ("services", "Наши услуги"),
    ("price", "Цены"),
    ("photobook", "Фотокниги"),
    ("canvas", "Печать на холсте"),
    ("restoration", "Реставрация фото"),
    ("editing", "Обработка фото"),
    ("contacts", "Контакты"),
    ("address", "Как нас найти"),
    ("schedule", "График работы"),
    ("delivery", "Доставка"),
    ("payment", "Оплата"),
    ("clear", "Показать меню"),
];

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelegramUpdate {
    pub update_id: i64,
    pub message: Option<TelegramMessage>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelegramMessage {
    pub message_id: i64,
    #[serde(default)]
    pub text: Option<String>,
    pub chat: TelegramChat,
    pub from: Option<TelegramUser>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelegramChat {
    pub id: i64,
    #[serde(rename = "type")]
    pub chat_type: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelegramUser {
    pub id: i64,
    #[serde(default)]
    pub is_bot: Option<bool>,
    #[serde(default)]
    pub username: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiResponse<T> {
    ok: bool,
    result: Option<T>,
    #[serde(default)]
    description: Option<String>,
}

async fn call_api<T: DeserializeOwned>(
    client: &Client,
    api_url: &str,
    method: &str,
    payload: &serde_json::Value,
) -> Result<Option<T>, DispatchError> {
    let url = format!("{}/{}", api_url, method);

    let resp = client
        .post(&url)
        .json(payload)
        .send()
        .await
        .map_err(|source| DispatchError::Request {
            method: method.to_string(),
            source,
        })?;

    if !resp.status().is_success() {
        let status = resp.status().as_u16();
        let body = resp.text().await.unwrap_or_default();
        return Err(DispatchError::Http {
            method: method.to_string(),
            status,
            body,
        });
    }

    let parsed: ApiResponse<T> = resp.json().await.map_err(|source| DispatchError::Decode {
        method: method.to_string(),
        source,
    })?;

    if !parsed.ok {
        return Err(DispatchError::Api {
            method: method.to_string(),
            description: parsed.description.unwrap_or_default(),
        });
    }

    Ok(parsed.result)
}

fn build_client(request_timeout: Duration) -> reqwest::Result<Client> {
    ClientBuilder::new()
        .pool_idle_timeout(Duration::from_secs(600))
        .pool_max_idle_per_host(10)
        .tcp_keepalive(Some(Duration::from_secs(30)))
        .timeout(request_timeout)
        .connect_timeout(Duration::from_secs(30))
        .build()
}

/// Renders a keyboard as a Telegram `ReplyKeyboardMarkup`.
pub fn reply_markup(keyboard: &ReplyKeyboard) -> serde_json::Value {
    serde_json::json!({
        "keyboard": keyboard.rows.iter().map(|row| {
            row.iter().map(|label| serde_json::json!({ "text": label })).collect::<Vec<_>>()
        }).collect::<Vec<_>>(),
        "resize_keyboard": true,
    })
}

/// Keeps plain-text messages from people; everything else is dropped.
pub fn envelope_from_message(message: &TelegramMessage) -> Option<Envelope> {
    let from = message.from.as_ref()?;
    if from.is_bot.unwrap_or(false) {
        return None;
    }

    let text = message.text.as_deref()?.trim();
    if text.is_empty() {
        return None;
    }

    Some(Envelope::new(CHANNEL, from.id, message.chat.id, text).with_message_id(message.message_id))
}

/// `Transport` backed by the Bot API `sendMessage` / `sendChatAction` calls.
pub struct BotApiTransport {
    client: Client,
    api_url: String,
}

impl BotApiTransport {
    pub fn new(client: Client, api_url: String) -> Self {
        Self { client, api_url }
    }
}

#[async_trait]
impl Transport for BotApiTransport {
    async fn send_text(
        &self,
        chat_id: i64,
        text: &str,
        keyboard: Option<&ReplyKeyboard>,
    ) -> Result<(), DispatchError> {
        let mut payload = serde_json::json!({
            "chat_id": chat_id,
            "text": text,
        });
        if let Some(keyboard) = keyboard {
            payload["reply_markup"] = reply_markup(keyboard);
        }

        call_api::<serde_json::Value>(&self.client, &self.api_url, "sendMessage", &payload)
            .await
            .map(|_| ())
    }

    async fn send_chat_action(&self, chat_id: i64, action: &str) -> Result<(), DispatchError> {
        let payload = serde_json::json!({
            "chat_id": chat_id,
            "action": action,
        });
        call_api::<serde_json::Value>(&self.client, &self.api_url, "sendChatAction", &payload)
            .await
            .map(|_| ())
    }
}

pub struct TelegramAdapter {
    client: Client,
    account_tag: String,
    api_url: String,
    poll_timeout_secs: u64,
    client_recreate_interval: Duration,
    retry_backoff: Duration,
    event_bus: Option<EventBus>,
}

impl TelegramAdapter {
    pub fn new(config: &TelegramConfig) -> Result<Self> {
        let poll_timeout_secs = config.poll_timeout_secs;
        let client = build_client(Self::request_timeout(poll_timeout_secs))?;

        Ok(Self {
            client,
            account_tag: config.account_tag(),
            api_url: config.api_url(),
            poll_timeout_secs,
            client_recreate_interval: Duration::from_secs(config.client_recreate_interval_secs),
            retry_backoff: Duration::from_secs(config.retry_backoff_secs),
            event_bus: None,
        })
    }

    pub fn with_event_bus(mut self, event_bus: EventBus) -> Self {
        self.event_bus = Some(event_bus);
        self
    }

    pub fn account_tag(&self) -> &str {
        &self.account_tag
    }

    fn request_timeout(poll_timeout_secs: u64) -> Duration {
        Duration::from_secs(poll_timeout_secs + 30)
    }

    /// Dispatcher sharing this adapter's HTTP client.
    pub fn dispatcher(&self, chunk_delay: Duration) -> MessageDispatcher {
        let transport = BotApiTransport::new(self.client.clone(), self.api_url.clone());
        MessageDispatcher::new(Arc::new(transport), chunk_delay)
    }

    pub async fn get_updates(
        &self,
        client: &Client,
        offset: Option<i64>,
    ) -> Result<Vec<TelegramUpdate>, DispatchError> {
        let mut payload = serde_json::json!({
            "timeout": self.poll_timeout_secs,
            "allowed_updates": ["message"],
        });

        if let Some(offset) = offset {
            payload["offset"] = serde_json::json!(offset);
        }

        let updates = call_api(client, &self.api_url, "getUpdates", &payload).await?;
        Ok(updates.unwrap_or_default())
    }

    /// Polls forever. The offset lives in memory, so a restart may replay
    /// updates Telegram has not yet expired.
    pub async fn poll(&self) -> Result<()> {
        let mut offset: Option<i64> = None;

        info!(account = %self.account_tag, "Telegram polling started");

        let mut client = self.client.clone();
        let mut client_recreate_at = Instant::now() + self.client_recreate_interval;

        if let Err(err) = self.sync_bot_commands(&client).await {
            warn!("Failed to sync Telegram bot commands: {}", err);
        } else {
            info!("Telegram bot commands synced");
        }

        loop {
            if Instant::now() >= client_recreate_at {
                match build_client(Self::request_timeout(self.poll_timeout_secs)) {
                    Ok(fresh) => {
                        debug!("Recreating HTTP client to prevent stale connections");
                        client = fresh;
                    }
                    Err(err) => warn!("Failed to recreate HTTP client, keeping the old one: {}", err),
                }
                client_recreate_at = Instant::now() + self.client_recreate_interval;
            }

            let updates = match self.get_updates(&client, offset).await {
                Ok(v) => v,
                Err(err) => {
                    warn!(
                        "Telegram polling error: {} (retrying in {}s)",
                        err,
                        self.retry_backoff.as_secs()
                    );
                    tokio::time::sleep(self.retry_backoff).await;
                    continue;
                }
            };

            for update in updates {
                offset = Some(update.update_id + 1);

                if let Some(message) = &update.message {
                    self.handle_message(message);
                }
            }
        }
    }

    async fn sync_bot_commands(&self, client: &Client) -> Result<(), DispatchError> {
        let commands: Vec<serde_json::Value> = BOT_COMMANDS
            .iter()
            .map(|(command, description)| {
                serde_json::json!({ "command": command, "description": description })
            })
            .collect();

        let payload = serde_json::json!({ "commands": commands });
        call_api::<serde_json::Value>(client, &self.api_url, "setMyCommands", &payload).await?;
        Ok(())
    }

    fn handle_message(&self, message: &TelegramMessage) {
        let Some(envelope) = envelope_from_message(message) else {
            debug!(
                chat_id = message.chat.id,
                "Skipping update without user text"
            );
            return;
        };

        let from_username = message
            .from
            .as_ref()
            .and_then(|u| u.username.as_deref())
            .unwrap_or("unknown");
        debug!(
            trace_id = %envelope.trace_id,
            chat_type = %message.chat.chat_type,
            "Received message from {}",
            from_username
        );

        match &self.event_bus {
            Some(event_bus) => {
                if let Err(e) = event_bus.publish(envelope) {
                    warn!("Failed to publish message to event bus: {}", e);
                }
            }
            None => info!("No event bus configured, message not forwarded"),
        }
    }
}
