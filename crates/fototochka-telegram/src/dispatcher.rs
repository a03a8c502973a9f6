//! Outbound side: chunking, pacing and the transport seam

use async_trait::async_trait;
use fototochka_ipc::{OutboundMessage, ReplyKeyboard};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

pub const TELEGRAM_MAX_MESSAGE_LEN: usize = 4096;

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("telegram {method} request failed: {source}")]
    Request {
        method: String,
        source: reqwest::Error,
    },
    #[error("telegram {method} HTTP {status}: {body}")]
    Http {
        method: String,
        status: u16,
        body: String,
    },
    #[error("telegram {method} returned ok=false: {description}")]
    Api { method: String, description: String },
    #[error("telegram {method} decode failed: {source}")]
    Decode {
        method: String,
        source: reqwest::Error,
    },
}

/// Platform calls the dispatcher needs.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send_text(
        &self,
        chat_id: i64,
        text: &str,
        keyboard: Option<&ReplyKeyboard>,
    ) -> Result<(), DispatchError>;

    async fn send_chat_action(&self, chat_id: i64, action: &str) -> Result<(), DispatchError>;
}

/// Splits on character count only; no chunk exceeds the Telegram limit.
pub fn chunk_message(text: &str) -> Vec<String> {
    let chars: Vec<char> = text.chars().collect();
    if chars.len() <= TELEGRAM_MAX_MESSAGE_LEN {
        return vec![text.to_string()];
    }

    chars
        .chunks(TELEGRAM_MAX_MESSAGE_LEN)
        .map(|chunk| chunk.iter().collect())
        .collect()
}

#[derive(Clone)]
pub struct MessageDispatcher {
    transport: Arc<dyn Transport>,
    chunk_delay: Duration,
}

impl MessageDispatcher {
    pub fn new(transport: Arc<dyn Transport>, chunk_delay: Duration) -> Self {
        Self {
            transport,
            chunk_delay,
        }
    }

    /// Sends `text` in order, one chunk at a time. The keyboard goes on the
    /// last chunk only. Stops at the first failed chunk.
    pub async fn send(
        &self,
        chat_id: i64,
        text: &str,
        keyboard: Option<&ReplyKeyboard>,
    ) -> Result<(), DispatchError> {
        let chunks = chunk_message(text);
        let last = chunks.len().saturating_sub(1);

        for (i, chunk) in chunks.iter().enumerate() {
            if i > 0 {
                tokio::time::sleep(self.chunk_delay).await;
            }
            let markup = if i == last { keyboard } else { None };
            self.transport.send_text(chat_id, chunk, markup).await?;
        }

        if chunks.len() > 1 {
            debug!(chat_id, chunks = chunks.len(), "Sent chunked reply");
        }
        Ok(())
    }

    pub async fn send_chat_action(&self, chat_id: i64, action: &str) -> Result<(), DispatchError> {
        self.transport.send_chat_action(chat_id, action).await
    }

    pub async fn run_outbound_handler(&self, mut receiver: broadcast::Receiver<OutboundMessage>) {
        info!("Telegram outbound handler started");

        loop {
            match receiver.recv().await {
                Ok(msg) => {
                    if msg.channel != crate::CHANNEL {
                        continue;
                    }
                    let trace_id = msg.trace_id.as_deref().unwrap_or("-");

                    if let Some(action) = &msg.chat_action {
                        if let Err(e) = self.send_chat_action(msg.chat_id, action).await {
                            warn!(trace_id, "Failed to send chat action: {}", e);
                        }
                        continue;
                    }

                    if let Err(e) = self
                        .send(msg.chat_id, &msg.text, msg.keyboard.as_ref())
                        .await
                    {
                        warn!(
                            trace_id,
                            chat_id = msg.chat_id,
                            "Failed to send outbound message: {}",
                            e
                        );
                    }
                }
                Err(broadcast::error::RecvError::Closed) => {
                    info!("Telegram outbound handler stopped: channel closed");
                    break;
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(
                        "Telegram outbound handler lagged; skipped {} messages",
                        skipped
                    );
                }
            }
        }
    }
}
