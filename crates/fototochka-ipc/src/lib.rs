//! FotoTochka IPC
//!
//! Event bus between the Telegram adapter and the answer runtime

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};
use tokio::sync::broadcast;

static NEXT_TRACE_COUNTER: AtomicU64 = AtomicU64::new(1);

fn now_unix_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

fn generate_trace_id() -> String {
    let ts = now_unix_secs();
    let n = NEXT_TRACE_COUNTER.fetch_add(1, Ordering::Relaxed);
    format!("trace-{}-{}", ts, n)
}

/// One inbound text message, already stripped of the platform envelope.
#[derive(Debug, Clone)]
pub struct Envelope {
    pub trace_id: String,
    pub channel: String,
    pub user_id: i64,
    pub chat_id: i64,
    pub message_id: Option<i64>,
    pub text: String,
}

impl Envelope {
    pub fn new(channel: &str, user_id: i64, chat_id: i64, text: impl Into<String>) -> Self {
        Self {
            trace_id: generate_trace_id(),
            channel: channel.to_string(),
            user_id,
            chat_id,
            message_id: None,
            text: text.into(),
        }
    }

    pub fn with_message_id(mut self, message_id: i64) -> Self {
        self.message_id = Some(message_id);
        self
    }
}

/// Reply keyboard resolved to its literal button labels.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplyKeyboard {
    pub name: String,
    pub rows: Vec<Vec<String>>,
}

#[derive(Debug, Clone)]
pub struct OutboundMessage {
    pub channel: String,
    pub trace_id: Option<String>,
    pub chat_id: i64,
    pub text: String,
    pub keyboard: Option<ReplyKeyboard>,
    pub chat_action: Option<String>,
}

impl OutboundMessage {
    pub fn reply(channel: &str, chat_id: i64, text: impl Into<String>) -> Self {
        Self {
            channel: channel.to_string(),
            trace_id: None,
            chat_id,
            text: text.into(),
            keyboard: None,
            chat_action: None,
        }
    }

    pub fn chat_action(channel: &str, chat_id: i64, action: &str) -> Self {
        Self {
            channel: channel.to_string(),
            trace_id: None,
            chat_id,
            text: String::new(),
            keyboard: None,
            chat_action: Some(action.to_string()),
        }
    }

    pub fn with_keyboard(mut self, keyboard: Option<ReplyKeyboard>) -> Self {
        self.keyboard = keyboard;
        self
    }

    pub fn with_trace_id(mut self, trace_id: &str) -> Self {
        self.trace_id = Some(trace_id.to_string());
        self
    }
}

pub const EVENT_BUS_CAPACITY: usize = 256;
pub const OUTBOUND_CAPACITY: usize = 256;

#[derive(Clone)]
pub struct EventBus {
    inbound: broadcast::Sender<Envelope>,
    outbound: broadcast::Sender<OutboundMessage>,
}

impl EventBus {
    pub fn new() -> Self {
        let (inbound_tx, _) = broadcast::channel(EVENT_BUS_CAPACITY);
        let (outbound_tx, _) = broadcast::channel(OUTBOUND_CAPACITY);

        Self {
            inbound: inbound_tx,
            outbound: outbound_tx,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Envelope> {
        self.inbound.subscribe()
    }

    pub fn publish(&self, envelope: Envelope) -> anyhow::Result<()> {
        self.inbound.send(envelope)?;
        Ok(())
    }

    pub fn outbound_sender(&self) -> broadcast::Sender<OutboundMessage> {
        self.outbound.clone()
    }

    pub fn outbound_subscribe(&self) -> broadcast::Receiver<OutboundMessage> {
        self.outbound.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn envelope_has_trace_id() {
        let env = Envelope::new("telegram", 7, 7, "привет");
        assert!(env.trace_id.starts_with("trace-"));
        assert_eq!(env.message_id, None);
    }

    #[test]
    fn trace_id_different_for_each_envelope() {
        let env1 = Envelope::new("telegram", 1, 1, "hello");
        let env2 = Envelope::new("telegram", 1, 1, "hello");
        assert_ne!(env1.trace_id, env2.trace_id);
    }

    #[test]
    fn outbound_builders_set_expected_fields() {
        let keyboard = ReplyKeyboard {
            name: "main".to_string(),
            rows: vec![vec!["📚 Услуги".to_string()]],
        };
        let reply = OutboundMessage::reply("telegram", 42, "ok")
            .with_keyboard(Some(keyboard.clone()))
            .with_trace_id("trace-1-1");
        assert_eq!(reply.keyboard, Some(keyboard));
        assert_eq!(reply.trace_id.as_deref(), Some("trace-1-1"));
        assert!(reply.chat_action.is_none());

        let typing = OutboundMessage::chat_action("telegram", 42, "typing");
        assert_eq!(typing.chat_action.as_deref(), Some("typing"));
        assert!(typing.text.is_empty());
    }

    #[tokio::test]
    async fn publish_reaches_subscriber() {
        let bus = EventBus::new();
        let mut rx = bus.subscribe();
        bus.publish(Envelope::new("telegram", 5, 6, "цены").with_message_id(9))
            .expect("publish");
        let got = rx.recv().await.expect("recv");
        assert_eq!(got.user_id, 5);
        assert_eq!(got.chat_id, 6);
        assert_eq!(got.message_id, Some(9));
        assert_eq!(got.text, "цены");
    }

    #[test]
    fn publish_without_subscribers_fails() {
        let bus = EventBus::new();
        assert!(bus.publish(Envelope::new("telegram", 1, 1, "x")).is_err());
    }
}
