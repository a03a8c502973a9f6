//! FotoTochka Core
//!
//! Answer runtime: knowledge base, matcher, sessions and the inbound loop

pub mod error;
pub mod keyboard;
pub mod knowledge;
pub mod matcher;
pub mod resolver;
pub mod session;

pub use error::KnowledgeError;
pub use keyboard::KeyboardId;
pub use knowledge::{KnowledgeBase, KnowledgeEntry, Topic};
pub use matcher::{MatchRule, Matcher, TopicMatch};
pub use resolver::{RepeatPolicy, Resolution, ResponsePayload, ResponseResolver};
pub use session::{DialogueTurn, SessionStore, UserSession};

use anyhow::{Context, Result};
use fototochka_config::Config;
use fototochka_ipc::{Envelope, EventBus, OutboundMessage};
use fototochka_telegram::TelegramAdapter;

pub use fototochka_telegram::CHANNEL;
use std::time::{Duration, Instant};
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

const SESSION_SWEEP_INTERVAL_SECS: u64 = 60;

/// Loads the knowledge file from the config, or the built-in table.
pub fn load_knowledge(config: &Config) -> Result<KnowledgeBase> {
    match config.knowledge_path() {
        Some(path) => {
            let kb = KnowledgeBase::load(&path)
                .with_context(|| format!("loading knowledge base from {}", path.display()))?;
            info!(entries = kb.len(), "Loaded knowledge base from {}", path.display());
            Ok(kb)
        }
        None => Ok(KnowledgeBase::builtin()),
    }
}

pub struct BotRuntime {
    config: Config,
    resolver: ResponseResolver,
    sessions: SessionStore,
    event_bus: EventBus,
}

impl BotRuntime {
    pub fn new(config: Config) -> Result<Self> {
        let knowledge = load_knowledge(&config)?;
        Self::with_knowledge(config, knowledge)
    }

    pub fn with_knowledge(config: Config, knowledge: KnowledgeBase) -> Result<Self> {
        let matcher = Matcher::new();

        let mut referenced = matcher.referenced_topics();
        referenced.push(Topic::Start);
        knowledge
            .ensure_covers(referenced)
            .context("knowledge base does not cover every matcher topic")?;

        let repeat = RepeatPolicy::from_config(&config.bot);
        let sessions = SessionStore::new(config.bot.max_history);

        Ok(Self {
            resolver: ResponseResolver::new(knowledge, matcher, repeat),
            sessions,
            config,
            event_bus: EventBus::new(),
        })
    }

    pub fn resolver(&self) -> &ResponseResolver {
        &self.resolver
    }

    pub fn sessions(&self) -> &SessionStore {
        &self.sessions
    }

    /// Resolves one message and records the turn in the user's session.
    pub fn handle_turn(&mut self, user_id: i64, text: &str) -> (ResponsePayload, Resolution) {
        let session = self.sessions.get_or_create(user_id);
        let (payload, resolution) = self.resolver.resolve_with_reason(session, text);
        self.sessions.record_turn(user_id, text, &payload.text);
        (payload, resolution)
    }

    pub async fn run(mut self) -> Result<()> {
        info!("FotoTochka runtime starting...");

        let inbound_rx = self.event_bus.subscribe();
        let outbound_sender = self.event_bus.outbound_sender();

        self.start_telegram_adapter();

        self.serve(inbound_rx, outbound_sender).await;
        info!("FotoTochka runtime stopped");
        Ok(())
    }

    fn start_telegram_adapter(&self) {
        let telegram = self.config.telegram.clone();
        let event_bus = self.event_bus.clone();

        tokio::spawn(async move {
            let outbound_rx = event_bus.outbound_subscribe();
            let adapter = match TelegramAdapter::new(&telegram) {
                Ok(adapter) => adapter.with_event_bus(event_bus),
                Err(e) => {
                    error!("Failed to create Telegram adapter: {}", e);
                    return;
                }
            };
            let dispatcher = adapter.dispatcher(Duration::from_millis(telegram.chunk_delay_ms));

            tokio::spawn(async move {
                dispatcher.run_outbound_handler(outbound_rx).await;
            });

            if let Err(e) = adapter.poll().await {
                error!("Telegram adapter failed: {}", e);
            }
        });
    }

    /// Consumes inbound envelopes one at a time until the bus closes.
    pub async fn serve(
        &mut self,
        mut inbound_rx: broadcast::Receiver<Envelope>,
        outbound: broadcast::Sender<OutboundMessage>,
    ) {
        let mut sweep =
            tokio::time::interval(Duration::from_secs(SESSION_SWEEP_INTERVAL_SECS));

        loop {
            tokio::select! {
                result = inbound_rx.recv() => {
                    match result {
                        Ok(envelope) => self.process_envelope(envelope, &outbound),
                        Err(broadcast::error::RecvError::Closed) => {
                            info!("Event bus closed, stopping message processor");
                            break;
                        }
                        Err(broadcast::error::RecvError::Lagged(n)) => {
                            warn!("Event bus lagged by {} messages", n);
                        }
                    }
                }
                _ = sweep.tick() => self.sweep_sessions(),
            }
        }
    }

    fn process_envelope(
        &mut self,
        envelope: Envelope,
        outbound: &broadcast::Sender<OutboundMessage>,
    ) {
        let text = envelope.text.trim();
        if text.is_empty() {
            return;
        }

        info!(
            trace_id = %envelope.trace_id,
            user_id = envelope.user_id,
            "Message from {}: {}",
            envelope.user_id,
            text
        );

        let typing = OutboundMessage::chat_action(&envelope.channel, envelope.chat_id, "typing")
            .with_trace_id(&envelope.trace_id);
        if outbound.send(typing).is_err() {
            debug!("No outbound handler for typing action");
        }

        let (payload, resolution) = self.handle_turn(envelope.user_id, text);
        match resolution {
            Resolution::Repeated => info!(user_id = envelope.user_id, "Repeated question"),
            Resolution::Greeting => info!(user_id = envelope.user_id, "First-contact greeting"),
            Resolution::Matched(hit) => info!(
                user_id = envelope.user_id,
                topic = %hit.topic,
                rule = ?hit.rule,
                "Resolved topic"
            ),
        }

        let reply = OutboundMessage::reply(&envelope.channel, envelope.chat_id, payload.text)
            .with_keyboard(payload.keyboard.map(KeyboardId::to_reply_keyboard))
            .with_trace_id(&envelope.trace_id);
        if let Err(e) = outbound.send(reply) {
            warn!(
                trace_id = %envelope.trace_id,
                "Reply dropped, no outbound handler: {}", e
            );
        }
    }

    fn sweep_sessions(&mut self) {
        let mut removed = 0;
        if let Some(ttl) = self.config.bot.session_idle_ttl_secs {
            removed += self
                .sessions
                .evict_idle(Duration::from_secs(ttl), Instant::now());
        }
        if let Some(max_sessions) = self.config.bot.max_sessions {
            removed += self.sessions.enforce_capacity(max_sessions);
        }
        if removed > 0 {
            info!(
                removed,
                remaining = self.sessions.len(),
                "Evicted idle sessions"
            );
        }
    }
}
