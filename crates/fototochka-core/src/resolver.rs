//! Picks the reply for one user message, using the session for context

use crate::keyboard::KeyboardId;
use crate::knowledge::{KnowledgeBase, KnowledgeEntry, Topic};
use crate::matcher::{Matcher, TopicMatch};
use crate::session::UserSession;
use fototochka_config::{BotConfig, RepeatResponse};
use std::collections::HashSet;
use tracing::error;

const GREETING_TOKENS: &[&str] = &["привет", "здравствуй", "start"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponsePayload {
    pub text: String,
    pub keyboard: Option<KeyboardId>,
}

impl From<&KnowledgeEntry> for ResponsePayload {
    fn from(entry: &KnowledgeEntry) -> Self {
        Self {
            text: entry.text.clone(),
            keyboard: entry.keyboard,
        }
    }
}

/// Why a reply was chosen.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    Repeated,
    Greeting,
    Matched(TopicMatch),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RepeatPolicy {
    Advisory(String),
    Fallback,
}

impl RepeatPolicy {
    pub fn from_config(bot: &BotConfig) -> Self {
        match bot.repeat_response {
            RepeatResponse::Advisory => Self::Advisory(bot.repeat_advisory_text.clone()),
            RepeatResponse::Fallback => Self::Fallback,
        }
    }
}

pub struct ResponseResolver {
    knowledge: KnowledgeBase,
    matcher: Matcher,
    repeat: RepeatPolicy,
}

impl ResponseResolver {
    pub fn new(knowledge: KnowledgeBase, matcher: Matcher, repeat: RepeatPolicy) -> Self {
        Self {
            knowledge,
            matcher,
            repeat,
        }
    }

    pub fn knowledge(&self) -> &KnowledgeBase {
        &self.knowledge
    }

    pub fn resolve(&self, session: &UserSession, raw_text: &str) -> ResponsePayload {
        self.resolve_with_reason(session, raw_text).0
    }

    pub fn resolve_with_reason(
        &self,
        session: &UserSession,
        raw_text: &str,
    ) -> (ResponsePayload, Resolution) {
        if is_repeated_question(session, raw_text) {
            let payload = match &self.repeat {
                RepeatPolicy::Advisory(text) => ResponsePayload {
                    text: text.clone(),
                    keyboard: Some(KeyboardId::Main),
                },
                RepeatPolicy::Fallback => self.knowledge.fallback().into(),
            };
            return (payload, Resolution::Repeated);
        }

        if session.message_count == 0 && is_greeting(raw_text) {
            return (self.entry(Topic::Start).into(), Resolution::Greeting);
        }

        let hit = self.matcher.classify(raw_text);
        (self.entry(hit.topic).into(), Resolution::Matched(hit))
    }

    fn entry(&self, topic: Topic) -> &KnowledgeEntry {
        match self.knowledge.get(topic) {
            Some(entry) => entry,
            None => {
                debug_assert!(false, "knowledge base has no entry for topic '{}'", topic);
                error!(
                    topic = %topic,
                    "Knowledge base has no entry for resolved topic, answering with fallback"
                );
                self.knowledge.fallback()
            }
        }
    }
}

fn word_set(text: &str) -> HashSet<&str> {
    text.split_whitespace().collect()
}

/// True when the message shares at least two words with any recent question.
pub fn is_repeated_question(session: &UserSession, raw_text: &str) -> bool {
    let current_lower = raw_text.to_lowercase();
    let current = word_set(&current_lower);
    session
        .recent_questions()
        .any(|previous| word_set(previous).intersection(&current).count() >= 2)
}

pub fn is_greeting(raw_text: &str) -> bool {
    let lower = raw_text.to_lowercase();
    GREETING_TOKENS.iter().any(|token| lower.contains(token))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::matcher::MatchRule;
    use crate::session::SessionStore;

    const ADVISORY: &str = "📞 Вы уже спрашивали об этом!";

    fn resolver(repeat: RepeatPolicy) -> ResponseResolver {
        ResponseResolver::new(KnowledgeBase::builtin(), Matcher::new(), repeat)
    }

    fn text_of(kb: &KnowledgeBase, topic: Topic) -> String {
        kb.get(topic).expect("entry").text.clone()
    }

    #[test]
    fn repeated_question_returns_advisory_text() {
        let r = resolver(RepeatPolicy::Advisory(ADVISORY.to_string()));
        let mut store = SessionStore::new(10);
        store.record_turn(1, "сколько стоит фотокнига", "…");

        let session = store.get(1).expect("session");
        let (payload, why) = r.resolve_with_reason(session, "а сколько стоит фотокнига а4");
        assert_eq!(why, Resolution::Repeated);
        assert_eq!(payload.text, ADVISORY);
        assert_eq!(payload.keyboard, Some(KeyboardId::Main));
    }

    #[test]
    fn repeated_question_can_answer_with_fallback() {
        let r = resolver(RepeatPolicy::Fallback);
        let mut store = SessionStore::new(10);
        store.record_turn(1, "Где вы находитесь сейчас", "…");

        let session = store.get(1).expect("session");
        let payload = r.resolve(session, "где вы находитесь");
        assert_eq!(payload.text, r.knowledge().fallback().text);
    }

    #[test]
    fn single_shared_word_is_not_a_repeat() {
        let r = resolver(RepeatPolicy::Fallback);
        let mut store = SessionStore::new(10);
        store.record_turn(1, "цены", "…");

        let session = store.get(1).expect("session");
        let (_, why) = r.resolve_with_reason(session, "цены");
        assert!(matches!(why, Resolution::Matched(_)));
    }

    #[test]
    fn first_greeting_overrides_matcher() {
        let r = resolver(RepeatPolicy::Fallback);
        let mut store = SessionStore::new(10);

        let session = store.get_or_create(5);
        let (payload, why) = r.resolve_with_reason(session, "Привет!");
        assert_eq!(why, Resolution::Greeting);
        assert_eq!(payload.text, text_of(r.knowledge(), Topic::Start));
    }

    #[test]
    fn later_greeting_goes_through_matcher() {
        let r = resolver(RepeatPolicy::Fallback);
        let mut store = SessionStore::new(10);
        store.record_turn(5, "цены", "…");

        let session = store.get(5).expect("session");
        let (payload, why) = r.resolve_with_reason(session, "привет");
        assert_eq!(payload.text, text_of(r.knowledge(), Topic::Greeting));
        assert!(matches!(
            why,
            Resolution::Matched(TopicMatch {
                topic: Topic::Greeting,
                rule: MatchRule::Keyword("привет"),
            })
        ));
    }

    #[test]
    fn default_path_uses_matcher_and_entry_keyboard() {
        let r = resolver(RepeatPolicy::Fallback);
        let mut store = SessionStore::new(10);
        let session = store.get_or_create(9);

        let payload = r.resolve(session, "/contacts");
        let entry = r.knowledge().get(Topic::Contacts).expect("contacts");
        assert_eq!(payload, ResponsePayload::from(entry));
        assert_eq!(payload.keyboard, Some(KeyboardId::Contacts));
    }

    #[test]
    fn unmatched_text_gets_fallback_reply() {
        let r = resolver(RepeatPolicy::Fallback);
        let mut store = SessionStore::new(10);
        store.record_turn(3, "цены", "…");
        let session = store.get(3).expect("session");
        assert_eq!(r.resolve(session, "xyz123").text, r.knowledge().fallback().text);
    }

    #[cfg(not(debug_assertions))]
    #[test]
    fn missing_entry_falls_back_in_release_builds() {
        let kb = KnowledgeBase::from_entries(vec![KnowledgeEntry::new(
            Topic::Fallback,
            "?",
            None,
        )])
        .expect("fallback only");
        let r = ResponseResolver::new(kb, Matcher::new(), RepeatPolicy::Fallback);
        let mut store = SessionStore::new(10);
        let session = store.get_or_create(1);
        assert_eq!(r.resolve(session, "/price").text, "?");
    }

    #[cfg(debug_assertions)]
    #[test]
    #[should_panic(expected = "knowledge base has no entry")]
    fn missing_entry_asserts_in_debug_builds() {
        let kb = KnowledgeBase::from_entries(vec![KnowledgeEntry::new(
            Topic::Fallback,
            "?",
            None,
        )])
        .expect("fallback only");
        let r = ResponseResolver::new(kb, Matcher::new(), RepeatPolicy::Fallback);
        let mut store = SessionStore::new(10);
        let session = store.get_or_create(1);
        let _ = r.resolve(session, "/price");
    }
}
