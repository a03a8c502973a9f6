//! Per-user conversational state, kept in memory for the process lifetime

use std::collections::{HashMap, VecDeque};
use std::time::{Duration, Instant};

pub const MAX_RECENT_QUESTIONS: usize = 5;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DialogueTurn {
    pub user_text: String,
    pub bot_text: String,
}

#[derive(Debug, Clone)]
pub struct UserSession {
    pub user_id: i64,
    pub message_count: u64,
    recent_questions: VecDeque<String>,
    dialogue_history: VecDeque<DialogueTurn>,
    last_seen: Instant,
}

impl UserSession {
    fn new(user_id: i64, now: Instant) -> Self {
        Self {
            user_id,
            message_count: 0,
            recent_questions: VecDeque::with_capacity(MAX_RECENT_QUESTIONS + 1),
            dialogue_history: VecDeque::new(),
            last_seen: now,
        }
    }

    /// Lowercased user messages, oldest first.
    pub fn recent_questions(&self) -> impl Iterator<Item = &str> {
        self.recent_questions.iter().map(String::as_str)
    }

    pub fn recent_question_count(&self) -> usize {
        self.recent_questions.len()
    }

    pub fn dialogue_history(&self) -> impl Iterator<Item = &DialogueTurn> {
        self.dialogue_history.iter()
    }

    pub fn history_len(&self) -> usize {
        self.dialogue_history.len()
    }

    fn push_turn(&mut self, user_text: &str, bot_text: &str, max_history: usize, now: Instant) {
        self.dialogue_history.push_back(DialogueTurn {
            user_text: user_text.to_string(),
            bot_text: bot_text.to_string(),
        });
        while self.dialogue_history.len() > max_history {
            self.dialogue_history.pop_front();
        }

        self.recent_questions.push_back(user_text.to_lowercase());
        while self.recent_questions.len() > MAX_RECENT_QUESTIONS {
            self.recent_questions.pop_front();
        }

        self.message_count += 1;
        self.last_seen = now;
    }
}

#[derive(Debug)]
pub struct SessionStore {
    sessions: HashMap<i64, UserSession>,
    max_history: usize,
}

impl SessionStore {
    pub fn new(max_history: usize) -> Self {
        Self {
            sessions: HashMap::new(),
            max_history: max_history.max(1),
        }
    }

    pub fn max_history(&self) -> usize {
        self.max_history
    }

    pub fn get_or_create(&mut self, user_id: i64) -> &mut UserSession {
        self.sessions
            .entry(user_id)
            .or_insert_with(|| UserSession::new(user_id, Instant::now()))
    }

    pub fn get(&self, user_id: i64) -> Option<&UserSession> {
        self.sessions.get(&user_id)
    }

    pub fn record_turn(&mut self, user_id: i64, user_text: &str, bot_text: &str) {
        let max_history = self.max_history;
        self.get_or_create(user_id)
            .push_turn(user_text, bot_text, max_history, Instant::now());
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Drops sessions not seen for longer than `ttl`. Returns how many were removed.
    pub fn evict_idle(&mut self, ttl: Duration, now: Instant) -> usize {
        let before = self.sessions.len();
        self.sessions
            .retain(|_, session| now.saturating_duration_since(session.last_seen) <= ttl);
        before - self.sessions.len()
    }

    /// Keeps at most `max_sessions`, dropping the least recently seen first.
    pub fn enforce_capacity(&mut self, max_sessions: usize) -> usize {
        if self.sessions.len() <= max_sessions {
            return 0;
        }

        let mut by_age: Vec<(Instant, i64)> = self
            .sessions
            .values()
            .map(|session| (session.last_seen, session.user_id))
            .collect();
        by_age.sort();

        let excess = self.sessions.len() - max_sessions;
        for (_, user_id) in by_age.into_iter().take(excess) {
            self.sessions.remove(&user_id);
        }
        excess
    }
}

#[cfg(test)]
mod tests {
    use super::{SessionStore, MAX_RECENT_QUESTIONS};
    use std::time::{Duration, Instant};

    #[test]
    fn get_or_create_is_lazy_and_idempotent() {
        let mut store = SessionStore::new(10);
        assert!(store.get(1).is_none());
        assert_eq!(store.get_or_create(1).message_count, 0);
        store.get_or_create(1);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn seven_turns_keep_five_most_recent_questions() {
        let mut store = SessionStore::new(10);
        for i in 1..=7 {
            store.record_turn(42, &format!("Вопрос {}", i), "ответ");
        }
        let session = store.get(42).expect("session");
        assert_eq!(session.message_count, 7);
        assert_eq!(session.recent_question_count(), MAX_RECENT_QUESTIONS);
        let questions: Vec<&str> = session.recent_questions().collect();
        assert_eq!(
            questions,
            vec!["вопрос 3", "вопрос 4", "вопрос 5", "вопрос 6", "вопрос 7"]
        );
        assert_eq!(session.history_len(), 7);
    }

    #[test]
    fn dialogue_history_is_truncated_fifo() {
        let mut store = SessionStore::new(3);
        for i in 1..=5 {
            store.record_turn(7, &format!("q{}", i), &format!("a{}", i));
        }
        let session = store.get(7).expect("session");
        assert_eq!(session.history_len(), 3);
        let first = session.dialogue_history().next().expect("turn");
        assert_eq!(first.user_text, "q3");
        assert_eq!(first.bot_text, "a3");
    }

    #[test]
    fn zero_max_history_is_clamped() {
        let mut store = SessionStore::new(0);
        store.record_turn(1, "a", "b");
        assert_eq!(store.max_history(), 1);
        assert_eq!(store.get(1).map(|s| s.history_len()), Some(1));
    }

    #[test]
    fn evict_idle_removes_only_stale_sessions() {
        let mut store = SessionStore::new(10);
        store.record_turn(1, "a", "b");
        let ttl = Duration::from_secs(60);

        assert_eq!(store.evict_idle(ttl, Instant::now()), 0);
        assert_eq!(store.len(), 1);

        let later = Instant::now() + ttl + Duration::from_secs(1);
        assert_eq!(store.evict_idle(ttl, later), 1);
        assert!(store.is_empty());
    }

    #[test]
    fn enforce_capacity_drops_least_recently_seen() {
        let mut store = SessionStore::new(10);
        store.record_turn(1, "a", "b");
        std::thread::sleep(Duration::from_millis(2));
        store.record_turn(2, "a", "b");
        std::thread::sleep(Duration::from_millis(2));
        store.record_turn(3, "a", "b");

        assert_eq!(store.enforce_capacity(2), 1);
        assert!(store.get(1).is_none());
        assert!(store.get(2).is_some());
        assert!(store.get(3).is_some());
        assert_eq!(store.enforce_capacity(5), 0);
    }
}
