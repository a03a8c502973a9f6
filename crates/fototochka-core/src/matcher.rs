//! Maps raw message text to a knowledge base topic
//!
//! Rules run in a fixed order and the first hit wins: keyboard button label,
//! command or alias, keyword groups (in priority order), fallback.

use crate::keyboard::KeyboardId;
use crate::knowledge::Topic;
use regex::Regex;
use std::collections::HashMap;
use std::sync::OnceLock;

const COMMAND_ALIASES: &[(&str, Topic)] = &[
    ("/start", Topic::Start),
    ("start", Topic::Start),
    ("начать", Topic::Start),
    ("/help", Topic::Help),
    ("help", Topic::Help),
    ("помощь", Topic::Help),
    ("/clear", Topic::Clear),
    ("clear", Topic::Clear),
    ("очистить", Topic::Clear),
    ("/services", Topic::Services),
    ("services", Topic::Services),
    ("услуги", Topic::Services),
    ("/price", Topic::Price),
    ("price", Topic::Price),
    ("цены", Topic::Price),
    ("/photobook", Topic::PhotoBook),
    ("photobook", Topic::PhotoBook),
    ("фотокниг", Topic::PhotoBook),
    ("/canvas", Topic::Canvas),
    ("canvas", Topic::Canvas),
    ("холст", Topic::Canvas),
    ("/restoration", Topic::Restoration),
    ("restoration", Topic::Restoration),
    ("реставрация", Topic::Restoration),
    ("/editing", Topic::Editing),
    ("editing", Topic::Editing),
    ("обработка", Topic::Editing),
    ("/contacts", Topic::Contacts),
    ("contacts", Topic::Contacts),
    ("контакты", Topic::Contacts),
    ("/address", Topic::Address),
    ("address", Topic::Address),
    ("адрес", Topic::Address),
    ("/schedule", Topic::Schedule),
    ("schedule", Topic::Schedule),
    ("график", Topic::Schedule),
    ("/delivery", Topic::Delivery),
    ("delivery", Topic::Delivery),
    ("доставк", Topic::Delivery),
    ("/payment", Topic::Payment),
    ("payment", Topic::Payment),
    ("оплат", Topic::Payment),
];

/// Earlier groups win over later ones.
pub const KEYWORD_GROUPS: &[(Topic, &[&str])] = &[
    (Topic::PhotoBook, &["фотокниг", "фотоальбом", "альбом", "книг"]),
    (
        Topic::Canvas,
        &["холст", "картин", "полотно", "сувенир", "кружк", "магнит"],
    ),
    (
        Topic::Restoration,
        &["реставрац", "восстановлени", "старое фото"],
    ),
    (Topic::Editing, &["обработк", "photoshop", "редактор", "коллаж"]),
    (
        Topic::PhotoPrint,
        &["фотопечат", "распечат", "печат", "снимк", "фотограф"],
    ),
    (
        Topic::Formats,
        &["10x15", "10х15", "15x21", "15х21", "а4", "а3", "формат"],
    ),
    (
        Topic::Price,
        &["сколько стоит", "цена", "цены", "стоимость", "прайс", "ценник"],
    ),
    (
        Topic::Contacts,
        &[
            "контакт",
            "телефон",
            "email",
            "позвонить",
            "связаться",
            "instagram",
            "telegram",
        ],
    ),
    (
        Topic::Address,
        &["адрес", "где находитесь", "метро", "проезд", "локация"],
    ),
    (
        Topic::Schedule,
        &[
            "график",
            "время работы",
            "работаете",
            "когда",
            "воскресенье",
            "суббот",
        ],
    ),
    (
        Topic::Services,
        &["услуг", "предлагаете", "делаете", "изготовлени"],
    ),
    (
        Topic::Delivery,
        &["доставк", "курьер", "самовывоз", "забрать", "привезти"],
    ),
    (
        Topic::Payment,
        &["оплат", "рассчет", "расчет", "картой", "наличными", "безнал"],
    ),
    (Topic::Greeting, &["привет", "здравствуйте", "добрый", "доброе"]),
    (Topic::Thanks, &["спасибо", "благодарю"]),
    (Topic::Back, &["назад", "вернуться"]),
];

/// Which rule produced a topic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchRule {
    Button,
    Command,
    Keyword(&'static str),
    Fallback,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TopicMatch {
    pub topic: Topic,
    pub rule: MatchRule,
}

fn non_word_chars() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[^\w\s]").expect("valid non-word pattern"))
}

pub fn normalize(text: &str) -> String {
    text.trim().to_lowercase()
}

/// Drops everything that is neither a word character nor whitespace.
pub fn strip_punctuation(normalized: &str) -> String {
    non_word_chars().replace_all(normalized, "").into_owned()
}

#[derive(Debug, Clone)]
pub struct Matcher {
    buttons: HashMap<String, Topic>,
    commands: HashMap<&'static str, Topic>,
    groups: &'static [(Topic, &'static [&'static str])],
}

impl Default for Matcher {
    fn default() -> Self {
        Self::new()
    }
}

impl Matcher {
    pub fn new() -> Self {
        let buttons = KeyboardId::ALL
            .into_iter()
            .flat_map(|id| id.buttons())
            .map(|button| (button.label.to_lowercase(), button.topic))
            .collect();
        let commands = COMMAND_ALIASES.iter().copied().collect();

        Self {
            buttons,
            commands,
            groups: KEYWORD_GROUPS,
        }
    }

    pub fn resolve_topic(&self, raw_text: &str) -> Topic {
        self.classify(raw_text).topic
    }

    pub fn classify(&self, raw_text: &str) -> TopicMatch {
        let normalized = normalize(raw_text);

        if let Some(topic) = self.buttons.get(&normalized) {
            return TopicMatch {
                topic: *topic,
                rule: MatchRule::Button,
            };
        }

        if let Some(topic) = self.lookup_command(&normalized) {
            return TopicMatch {
                topic,
                rule: MatchRule::Command,
            };
        }

        let cleaned = strip_punctuation(&normalized);
        for (topic, keywords) in self.groups {
            if let Some(keyword) = keywords.iter().copied().find(|kw| cleaned.contains(kw)) {
                return TopicMatch {
                    topic: *topic,
                    rule: MatchRule::Keyword(keyword),
                };
            }
        }

        TopicMatch {
            topic: Topic::Fallback,
            rule: MatchRule::Fallback,
        }
    }

    fn lookup_command(&self, normalized: &str) -> Option<Topic> {
        if let Some(topic) = self.commands.get(normalized) {
            return Some(*topic);
        }
        // Group chats address commands as "/price@SomeBot".
        if normalized.starts_with('/') {
            if let Some((command, _bot)) = normalized.split_once('@') {
                return self.commands.get(command).copied();
            }
        }
        None
    }

    /// Every topic this matcher can return.
    pub fn referenced_topics(&self) -> Vec<Topic> {
        let mut topics: Vec<Topic> = self
            .buttons
            .values()
            .chain(self.commands.values())
            .copied()
            .chain(self.groups.iter().map(|(topic, _)| *topic))
            .chain(std::iter::once(Topic::Fallback))
            .collect();
        topics.sort();
        topics.dedup();
        topics
    }
}
