//! Static knowledge base: one canned answer per topic.

use crate::error::KnowledgeError;
use crate::keyboard::KeyboardId;
use serde::Deserialize;
use std::collections::{BTreeSet, HashMap};
use std::path::Path;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Topic {
    Start,
    Help,
    Clear,
    Services,
    Price,
    PhotoPrint,
    Formats,
    PhotoBook,
    Canvas,
    Restoration,
    Editing,
    Contacts,
    Email,
    Address,
    Schedule,
    Delivery,
    Payment,
    Greeting,
    Thanks,
    Back,
    Fallback,
}

impl Topic {
    pub const ALL: [Topic; 21] = [
        Topic::Start,
        Topic::Help,
        Topic::Clear,
        Topic::Services,
        Topic::Price,
        Topic::PhotoPrint,
        Topic::Formats,
        Topic::PhotoBook,
        Topic::Canvas,
        Topic::Restoration,
        Topic::Editing,
        Topic::Contacts,
        Topic::Email,
        Topic::Address,
        Topic::Schedule,
        Topic::Delivery,
        Topic::Payment,
        Topic::Greeting,
        Topic::Thanks,
        Topic::Back,
        Topic::Fallback,
    ];

    /// Key used in knowledge files and logs.
    pub fn key(self) -> &'static str {
        match self {
            Topic::Start => "start",
            Topic::Help => "help",
            Topic::Clear => "clear",
            Topic::Services => "услуг",
            Topic::Price => "цена",
            Topic::PhotoPrint => "фотопечат",
            Topic::Formats => "формат",
            Topic::PhotoBook => "фотокниг",
            Topic::Canvas => "холст",
            Topic::Restoration => "реставрац",
            Topic::Editing => "обработк",
            Topic::Contacts => "контакт",
            Topic::Email => "email",
            Topic::Address => "адрес",
            Topic::Schedule => "график",
            Topic::Delivery => "доставк",
            Topic::Payment => "оплат",
            Topic::Greeting => "привет",
            Topic::Thanks => "спасибо",
            Topic::Back => "назад",
            Topic::Fallback => "непонятно",
        }
    }
}

impl std::str::FromStr for Topic {
    type Err = KnowledgeError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let key = s.trim();
        Topic::ALL
            .into_iter()
            .find(|topic| topic.key() == key)
            .ok_or_else(|| KnowledgeError::UnknownTopic(key.to_string()))
    }
}

impl std::fmt::Display for Topic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.key())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KnowledgeEntry {
    pub topic: Topic,
    pub text: String,
    pub keyboard: Option<KeyboardId>,
}

impl KnowledgeEntry {
    pub fn new(topic: Topic, text: impl Into<String>, keyboard: Option<KeyboardId>) -> Self {
        Self {
            topic,
            text: text.into(),
            keyboard,
        }
    }
}

#[derive(Debug, Deserialize)]
struct KnowledgeFile {
    #[serde(default)]
    entries: Vec<RawEntry>,
}

#[derive(Debug, Deserialize)]
struct RawEntry {
    key: String,
    text: String,
    #[serde(default)]
    keyboard: Option<String>,
}

#[derive(Debug, Clone)]
pub struct KnowledgeBase {
    entries: HashMap<Topic, KnowledgeEntry>,
    fallback: KnowledgeEntry,
}

impl KnowledgeBase {
    pub fn from_entries(entries: Vec<KnowledgeEntry>) -> Result<Self, KnowledgeError> {
        let mut map = HashMap::with_capacity(entries.len());
        for entry in entries {
            if entry.text.trim().is_empty() {
                return Err(KnowledgeError::EmptyText(entry.topic.key().to_string()));
            }
            let topic = entry.topic;
            if map.insert(topic, entry).is_some() {
                return Err(KnowledgeError::DuplicateTopic(topic.key().to_string()));
            }
        }

        let fallback = map
            .get(&Topic::Fallback)
            .cloned()
            .ok_or_else(|| KnowledgeError::MissingFallback(Topic::Fallback.key().to_string()))?;

        Ok(Self {
            entries: map,
            fallback,
        })
    }

    pub fn from_toml_str(content: &str) -> Result<Self, KnowledgeError> {
        let file: KnowledgeFile = toml::from_str(content)?;
        let mut entries = Vec::with_capacity(file.entries.len());
        for raw in file.entries {
            let topic: Topic = raw.key.parse()?;
            let keyboard = match raw.keyboard.as_deref().map(str::trim) {
                None | Some("") => None,
                Some(name) => Some(name.parse::<KeyboardId>().map_err(|_| {
                    KnowledgeError::UnknownKeyboard {
                        topic: topic.key().to_string(),
                        keyboard: name.to_string(),
                    }
                })?),
            };
            entries.push(KnowledgeEntry::new(topic, raw.text, keyboard));
        }
        Self::from_entries(entries)
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, KnowledgeError> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Self::from_toml_str(&content)
    }

    pub fn get(&self, topic: Topic) -> Option<&KnowledgeEntry> {
        self.entries.get(&topic)
    }

    pub fn fallback(&self) -> &KnowledgeEntry {
        &self.fallback
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Fails when any of `referenced` has no entry.
    pub fn ensure_covers<I>(&self, referenced: I) -> Result<(), KnowledgeError>
    where
        I: IntoIterator<Item = Topic>,
    {
        let missing: BTreeSet<Topic> = referenced
            .into_iter()
            .filter(|topic| !self.entries.contains_key(topic))
            .collect();

        if missing.is_empty() {
            Ok(())
        } else {
            Err(KnowledgeError::Incomplete(
                missing.into_iter().map(|t| t.key().to_string()).collect(),
            ))
        }
    }

    pub fn builtin() -> Self {
        Self::from_entries(builtin_entries()).expect("built-in knowledge base is valid")
    }
}

const FALLBACK_TEXT: &str = "🤔 Извините, я не совсем понял вопрос.\n\n\
Попробуйте выбрать раздел на клавиатуре ниже или напишите, что вас интересует: \
печать фото, фотокниги, холсты, цены, доставка, оплата.\n\n\
📞 Если удобнее, позвоните нам: +7 (999) 123-45-67";

fn builtin_entries() -> Vec<KnowledgeEntry> {
    use KeyboardId::{Contacts, Main, Services};

    vec![
        KnowledgeEntry::new(
            Topic::Start,
            "👋 Здравствуйте! Вас приветствует фотоцентр «ФотоТочка».\n\n\
Мы печатаем фотографии, делаем фотокниги, холсты и фотосувениры, \
реставрируем старые снимки.\n\n\
Выберите раздел на клавиатуре или просто напишите свой вопрос.",
            Some(Main),
        ),
        KnowledgeEntry::new(
            Topic::Help,
            "🆘 Чем я могу помочь:\n\n\
/services — наши услуги\n\
/price — цены\n\
/photobook — фотокниги\n\
/canvas — печать на холсте\n\
/restoration — реставрация фото\n\
/editing — обработка фото\n\
/contacts — контакты\n\
/address — как нас найти\n\
/schedule — график работы\n\
/delivery — доставка\n\
/payment — оплата\n\n\
Можно писать и обычным текстом, например: «сколько стоит печать 10x15».",
            Some(Main),
        ),
        KnowledgeEntry::new(
            Topic::Clear,
            "👌 Чем ещё могу помочь? Задайте новый вопрос или выберите раздел на клавиатуре.",
            Some(Main),
        ),
        KnowledgeEntry::new(
            Topic::Services,
            "📚 Наши услуги:\n\n\
• Печать фотографий любых форматов\n\
• Фотокниги и фотоальбомы\n\
• Печать на холсте\n\
• Фотосувениры: кружки, магниты\n\
• Реставрация старых фотографий\n\
• Обработка и ретушь, коллажи\n\n\
Выберите услугу, чтобы узнать подробнее.",
            Some(Services),
        ),
        KnowledgeEntry::new(
            Topic::Price,
            "💎 Цены:\n\n\
• Фото 10x15 — от 15 ₽\n\
• Фото 15x21 — от 35 ₽\n\
• Фото А4 — от 90 ₽\n\
• Фотокнига 20x20, 20 страниц — от 1 900 ₽\n\
• Холст 30x40 — от 1 500 ₽\n\
• Реставрация — от 500 ₽\n\
• Обработка фото — от 150 ₽\n\n\
При заказе от 100 фото — скидка 10%.",
            Some(Main),
        ),
        KnowledgeEntry::new(
            Topic::PhotoPrint,
            "🖨 Печать фотографий:\n\n\
Печатаем на глянцевой и матовой бумаге, форматы от 10x15 до А3.\n\
Обычный заказ готов за 1 час, большие тиражи — на следующий день.\n\n\
Файлы можно прислать на почту или принести на флешке.",
            Some(Main),
        ),
        KnowledgeEntry::new(
            Topic::Formats,
            "📐 Форматы печати:\n\n\
• 10x15 — классический\n\
• 15x21 — для рамок и альбомов\n\
• А4 (21x30) — для портретов\n\
• А3 (30x42) — для постеров\n\n\
Нестандартный размер — уточните у менеджера.",
            Some(Main),
        ),
        KnowledgeEntry::new(
            Topic::PhotoBook,
            "📖 Фотокниги:\n\n\
Твёрдая обложка, плотные разворачивающиеся страницы, от 10 до 60 разворотов.\n\
Поможем с версткой: пришлите фото, а макет подготовит дизайнер.\n\n\
Срок изготовления — от 3 рабочих дней.",
            Some(Services),
        ),
        KnowledgeEntry::new(
            Topic::Canvas,
            "🎨 Печать на холсте и фотосувениры:\n\n\
Натуральный хлопковый холст на подрамнике, размеры от 20x30 до 60x90.\n\
Также печатаем фото на кружках и магнитах.\n\n\
Срок изготовления — 2 рабочих дня.",
            Some(Services),
        ),
        KnowledgeEntry::new(
            Topic::Restoration,
            "🔧 Реставрация фотографий:\n\n\
Восстанавливаем старые, выцветшие и повреждённые снимки: убираем трещины, \
заломы и пятна, возвращаем цвет.\n\n\
Оригинал сканируем при вас и сразу отдаём обратно.",
            Some(Services),
        ),
        KnowledgeEntry::new(
            Topic::Editing,
            "💻 Обработка фото:\n\n\
Цветокоррекция, ретушь портретов, замена фона, коллажи из нескольких снимков.\n\
Готовый файл пришлём на почту или в мессенджер.",
            Some(Services),
        ),
        KnowledgeEntry::new(
            Topic::Contacts,
            "📞 Контакты:\n\n\
Телефон: +7 (999) 123-45-67\n\
Email: info@fototochka.ru\n\
Telegram: @fototochka\n\n\
Пишите и звоните в рабочее время, ответим быстро!",
            Some(Contacts),
        ),
        KnowledgeEntry::new(
            Topic::Email,
            "📧 Наша почта: info@fototochka.ru\n\n\
Присылайте файлы для печати и пишите номер телефона для связи.",
            Some(Contacts),
        ),
        KnowledgeEntry::new(
            Topic::Address,
            "📍 Адрес: ул. Фотографическая, 10, вход со двора.\n\n\
5 минут пешком от метро «Центральная».",
            Some(Main),
        ),
        KnowledgeEntry::new(
            Topic::Schedule,
            "🕐 График работы:\n\n\
Пн–Пт: 9:00–20:00\n\
Суббота: 10:00–18:00\n\
Воскресенье: выходной",
            Some(Main),
        ),
        KnowledgeEntry::new(
            Topic::Delivery,
            "🚚 Доставка:\n\n\
• Самовывоз из фотоцентра — бесплатно\n\
• Курьер по городу — 300 ₽, бесплатно от 3 000 ₽\n\
• Почта России и СДЭК — по тарифам перевозчика",
            Some(Main),
        ),
        KnowledgeEntry::new(
            Topic::Payment,
            "💳 Оплата:\n\n\
Принимаем наличные, банковские карты и безналичный расчёт для организаций.\n\
Крупные заказы — по предоплате 50%.",
            Some(Main),
        ),
        KnowledgeEntry::new(
            Topic::Greeting,
            "👋 Привет! Чем можем помочь? Выберите раздел на клавиатуре или задайте вопрос.",
            Some(Main),
        ),
        KnowledgeEntry::new(
            Topic::Thanks,
            "😊 Пожалуйста! Будем рады видеть вас в «ФотоТочке».",
            Some(Main),
        ),
        KnowledgeEntry::new(
            Topic::Back,
            "🔙 Главное меню. Выберите раздел.",
            Some(Main),
        ),
        KnowledgeEntry::new(Topic::Fallback, FALLBACK_TEXT, Some(Main)),
    ]
}

#[cfg(test)]
mod tests {
    use super::{KnowledgeBase, KnowledgeEntry, Topic};
    use crate::error::KnowledgeError;
    use crate::keyboard::KeyboardId;

    #[test]
    fn builtin_covers_every_topic() {
        let kb = KnowledgeBase::builtin();
        assert!(kb.ensure_covers(Topic::ALL).is_ok());
        assert_eq!(kb.len(), Topic::ALL.len());
        assert_eq!(kb.fallback().topic, Topic::Fallback);
    }

    #[test]
    fn topic_keys_roundtrip_through_from_str() {
        for topic in Topic::ALL {
            assert_eq!(topic.key().parse::<Topic>().expect("known key"), topic);
        }
        assert!(matches!(
            "нет-такого".parse::<Topic>(),
            Err(KnowledgeError::UnknownTopic(_))
        ));
    }

    #[test]
    fn from_entries_requires_fallback() {
        let result = KnowledgeBase::from_entries(vec![KnowledgeEntry::new(
            Topic::Start,
            "hi",
            None,
        )]);
        assert!(matches!(result, Err(KnowledgeError::MissingFallback(_))));
    }

    #[test]
    fn from_entries_rejects_duplicates_and_empty_text() {
        let dup = KnowledgeBase::from_entries(vec![
            KnowledgeEntry::new(Topic::Fallback, "a", None),
            KnowledgeEntry::new(Topic::Fallback, "b", None),
        ]);
        assert!(matches!(dup, Err(KnowledgeError::DuplicateTopic(_))));

        let empty = KnowledgeBase::from_entries(vec![KnowledgeEntry::new(
            Topic::Fallback,
            "  ",
            None,
        )]);
        assert!(matches!(empty, Err(KnowledgeError::EmptyText(_))));
    }

    #[test]
    fn toml_file_parses_keys_and_keyboards() {
        let kb = KnowledgeBase::from_toml_str(
            r#"
[[entries]]
key = "непонятно"
text = "Не понял"

[[entries]]
key = "цена"
text = "Дорого"
keyboard = "services"
"#,
        )
        .expect("valid knowledge file");

        assert_eq!(kb.len(), 2);
        let price = kb.get(Topic::Price).expect("price entry");
        assert_eq!(price.text, "Дорого");
        assert_eq!(price.keyboard, Some(KeyboardId::Services));
        assert_eq!(kb.fallback().keyboard, None);
    }

    #[test]
    fn toml_file_rejects_unknown_keyboard() {
        let result = KnowledgeBase::from_toml_str(
            r#"
[[entries]]
key = "непонятно"
text = "Не понял"
keyboard = "secret"
"#,
        );
        assert!(matches!(
            result,
            Err(KnowledgeError::UnknownKeyboard { .. })
        ));
    }

    #[test]
    fn ensure_covers_lists_missing_topics() {
        let kb = KnowledgeBase::from_entries(vec![KnowledgeEntry::new(
            Topic::Fallback,
            "?",
            None,
        )])
        .expect("fallback only");
        match kb.ensure_covers([Topic::Price, Topic::Start, Topic::Fallback]) {
            Err(KnowledgeError::Incomplete(missing)) => {
                assert_eq!(missing, vec!["start".to_string(), "цена".to_string()]);
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }
}
