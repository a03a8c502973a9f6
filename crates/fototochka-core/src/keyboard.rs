//! Named reply keyboards shown under the bot's answers

use crate::knowledge::Topic;
use fototochka_ipc::ReplyKeyboard;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum KeyboardId {
    #[default]
    Main,
    Services,
    Contacts,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Button {
    pub label: &'static str,
    pub topic: Topic,
}

const fn button(label: &'static str, topic: Topic) -> Button {
    Button { label, topic }
}

const SERVICES: Button = button("📚 Услуги", Topic::Services);
const PRICES: Button = button("💎 Цены", Topic::Price);
const CONTACTS: Button = button("📞 Контакты", Topic::Contacts);
const DELIVERY: Button = button("🚚 Доставка", Topic::Delivery);
const PAYMENT: Button = button("💳 Оплата", Topic::Payment);
const HELP: Button = button("🆘 Помощь", Topic::Help);
const PHOTOBOOKS: Button = button("📖 Фотокниги", Topic::PhotoBook);
const CANVAS: Button = button("🎨 Холсты", Topic::Canvas);
const RESTORATION: Button = button("🔧 Реставрация", Topic::Restoration);
const EDITING: Button = button("💻 Обработка", Topic::Editing);
const EMAIL: Button = button("📧 Email", Topic::Email);
const BACK: Button = button("🔙 Назад", Topic::Back);

const MAIN_LAYOUT: &[&[Button]] = &[
    &[SERVICES, PRICES],
    &[PHOTOBOOKS, CANVAS],
    &[DELIVERY, PAYMENT],
    &[CONTACTS, HELP],
];

const SERVICES_LAYOUT: &[&[Button]] = &[
    &[PHOTOBOOKS, CANVAS],
    &[RESTORATION, EDITING],
    &[PRICES, BACK],
];

const CONTACTS_LAYOUT: &[&[Button]] = &[&[EMAIL, DELIVERY], &[BACK]];

impl KeyboardId {
    pub const ALL: [KeyboardId; 3] = [KeyboardId::Main, KeyboardId::Services, KeyboardId::Contacts];

    pub fn name(self) -> &'static str {
        match self {
            KeyboardId::Main => "main",
            KeyboardId::Services => "services",
            KeyboardId::Contacts => "contacts",
        }
    }

    pub fn layout(self) -> &'static [&'static [Button]] {
        match self {
            KeyboardId::Main => MAIN_LAYOUT,
            KeyboardId::Services => SERVICES_LAYOUT,
            KeyboardId::Contacts => CONTACTS_LAYOUT,
        }
    }

    pub fn buttons(self) -> impl Iterator<Item = &'static Button> {
        self.layout().iter().flat_map(|row| row.iter())
    }

    pub fn to_reply_keyboard(self) -> ReplyKeyboard {
        ReplyKeyboard {
            name: self.name().to_string(),
            rows: self
                .layout()
                .iter()
                .map(|row| row.iter().map(|b| b.label.to_string()).collect())
                .collect(),
        }
    }
}

impl std::str::FromStr for KeyboardId {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "main" => Ok(KeyboardId::Main),
            "services" => Ok(KeyboardId::Services),
            "contacts" => Ok(KeyboardId::Contacts),
            _ => Err(format!("Unknown keyboard: {}", s)),
        }
    }
}

impl std::fmt::Display for KeyboardId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::KeyboardId;
    use std::collections::HashMap;

    #[test]
    fn reply_keyboard_keeps_row_layout() {
        let kb = KeyboardId::Contacts.to_reply_keyboard();
        assert_eq!(kb.name, "contacts");
        assert_eq!(
            kb.rows,
            vec![
                vec!["📧 Email".to_string(), "🚚 Доставка".to_string()],
                vec!["🔙 Назад".to_string()],
            ]
        );
    }

    #[test]
    fn labels_map_to_one_topic_across_keyboards() {
        let mut seen = HashMap::new();
        for id in KeyboardId::ALL {
            for button in id.buttons() {
                let previous = seen.insert(button.label, button.topic);
                if let Some(previous) = previous {
                    assert_eq!(previous, button.topic, "label {}", button.label);
                }
            }
        }
        assert!(seen.len() >= 12);
    }

    #[test]
    fn names_parse_back() {
        for id in KeyboardId::ALL {
            assert_eq!(id.name().parse::<KeyboardId>(), Ok(id));
        }
        assert!("nope".parse::<KeyboardId>().is_err());
    }
}
