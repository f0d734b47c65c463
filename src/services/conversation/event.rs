//! Inbound chat events after decoding the transport payload.

use crate::models::Sender;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    /// `/name` without the slash or any `@bot` suffix.
    Command(String),
    CallbackQuery {
        id: String,
        data: String,
        /// Message carrying the pressed button, when the transport reports one.
        message_id: Option<i64>,
    },
    TextMessage(String),
    ContactShared {
        phone: String,
        first_name: String,
        last_name: Option<String>,
    },
    PreCheckoutQuery {
        id: String,
        payload: String,
        currency: String,
        total_amount: i64,
    },
    SuccessfulPayment {
        payload: String,
        currency: String,
        total_amount: i64,
    },
}

impl Event {
    pub fn kind(&self) -> &'static str {
        match self {
            Event::Command(_) => "command",
            Event::CallbackQuery { .. } => "callback_query",
            Event::TextMessage(_) => "text",
            Event::ContactShared { .. } => "contact",
            Event::PreCheckoutQuery { .. } => "pre_checkout_query",
            Event::SuccessfulPayment { .. } => "successful_payment",
        }
    }

    pub fn callback_data(&self) -> Option<&str> {
        match self {
            Event::CallbackQuery { data, .. } => Some(data),
            _ => None,
        }
    }

    /// Parse a message text, treating a leading slash as a command.
    pub fn from_text(text: &str) -> Self {
        let trimmed = text.trim();
        match trimmed.strip_prefix('/') {
            Some(rest) if !rest.is_empty() => {
                let word = rest.split_whitespace().next().unwrap_or_default();
                let name = word.split('@').next().unwrap_or_default();
                Event::Command(name.to_lowercase())
            }
            _ => Event::TextMessage(trimmed.to_string()),
        }
    }
}

/// A decoded event together with who sent it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Inbound {
    pub sender: Sender,
    pub event: Event,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_text_commands() {
        assert_eq!(Event::from_text("/start"), Event::Command("start".to_string()));
        assert_eq!(
            Event::from_text("/Start@park_bot now"),
            Event::Command("start".to_string())
        );
        assert_eq!(Event::from_text(" 3 "), Event::TextMessage("3".to_string()));
        assert_eq!(Event::from_text("/"), Event::TextMessage("/".to_string()));
    }
}
