//! Outbound actions produced by conversation handlers.

use super::Event;
use crate::services::keyboard::Keyboard;
use crate::services::transport::Invoice;

/// Executed by the dispatcher, in order, against the user's chat.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    SendText {
        text: String,
        keyboard: Option<Keyboard>,
    },
    SendPhoto {
        photo: String,
        caption: String,
        keyboard: Option<Keyboard>,
    },
    EditMessage {
        message_id: i64,
        text: String,
        keyboard: Option<Keyboard>,
    },
    AnswerCallback {
        callback_id: String,
        text: Option<String>,
    },
    SendInvoice(Invoice),
    AnswerPreCheckout {
        query_id: String,
        ok: bool,
        error_message: Option<String>,
    },
}

impl Effect {
    pub fn text(text: impl Into<String>) -> Self {
        Effect::SendText {
            text: text.into(),
            keyboard: None,
        }
    }

    pub fn text_with(text: impl Into<String>, keyboard: Keyboard) -> Self {
        Effect::SendText {
            text: text.into(),
            keyboard: Some(keyboard),
        }
    }

    /// Acknowledge a button press; `None` for any other event.
    pub fn ack(event: &Event, text: Option<&str>) -> Option<Self> {
        match event {
            Event::CallbackQuery { id, .. } => Some(Effect::AnswerCallback {
                callback_id: id.clone(),
                text: text.map(str::to_string),
            }),
            _ => None,
        }
    }

    /// Show `text` in place of the message whose button was pressed, or as a
    /// new message when there is no such message.
    pub fn replace(event: &Event, text: impl Into<String>, keyboard: Keyboard) -> Self {
        match event {
            Event::CallbackQuery {
                message_id: Some(message_id),
                ..
            } => Effect::EditMessage {
                message_id: *message_id,
                text: text.into(),
                keyboard: Some(keyboard),
            },
            _ => Effect::text_with(text, keyboard),
        }
    }
}

/// Escape text interpolated into an HTML-formatted message.
pub fn escape_html(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            _ => escaped.push(c),
        }
    }
    escaped
}

/// Acknowledge a button press (if any) and replace its message.
pub fn respond(event: &Event, text: impl Into<String>, keyboard: Keyboard) -> Vec<Effect> {
    Effect::ack(event, None)
        .into_iter()
        .chain(std::iter::once(Effect::replace(event, text, keyboard)))
        .collect()
}
