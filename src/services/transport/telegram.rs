use anyhow::Context;
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};

use super::{Invoice, Transport};
use crate::services::keyboard::Keyboard;

const INVOICE_DESCRIPTION_LIMIT: usize = 255;

pub struct TelegramTransport {
    api_url: String,
    bot_token: String,
    payment_provider_token: String,
    client: reqwest::Client,
}

#[derive(Deserialize)]
struct ApiResponse {
    ok: bool,
    description: Option<String>,
}

impl TelegramTransport {
    pub fn new(api_url: String, bot_token: String, payment_provider_token: String) -> Self {
        Self {
            api_url,
            bot_token,
            payment_provider_token,
            client: reqwest::Client::new(),
        }
    }

    async fn call(&self, method: &str, body: Value) -> anyhow::Result<()> {
        let url = format!("{}/bot{}/{}", self.api_url, self.bot_token, method);

        let response: ApiResponse = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .with_context(|| format!("failed to call Telegram {method}"))?
            .error_for_status()
            .with_context(|| format!("Telegram {method} returned error"))?
            .json()
            .await
            .with_context(|| format!("failed to decode Telegram {method} response"))?;

        if !response.ok {
            anyhow::bail!(
                "Telegram {method} rejected: {}",
                response.description.unwrap_or_default()
            );
        }
        Ok(())
    }
}

pub fn reply_markup(keyboard: &Keyboard) -> Value {
    match keyboard {
        Keyboard::Inline(rows) => json!({ "inline_keyboard": rows }),
        Keyboard::RequestContact { label } => json!({
            "keyboard": [[{ "text": label, "request_contact": true }]],
            "resize_keyboard": true,
            "one_time_keyboard": true,
        }),
        Keyboard::Remove => json!({ "remove_keyboard": true }),
    }
}

fn with_markup(mut body: Value, keyboard: Option<&Keyboard>) -> Value {
    if let (Some(keyboard), Some(obj)) = (keyboard, body.as_object_mut()) {
        obj.insert("reply_markup".to_string(), reply_markup(keyboard));
    }
    body
}

#[async_trait]
impl Transport for TelegramTransport {
    async fn send_message(
        &self,
        chat_id: i64,
        text: &str,
        keyboard: Option<&Keyboard>,
    ) -> anyhow::Result<()> {
        let body = json!({ "chat_id": chat_id, "text": text, "parse_mode": "HTML" });
        self.call("sendMessage", with_markup(body, keyboard)).await
    }

    async fn send_photo(
        &self,
        chat_id: i64,
        photo: &str,
        caption: &str,
        keyboard: Option<&Keyboard>,
    ) -> anyhow::Result<()> {
        let body = json!({
            "chat_id": chat_id,
            "photo": photo,
            "caption": caption,
            "parse_mode": "HTML",
        });
        self.call("sendPhoto", with_markup(body, keyboard)).await
    }

    async fn edit_message(
        &self,
        chat_id: i64,
        message_id: i64,
        text: &str,
        keyboard: Option<&Keyboard>,
    ) -> anyhow::Result<()> {
        let body = json!({
            "chat_id": chat_id,
            "message_id": message_id,
            "text": text,
            "parse_mode": "HTML",
        });
        self.call("editMessageText", with_markup(body, keyboard)).await
    }

    async fn answer_callback(&self, callback_id: &str, text: Option<&str>) -> anyhow::Result<()> {
        let mut body = json!({ "callback_query_id": callback_id });
        if let Some(text) = text {
            body["text"] = json!(text);
        }
        self.call("answerCallbackQuery", body).await
    }

    async fn send_invoice(&self, chat_id: i64, invoice: &Invoice) -> anyhow::Result<()> {
        let description: String = invoice
            .description
            .chars()
            .take(INVOICE_DESCRIPTION_LIMIT)
            .collect();
        let body = json!({
            "chat_id": chat_id,
            "title": invoice.title,
            "description": description,
            "payload": invoice.payload,
            "provider_token": self.payment_provider_token,
            "currency": invoice.currency,
            "prices": invoice.prices,
        });
        self.call("sendInvoice", body).await
    }

    async fn answer_pre_checkout(
        &self,
        query_id: &str,
        ok: bool,
        error_message: Option<&str>,
    ) -> anyhow::Result<()> {
        let mut body = json!({ "pre_checkout_query_id": query_id, "ok": ok });
        if let Some(message) = error_message {
            body["error_message"] = json!(message);
        }
        self.call("answerPreCheckoutQuery", body).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::keyboard::Button;

    #[test]
    fn test_inline_markup_shape() {
        let markup = reply_markup(&Keyboard::Inline(vec![vec![Button::back()]]));
        assert_eq!(markup["inline_keyboard"][0][0]["callback_data"], "back");
        assert_eq!(markup["inline_keyboard"][0][0]["text"], "Back");
    }

    #[test]
    fn test_contact_markup_requests_contact() {
        let markup = reply_markup(&Keyboard::RequestContact {
            label: "Share phone".to_string(),
        });
        assert_eq!(markup["keyboard"][0][0]["request_contact"], true);
        assert_eq!(markup["one_time_keyboard"], true);
    }

    #[test]
    fn test_markup_is_optional() {
        let body = with_markup(json!({ "chat_id": 1 }), None);
        assert!(body.get("reply_markup").is_none());
    }
}
