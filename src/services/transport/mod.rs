pub mod telegram;

use async_trait::async_trait;
use serde::Serialize;

use crate::services::keyboard::Keyboard;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LabeledPrice {
    pub label: String,
    /// Minor currency units.
    pub amount: i64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invoice {
    pub title: String,
    pub description: String,
    /// Opaque token echoed back in the pre-checkout query and the payment.
    pub payload: String,
    pub currency: String,
    pub prices: Vec<LabeledPrice>,
}

/// Outbound side of the chat provider.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send_message(
        &self,
        chat_id: i64,
        text: &str,
        keyboard: Option<&Keyboard>,
    ) -> anyhow::Result<()>;

    async fn send_photo(
        &self,
        chat_id: i64,
        photo: &str,
        caption: &str,
        keyboard: Option<&Keyboard>,
    ) -> anyhow::Result<()>;

    async fn edit_message(
        &self,
        chat_id: i64,
        message_id: i64,
        text: &str,
        keyboard: Option<&Keyboard>,
    ) -> anyhow::Result<()>;

    async fn answer_callback(&self, callback_id: &str, text: Option<&str>) -> anyhow::Result<()>;

    async fn send_invoice(&self, chat_id: i64, invoice: &Invoice) -> anyhow::Result<()>;

    async fn answer_pre_checkout(
        &self,
        query_id: &str,
        ok: bool,
        error_message: Option<&str>,
    ) -> anyhow::Result<()>;
}
