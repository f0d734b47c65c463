use serde::{Deserialize, Serialize};

/// A web account that can be paired with a Telegram chat.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Account {
    pub id: String,
    pub username: String,
    pub link_token: Option<String>,
    pub chat_id: Option<String>,
}
