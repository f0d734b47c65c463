//! Linking an operator account to a chat on the secondary bot.
//!
//! An administrator issues a one-time token for an account; the operator
//! sends that token to the link bot, which binds the chat to the account.

use std::sync::Arc;

use anyhow::Context;
use rand::distributions::Alphanumeric;
use rand::Rng;
use rusqlite::Connection;

use crate::db::{self, queries};
use crate::models::{Account, Update};
use crate::state::AppState;

pub const TOKEN_LEN: usize = 20;

pub fn generate_token() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(TOKEN_LEN)
        .map(char::from)
        .collect()
}

/// Create a fresh token for `username`, replacing any earlier one.
pub fn issue_token(conn: &Connection, username: &str) -> anyhow::Result<(Account, String)> {
    let account = queries::get_or_create_account(conn, username)?;
    let token = generate_token();
    queries::set_link_token(conn, &account.id, &token)?;
    Ok((account, token))
}

pub async fn receive_link(state: &Arc<AppState>, raw: &[u8]) -> anyhow::Result<()> {
    let update: Update = serde_json::from_slice(raw).context("invalid update payload")?;
    let Some(message) = update.message else {
        return Ok(());
    };
    let Some(token) = message.text.as_deref().map(str::trim) else {
        return Ok(());
    };
    let chat_id = message.chat.id;

    let linked = {
        let conn = db::lock(&state.db)?;
        queries::link_chat_by_token(&conn, token, &chat_id.to_string())?
    };

    match linked {
        Some(account) => {
            tracing::info!(account = %account.username, chat_id, "chat linked");
            state
                .link_transport
                .send_message(chat_id, "Your account is now linked.", None)
                .await?;
        }
        None => tracing::debug!(chat_id, "link message without a valid token"),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_shape() {
        let token = generate_token();
        assert_eq!(token.len(), TOKEN_LEN);
        assert!(token.chars().all(|c| c.is_ascii_alphanumeric()));
        assert_ne!(token, generate_token());
    }

    #[test]
    fn test_issue_token_replaces_previous() {
        let conn = db::init_db(":memory:").unwrap();
        let (_, first) = issue_token(&conn, "alice").unwrap();
        let (_, second) = issue_token(&conn, "alice").unwrap();

        assert!(queries::link_chat_by_token(&conn, &first, "1").unwrap().is_none());
        assert!(queries::link_chat_by_token(&conn, &second, "1").unwrap().is_some());
    }
}
