//! Turns raw webhook payloads into conversation turns.

use std::sync::Arc;

use anyhow::Context;
use chrono::Utc;
use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::db::{self, queries};
use crate::models::{ConversationContext, Sender, Update};
use crate::models::update::TelegramUser;
use crate::services::conversation::{Effect, Event, Inbound};
use crate::services::transport::Transport;
use crate::state::AppState;

/// One async lock per external user, so turns of the same user never overlap.
#[derive(Default)]
pub struct UserLocks(DashMap<String, Arc<Mutex<()>>>);

impl UserLocks {
    pub async fn acquire(&self, user: &str) -> UserLockGuard<'_> {
        // Clone the Arc out so the map shard is not held across the await.
        let lock = self
            .0
            .entry(user.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        UserLockGuard {
            locks: self,
            user: user.to_string(),
            guard: Some(lock.lock_owned().await),
        }
    }
}

/// Held for the duration of a turn. The user's entry is dropped from the map
/// once nobody else holds or waits on it.
pub struct UserLockGuard<'a> {
    locks: &'a UserLocks,
    user: String,
    guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for UserLockGuard<'_> {
    fn drop(&mut self) {
        self.guard.take();
        // Cloning an entry requires the shard lock, so the count cannot grow under us.
        self.locks
            .0
            .remove_if(&self.user, |_, lock| Arc::strong_count(lock) == 1);
    }
}

fn sender_of(user: &TelegramUser, chat_id: i64) -> Sender {
    Sender {
        telegram_user_id: user.id.to_string(),
        chat_id,
        username: user.username.clone().unwrap_or_default(),
        first_name: user.first_name.clone(),
        last_name: user.last_name.clone(),
    }
}

/// Decode a Telegram update. Updates the bot does not handle yield `None`.
pub fn parse_update(raw: &[u8]) -> anyhow::Result<Option<Inbound>> {
    let update: Update = serde_json::from_slice(raw).context("invalid update payload")?;

    if let Some(message) = update.message {
        let Some(from) = &message.from else {
            return Ok(None);
        };
        let event = if let Some(payment) = message.successful_payment {
            Event::SuccessfulPayment {
                payload: payment.invoice_payload,
                currency: payment.currency,
                total_amount: payment.total_amount,
            }
        } else if let Some(contact) = message.contact {
            Event::ContactShared {
                phone: contact.phone_number,
                first_name: contact.first_name,
                last_name: contact.last_name,
            }
        } else if let Some(text) = &message.text {
            Event::from_text(text)
        } else {
            return Ok(None);
        };
        return Ok(Some(Inbound {
            sender: sender_of(from, message.chat.id),
            event,
        }));
    }

    if let Some(query) = update.callback_query {
        let chat_id = query
            .message
            .as_ref()
            .map(|m| m.chat.id)
            .unwrap_or(query.from.id);
        return Ok(Some(Inbound {
            sender: sender_of(&query.from, chat_id),
            event: Event::CallbackQuery {
                id: query.id,
                data: query.data.unwrap_or_default(),
                message_id: query.message.map(|m| m.message_id),
            },
        }));
    }

    if let Some(query) = update.pre_checkout_query {
        // Private chats share the user's id.
        return Ok(Some(Inbound {
            sender: sender_of(&query.from, query.from.id),
            event: Event::PreCheckoutQuery {
                id: query.id,
                payload: query.invoice_payload,
                currency: query.currency,
                total_amount: query.total_amount,
            },
        }));
    }

    Ok(None)
}

/// Handle one inbound update end to end: decode, run the conversation turn
/// under the user's lock, persist the context, then deliver the effects.
pub async fn receive(state: &Arc<AppState>, raw: &[u8]) -> anyhow::Result<()> {
    let Some(inbound) = parse_update(raw)? else {
        tracing::debug!("ignoring unsupported update");
        return Ok(());
    };
    let user = inbound.sender.telegram_user_id.clone();
    let chat_id = inbound.sender.chat_id;
    tracing::info!(user = %user, event = inbound.event.kind(), "inbound event");

    let _guard = state.user_locks.acquire(&user).await;

    let effects = {
        let now = Utc::now().naive_utc();
        let conn = db::lock(&state.db)?;
        let mut ctx = queries::get_conversation(&conn, &user)?
            .unwrap_or_else(|| ConversationContext::new(&user, chat_id, now));
        ctx.chat_id = chat_id;
        drop(conn);

        let effects = state.engine.handle(&state.db, now, &mut ctx, &inbound);

        let conn = db::lock(&state.db)?;
        queries::save_conversation(&conn, &ctx).context("failed to save conversation")?;
        effects
    };

    for (index, effect) in effects.iter().enumerate() {
        deliver(state.transport.as_ref(), chat_id, effect)
            .await
            .with_context(|| format!("failed to deliver effect {index} to user {user}"))?;
    }
    Ok(())
}

pub async fn deliver(transport: &dyn Transport, chat_id: i64, effect: &Effect) -> anyhow::Result<()> {
    match effect {
        Effect::SendText { text, keyboard } => {
            transport.send_message(chat_id, text, keyboard.as_ref()).await
        }
        Effect::SendPhoto {
            photo,
            caption,
            keyboard,
        } => {
            transport
                .send_photo(chat_id, photo, caption, keyboard.as_ref())
                .await
        }
        Effect::EditMessage {
            message_id,
            text,
            keyboard,
        } => {
            transport
                .edit_message(chat_id, *message_id, text, keyboard.as_ref())
                .await
        }
        Effect::AnswerCallback { callback_id, text } => {
            transport.answer_callback(callback_id, text.as_deref()).await
        }
        Effect::SendInvoice(invoice) => transport.send_invoice(chat_id, invoice).await,
        Effect::AnswerPreCheckout {
            query_id,
            ok,
            error_message,
        } => {
            transport
                .answer_pre_checkout(query_id, *ok, error_message.as_deref())
                .await
        }
    }
}
