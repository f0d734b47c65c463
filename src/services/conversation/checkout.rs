//! Invoice, payment confirmation and occupancy confirmation.

use chrono::{Duration, NaiveDateTime};
use rusqlite::Connection;
use uuid::Uuid;

use super::catalog::DEPARTURE_FORMAT;
use super::effect::escape_html;
use super::{callback_arg, hours_label, Effect, Event, Outcome, Turn};
use crate::db::queries;
use crate::errors::BotError;
use crate::models::{format_money, Cart, ConversationContext, ConversationState, Purchase};
use crate::services::keyboard::{Button, Keyboard};
use crate::services::transport::{Invoice, LabeledPrice};

const INVOICE_TITLE: &str = "Parking reservation";

fn build_invoice(cart: &Cart, payload: String, currency: &str) -> Invoice {
    let mut description = cart
        .iter()
        .map(|item| format!("{}: {}", item.name, hours_label(item.quantity)))
        .collect::<Vec<_>>()
        .join(", ");
    description.push_str(&format!(". Total {}", format_money(cart.total())));

    Invoice {
        title: INVOICE_TITLE.to_string(),
        description,
        payload,
        currency: currency.to_string(),
        prices: cart
            .iter()
            .map(|item| LabeledPrice {
                label: format!("{} × {}", item.name, hours_label(item.quantity)),
                amount: item.total_price(),
            })
            .collect(),
    }
}

pub fn request_payment(
    turn: &Turn,
    ctx: &mut ConversationContext,
    event: &Event,
) -> Result<Outcome, BotError> {
    if ctx.cart.is_empty() {
        let effects = Effect::ack(event, Some("Your cart is empty"))
            .into_iter()
            .collect();
        return Ok(Outcome::to(ctx.state, effects));
    }

    let payload = Uuid::new_v4().to_string();
    ctx.user_data.invoice_payload = Some(payload.clone());
    let invoice = build_invoice(&ctx.cart, payload, &turn.settings.currency);

    let mut effects: Vec<Effect> = Effect::ack(event, None).into_iter().collect();
    effects.push(Effect::SendInvoice(invoice));
    Ok(Outcome::to(ConversationState::AwaitingPayment, effects))
}

/// Reason to refuse the payment, if any.
fn decline_reason(
    turn: &Turn,
    ctx: &ConversationContext,
    payload: &str,
    currency: &str,
    total_amount: i64,
) -> Result<Option<String>, BotError> {
    if ctx.user_data.invoice_payload.as_deref() != Some(payload) {
        return Ok(Some(
            "This invoice is no longer valid. Please open your cart and pay again.".to_string(),
        ));
    }
    if currency != turn.settings.currency || total_amount != ctx.cart.total() {
        return Ok(Some(
            "Your cart has changed since the invoice was issued. Please pay again.".to_string(),
        ));
    }

    let db = turn.db()?;
    for item in &ctx.cart {
        let free = queries::get_product(&db, &item.product_id)?
            .is_some_and(|p| p.is_active && p.is_free);
        if !free {
            return Ok(Some(format!(
                "Sorry, {} has just been reserved by someone else.",
                item.name
            )));
        }
    }
    Ok(None)
}

pub fn pre_checkout(
    turn: &Turn,
    ctx: &mut ConversationContext,
    event: &Event,
) -> Result<Outcome, BotError> {
    let Event::PreCheckoutQuery {
        id,
        payload,
        currency,
        total_amount,
    } = event
    else {
        return Err(BotError::Validation("Unexpected payment update.".to_string()));
    };

    let reason = decline_reason(turn, ctx, payload, currency, *total_amount)?;
    if let Some(reason) = &reason {
        tracing::warn!(user = %ctx.external_user_id, reason = %reason, "declining pre-checkout");
    }

    Ok(Outcome::to(
        ConversationState::AwaitingPayment,
        vec![Effect::AnswerPreCheckout {
            query_id: id.clone(),
            ok: reason.is_none(),
            error_message: reason,
        }],
    ))
}

/// Persist the purchases and hold every product in one transaction.
fn finalize(
    conn: &mut Connection,
    user_id: &str,
    cart: &Cart,
    now: NaiveDateTime,
    hold: Duration,
) -> Result<Vec<Purchase>, BotError> {
    let purchases: Vec<Purchase> = cart
        .iter()
        .map(|item| Purchase {
            id: Uuid::new_v4().to_string(),
            user_id: user_id.to_string(),
            product_id: item.product_id.clone(),
            product_name: item.name.clone(),
            quantity: item.quantity,
            amount: item.total_price(),
            is_completed: false,
            created_at: now,
        })
        .collect();

    let expiry = now
        .checked_add_signed(hold)
        .ok_or_else(|| anyhow::anyhow!("hold of {hold} overflows the clock"))?;

    let tx = conn.transaction()?;
    queries::create_purchases(&tx, &purchases)?;

    for item in cart {
        if !queries::reserve_product(&tx, &item.product_id, user_id, &expiry)? {
            return Err(BotError::Conflict(format!(
                "Sorry, {} has just been reserved by someone else.",
                item.name
            )));
        }
    }
    tx.commit()?;
    Ok(purchases)
}

pub fn successful_payment(
    turn: &Turn,
    ctx: &mut ConversationContext,
    event: &Event,
) -> Result<Outcome, BotError> {
    let Event::SuccessfulPayment { payload, .. } = event else {
        return Err(BotError::Validation("Unexpected payment update.".to_string()));
    };
    if ctx.user_data.invoice_payload.as_deref() != Some(payload.as_str()) {
        return Err(BotError::Conflict(
            "This payment does not match your last invoice.".to_string(),
        ));
    }

    let purchases = {
        let mut db = turn.db()?;
        let user = queries::get_or_create_user(&db, turn.sender)?;
        finalize(&mut db, &user.id, &ctx.cart, turn.now, turn.settings.hold)?
    };

    ctx.cart.clear();
    ctx.user_data.invoice_payload = None;

    let mut effects = vec![Effect::text(format!(
        "Payment received, thank you!\nYour places are held for {} minutes. \
         Press \"I've parked\" once you are in place.",
        turn.settings.hold.num_minutes()
    ))];
    for purchase in &purchases {
        effects.push(Effect::text_with(
            format!(
                "<b>{}</b> for {}",
                escape_html(&purchase.product_name),
                hours_label(purchase.quantity)
            ),
            Keyboard::Inline(vec![vec![Button::new(
                "I've parked",
                format!("took:{}", purchase.id),
            )]]),
        ));
    }
    Ok(Outcome::to(ConversationState::AwaitingOccupancy, effects))
}

pub fn took_place(
    turn: &Turn,
    _ctx: &mut ConversationContext,
    event: &Event,
) -> Result<Outcome, BotError> {
    let purchase_id = callback_arg(event, "took:")?;

    let (purchase, departure) = {
        let mut db = turn.db()?;
        let user = queries::get_or_create_user(&db, turn.sender)?;
        let purchase = queries::get_purchase(&db, purchase_id)?
            .filter(|p| p.user_id == user.id)
            .ok_or_else(|| BotError::NotFound(format!("purchase {purchase_id}")))?;
        if purchase.is_completed {
            return Err(BotError::Conflict(
                "You have already confirmed this place.".to_string(),
            ));
        }

        let departure = turn
            .now
            .checked_add_signed(Duration::hours(i64::from(purchase.quantity)));
        let expiry = departure.and_then(|d| d.checked_add_signed(turn.settings.grace));
        let (Some(departure), Some(expiry)) = (departure, expiry) else {
            return Err(BotError::Conflict(
                "This reservation cannot be confirmed. Please contact support.".to_string(),
            ));
        };

        let tx = db.transaction()?;
        if !queries::complete_purchase(&tx, &purchase.id)? {
            return Err(BotError::Conflict(
                "You have already confirmed this place.".to_string(),
            ));
        }
        if !queries::occupy_product(&tx, &purchase.product_id, &user.id, &turn.now, &expiry)? {
            return Err(BotError::Conflict(
                "Your reservation has expired. Please book the place again.".to_string(),
            ));
        }
        tx.commit()?;
        (purchase, departure)
    };

    let departure = departure.format(DEPARTURE_FORMAT);
    let mut effects: Vec<Effect> = Effect::ack(event, None).into_iter().collect();
    effects.push(Effect::replace(
        event,
        format!(
            "Place taken ✅\n<b>{}</b>\nDeparture time: {departure}",
            escape_html(&purchase.product_name)
        ),
        Keyboard::Inline(vec![vec![Button::back()]]),
    ));
    Ok(Outcome::to(ConversationState::MainMenu, effects))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Product;

    fn product(id: &str, price: i64) -> Product {
        Product {
            id: id.to_string(),
            category_id: "c".to_string(),
            name: format!("Place {id}"),
            description: String::new(),
            price,
            image_url: None,
            is_active: true,
            is_free: true,
            is_took_place: false,
            lessor_id: None,
            expiration_date: None,
        }
    }

    #[test]
    fn test_invoice_lines_match_cart() {
        let mut cart = Cart::default();
        cart.add(&product("a", 50000), 2);
        cart.add(&product("b", 30000), 1);

        let invoice = build_invoice(&cart, "p".to_string(), "KZT");
        let total: i64 = invoice.prices.iter().map(|p| p.amount).sum();
        assert_eq!(total, cart.total());
        assert_eq!(invoice.prices.len(), 2);
        assert_eq!(invoice.payload, "p");
        assert!(invoice.description.contains("Place a: 2 hours"));
    }
}
