//! Finite-state dialogue engine.
//!
//! Each conversation state owns an ordered list of routes. An event is
//! matched against the routes of the current state and then against the
//! global fallbacks; the first matching route's handler runs and returns the
//! next state plus the effects to deliver.

mod catalog;
mod checkout;
pub mod effect;
pub mod event;
mod registration;

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use chrono::{Duration, NaiveDateTime};
use regex::Regex;
use rusqlite::Connection;

use crate::config::AppConfig;
use crate::db;
use crate::errors::BotError;
use crate::models::{ConversationContext, ConversationState, Sender};

pub use effect::Effect;
pub use event::{Event, Inbound};

const UUID: &str = "[0-9a-fA-F]{8}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{12}";

#[derive(Debug, Clone)]
pub struct Settings {
    pub page_size: u32,
    /// How long a paid place stays held before the driver confirms arrival.
    pub hold: Duration,
    /// Added after the paid hours once the driver has arrived.
    pub grace: Duration,
    pub currency: String,
    pub support_text: String,
}

impl From<&AppConfig> for Settings {
    fn from(config: &AppConfig) -> Self {
        Self {
            page_size: config.page_size,
            hold: Duration::minutes(config.hold_minutes),
            grace: Duration::minutes(config.grace_minutes),
            currency: config.currency.clone(),
            support_text: config.support_text.clone(),
        }
    }
}

/// Everything a handler may use besides the conversation itself.
pub struct Turn<'a> {
    pub db: &'a Mutex<Connection>,
    pub settings: &'a Settings,
    pub sender: &'a Sender,
    pub now: NaiveDateTime,
}

impl Turn<'_> {
    pub fn db(&self) -> Result<MutexGuard<'_, Connection>, BotError> {
        Ok(db::lock(self.db)?)
    }
}

/// Result of a successful handler run.
#[derive(Debug)]
pub struct Outcome {
    pub state: ConversationState,
    pub effects: Vec<Effect>,
}

impl Outcome {
    pub fn to(state: ConversationState, effects: Vec<Effect>) -> Self {
        Self { state, effects }
    }
}

pub type Handler =
    fn(&Turn<'_>, &mut ConversationContext, &Event) -> Result<Outcome, BotError>;

pub enum Pattern {
    Command(&'static str),
    Callback(Regex),
    Text,
    Contact,
    PreCheckout,
    SuccessfulPayment,
}

impl Pattern {
    fn callback(pattern: &str) -> Result<Self, regex::Error> {
        Ok(Pattern::Callback(Regex::new(&format!("^(?:{pattern})$"))?))
    }

    pub fn matches(&self, event: &Event) -> bool {
        match (self, event) {
            (Pattern::Command(name), Event::Command(cmd)) => cmd == name,
            (Pattern::Callback(re), Event::CallbackQuery { data, .. }) => re.is_match(data),
            (Pattern::Text, Event::TextMessage(_)) => true,
            (Pattern::Contact, Event::ContactShared { .. }) => true,
            (Pattern::PreCheckout, Event::PreCheckoutQuery { .. }) => true,
            (Pattern::SuccessfulPayment, Event::SuccessfulPayment { .. }) => true,
            _ => false,
        }
    }
}

pub struct Route {
    pub name: &'static str,
    pub pattern: Pattern,
    pub handler: Handler,
}

fn route(name: &'static str, pattern: Pattern, handler: Handler) -> Route {
    Route {
        name,
        pattern,
        handler,
    }
}

fn callback(name: &'static str, pattern: &str, handler: Handler) -> Result<Route, regex::Error> {
    Ok(route(name, Pattern::callback(pattern)?, handler))
}

fn state_routes() -> Result<Vec<(ConversationState, Vec<Route>)>, regex::Error> {
    use ConversationState as S;

    let took = format!("took:{UUID}");
    let remove = format!("remove:{UUID}");

    Ok(vec![
        (S::Idle, vec![]),
        (
            S::AwaitingCarNumber,
            vec![route("car_number", Pattern::Text, registration::car_number)],
        ),
        (
            S::AwaitingCarSerial,
            vec![route("car_serial", Pattern::Text, registration::car_serial)],
        ),
        (
            S::AwaitingCarRegion,
            vec![route("car_region", Pattern::Text, registration::car_region)],
        ),
        (
            S::AwaitingPhone,
            vec![route("phone", Pattern::Contact, registration::phone)],
        ),
        (
            S::MainMenu,
            vec![
                callback("catalog", "catalog", catalog::show_first_page)?,
                callback("cart", "cart", catalog::show_cart)?,
                callback("purchases", "purchases", catalog::show_purchases)?,
                callback("faq", "faq", catalog::show_faq)?,
                callback("support", "support", catalog::show_support)?,
                callback("took_place", &took, checkout::took_place)?,
                callback("main_menu", "back|main_menu", catalog::show_main_menu)?,
            ],
        ),
        (
            S::Categories,
            vec![
                callback("next_page", "next", catalog::next_page)?,
                callback("prev_page", "prev", catalog::prev_page)?,
                callback("main_menu", "main_menu", catalog::show_main_menu)?,
                callback("category", UUID, catalog::show_products)?,
            ],
        ),
        (
            S::Products,
            vec![
                callback("product", UUID, catalog::show_product_detail)?,
                callback("back", "back", catalog::show_current_page)?,
                callback("main_menu", "main_menu", catalog::show_main_menu)?,
            ],
        ),
        (
            S::AwaitingQuantity,
            vec![
                callback("quantity", "[0-9]+", catalog::check_quantity)?,
                route("quantity_text", Pattern::Text, catalog::check_quantity),
                callback("back", "back", catalog::show_current_page)?,
                callback("confirm", "confirm", catalog::add_to_cart)?,
                callback("cart", "cart", catalog::show_cart)?,
            ],
        ),
        (
            S::ShowingCart,
            vec![
                callback("payment", "payment", checkout::request_payment)?,
                callback("remove", &remove, catalog::remove_from_cart)?,
                callback("main_menu", "back|main_menu", catalog::show_main_menu)?,
            ],
        ),
        (
            S::AwaitingPayment,
            vec![
                route("pre_checkout", Pattern::PreCheckout, checkout::pre_checkout),
                route(
                    "successful_payment",
                    Pattern::SuccessfulPayment,
                    checkout::successful_payment,
                ),
            ],
        ),
        (
            S::AwaitingOccupancy,
            vec![
                callback("took_place", &took, checkout::took_place)?,
                callback("main_menu", "back|main_menu", catalog::show_main_menu)?,
            ],
        ),
    ])
}

fn fallback_routes() -> Vec<Route> {
    vec![
        route("cancel", Pattern::Command("cancel"), registration::cancel),
        route("start", Pattern::Command("start"), registration::start),
    ]
}

pub struct ConversationEngine {
    settings: Settings,
    routes: HashMap<ConversationState, Vec<Route>>,
    fallbacks: Vec<Route>,
}

impl ConversationEngine {
    pub fn new(settings: Settings) -> anyhow::Result<Self> {
        Ok(Self {
            settings,
            routes: state_routes()?.into_iter().collect(),
            fallbacks: fallback_routes(),
        })
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// First route of `state` matching `event`, then the first matching fallback.
    pub fn route(&self, state: ConversationState, event: &Event) -> Option<&Route> {
        self.routes
            .get(&state)
            .into_iter()
            .flatten()
            .chain(self.fallbacks.iter())
            .find(|r| r.pattern.matches(event))
    }

    /// Run one event against `ctx`.
    ///
    /// The handler works on a copy of the context that is committed only on
    /// success, so a failed handler never leaves a half-applied conversation.
    pub fn handle(
        &self,
        db: &Mutex<Connection>,
        now: NaiveDateTime,
        ctx: &mut ConversationContext,
        inbound: &Inbound,
    ) -> Vec<Effect> {
        let event = &inbound.event;

        // Unmatched events are dropped without a reply.
        let Some(route) = self.route(ctx.state, event) else {
            tracing::debug!(user = %ctx.external_user_id, state = ctx.state.as_str(), event = event.kind(), "no route");
            return Vec::new();
        };

        let turn = Turn {
            db,
            settings: &self.settings,
            sender: &inbound.sender,
            now,
        };
        let mut draft = ctx.clone();

        match (route.handler)(&turn, &mut draft, event) {
            Ok(outcome) => {
                tracing::info!(
                    user = %ctx.external_user_id,
                    route = route.name,
                    from = ctx.state.as_str(),
                    to = outcome.state.as_str(),
                    "conversation transition"
                );
                draft.state = outcome.state;
                draft.updated_at = now;
                *ctx = draft;
                outcome.effects
            }
            Err(e) => {
                if e.is_transient() {
                    tracing::error!(user = %ctx.external_user_id, route = route.name, error = %e, "handler failed");
                } else {
                    tracing::warn!(user = %ctx.external_user_id, route = route.name, error = %e, "handler declined");
                }
                failure_effects(event, &e)
            }
        }
    }
}

fn failure_effects(event: &Event, err: &BotError) -> Vec<Effect> {
    let message = err.user_message();
    match event {
        Event::CallbackQuery { id, .. } => vec![Effect::AnswerCallback {
            callback_id: id.clone(),
            text: Some(message),
        }],
        Event::PreCheckoutQuery { id, .. } => vec![Effect::AnswerPreCheckout {
            query_id: id.clone(),
            ok: false,
            error_message: Some(message),
        }],
        _ => vec![Effect::text(effect::escape_html(&message))],
    }
}

/// Part of the callback data after `prefix`.
fn callback_arg<'e>(event: &'e Event, prefix: &str) -> Result<&'e str, BotError> {
    event
        .callback_data()
        .and_then(|data| data.strip_prefix(prefix))
        .ok_or_else(|| BotError::Validation("Unexpected button.".to_string()))
}

fn hours_label(hours: u32) -> String {
    if hours == 1 {
        "1 hour".to_string()
    } else {
        format!("{hours} hours")
    }
}
