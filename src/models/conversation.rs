use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use super::Cart;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ConversationState {
    Idle,
    AwaitingCarNumber,
    AwaitingCarSerial,
    AwaitingCarRegion,
    AwaitingPhone,
    MainMenu,
    Categories,
    Products,
    AwaitingQuantity,
    ShowingCart,
    AwaitingPayment,
    AwaitingOccupancy,
}

impl ConversationState {
    pub const ALL: [ConversationState; 12] = [
        ConversationState::Idle,
        ConversationState::AwaitingCarNumber,
        ConversationState::AwaitingCarSerial,
        ConversationState::AwaitingCarRegion,
        ConversationState::AwaitingPhone,
        ConversationState::MainMenu,
        ConversationState::Categories,
        ConversationState::Products,
        ConversationState::AwaitingQuantity,
        ConversationState::ShowingCart,
        ConversationState::AwaitingPayment,
        ConversationState::AwaitingOccupancy,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ConversationState::Idle => "idle",
            ConversationState::AwaitingCarNumber => "awaiting_car_number",
            ConversationState::AwaitingCarSerial => "awaiting_car_serial",
            ConversationState::AwaitingCarRegion => "awaiting_car_region",
            ConversationState::AwaitingPhone => "awaiting_phone",
            ConversationState::MainMenu => "main_menu",
            ConversationState::Categories => "categories",
            ConversationState::Products => "products",
            ConversationState::AwaitingQuantity => "awaiting_quantity",
            ConversationState::ShowingCart => "showing_cart",
            ConversationState::AwaitingPayment => "awaiting_payment",
            ConversationState::AwaitingOccupancy => "awaiting_occupancy",
        }
    }

    pub fn parse(s: &str) -> Self {
        Self::ALL
            .into_iter()
            .find(|state| state.as_str() == s)
            .unwrap_or(ConversationState::Idle)
    }
}

/// Values carried between dialogue steps.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserData {
    /// 1-based page of the category listing.
    pub current_page: Option<u32>,
    pub product_id: Option<String>,
    pub quantity: Option<u32>,
    /// Payload of the last invoice sent to this user.
    pub invoice_payload: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationContext {
    pub external_user_id: String,
    pub chat_id: i64,
    pub state: ConversationState,
    pub user_data: UserData,
    pub cart: Cart,
    pub updated_at: NaiveDateTime,
}

impl ConversationContext {
    pub fn new(external_user_id: &str, chat_id: i64, now: NaiveDateTime) -> Self {
        Self {
            external_user_id: external_user_id.to_string(),
            chat_id,
            state: ConversationState::Idle,
            user_data: UserData::default(),
            cart: Cart::default(),
            updated_at: now,
        }
    }

    /// Terminate the dialogue: clear scratch data, keep the cart.
    pub fn end(&mut self) {
        self.user_data = UserData::default();
        self.state = ConversationState::Idle;
    }
}
