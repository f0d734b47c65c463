use chrono::{Duration, NaiveDateTime};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Category {
    pub id: String,
    pub name: String,
    pub is_active: bool,
}

/// A reservable parking place.
///
/// `lessor_id` is set exactly when `is_free` is false; `expiration_date` is
/// set only while the place is held.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Product {
    pub id: String,
    pub category_id: String,
    pub name: String,
    pub description: String,
    /// Price per hour in minor currency units.
    pub price: i64,
    pub image_url: Option<String>,
    pub is_active: bool,
    pub is_free: bool,
    pub is_took_place: bool,
    pub lessor_id: Option<String>,
    pub expiration_date: Option<NaiveDateTime>,
}

impl Product {
    /// Time the driver is expected to leave: the expiry without the trailing grace window.
    pub fn departure_time(&self, grace: Duration) -> Option<NaiveDateTime> {
        self.expiration_date.map(|expiry| expiry - grace)
    }
}

/// One page of a listing.
#[derive(Debug, Clone)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub number: u32,
    pub has_previous: bool,
    pub has_next: bool,
}

/// Render an amount in minor units as `major.minor`.
pub fn format_money(amount: i64) -> String {
    let sign = if amount < 0 { "-" } else { "" };
    let abs = amount.unsigned_abs();
    format!("{sign}{}.{:02}", abs / 100, abs % 100)
}
