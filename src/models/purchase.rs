use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Purchase {
    pub id: String,
    pub user_id: String,
    pub product_id: String,
    pub product_name: String,
    /// Hours bought.
    pub quantity: u32,
    /// Line amount in minor currency units.
    pub amount: i64,
    pub is_completed: bool,
    pub created_at: NaiveDateTime,
}
