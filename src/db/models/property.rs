use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// A property listing. `is_active` is the published flag; `expiry_date` is set
/// when a paid order activates the listing and mirrors that order's expiry.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Property {
    pub id: String,
    pub owner_id: String,
    pub title: String,
    pub price: i64,
    pub currency: String,
    pub is_active: bool,
    pub expiry_date: Option<NaiveDateTime>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}
