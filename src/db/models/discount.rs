use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Discount {
    pub id: String,
    pub code: String,
    /// Percentage off, in (0, 100].
    pub percentage: f64,
    pub start_date: NaiveDateTime,
    pub expiration_date: NaiveDateTime,
    pub created_at: NaiveDateTime,
}

impl Discount {
    /// A discount is usable only inside its inclusive validity window.
    pub fn is_active_at(&self, now: NaiveDateTime) -> bool {
        self.start_date <= now && now <= self.expiration_date
    }
}

/// A discount joined with the moment it was granted to a user.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct DiscountGrant {
    pub id: String,
    pub code: String,
    pub percentage: f64,
    pub start_date: NaiveDateTime,
    pub expiration_date: NaiveDateTime,
    pub created_at: NaiveDateTime,
    pub granted_at: NaiveDateTime,
}

impl DiscountGrant {
    pub fn is_active_at(&self, now: NaiveDateTime) -> bool {
        self.start_date <= now && now <= self.expiration_date
    }
}
