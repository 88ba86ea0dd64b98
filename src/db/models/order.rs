use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Row of the `orders` table. Property ids live in `order_properties`.
#[derive(Debug, Clone, FromRow)]
pub struct OrderRow {
    pub id: String,
    pub user_id: String,
    pub price_paid: i64,
    pub payment_reference: String,
    pub tier_name: String,
    pub tier_duration_in_days: i64,
    pub expiry_date: NaiveDateTime,
    pub created_at: NaiveDateTime,
}

/// An immutable record of one monetization event: which listings a payment covered,
/// what was paid and until when the listings stay live.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    pub id: String,
    pub user_id: String,
    pub property_ids: Vec<String>,
    pub price_paid: i64,
    pub payment_reference: String,
    pub tier_name: String,
    pub tier_duration_in_days: i64,
    pub expiry_date: NaiveDateTime,
    pub created_at: NaiveDateTime,
}

impl Order {
    pub fn from_row(row: OrderRow, property_ids: Vec<String>) -> Self {
        Order {
            id: row.id,
            user_id: row.user_id,
            property_ids,
            price_paid: row.price_paid,
            payment_reference: row.payment_reference,
            tier_name: row.tier_name,
            tier_duration_in_days: row.tier_duration_in_days,
            expiry_date: row.expiry_date,
            created_at: row.created_at,
        }
    }
}

#[derive(Debug, Clone)]
pub struct CreateOrder {
    pub user_id: String,
    pub property_ids: Vec<String>,
    pub price_paid: i64,
    pub payment_reference: String,
    pub tier_name: String,
    pub tier_duration_in_days: i64,
    pub expiry_date: NaiveDateTime,
}
