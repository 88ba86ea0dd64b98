use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

pub const STATUS_UNREAD: &str = "UNREAD";
pub const STATUS_READ: &str = "READ";

/// In-app alert shown on the owner's dashboard.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Notification {
    pub id: String,
    pub user_id: String,
    pub property_id: String,
    pub body: String,
    pub notification_type: String,
    pub status: String,
    pub created_at: NaiveDateTime,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateNotification {
    pub user_id: String,
    pub property_id: String,
    pub body: String,
    pub notification_type: String,
}
