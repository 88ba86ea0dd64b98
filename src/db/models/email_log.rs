use std::fmt;
use std::str::FromStr;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Kind of lifecycle email; doubles as the dedup key component in `email_logs`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EmailType {
    /// Reminder sent when the listing expires in the given number of days.
    Expiring(u32),
    Expired,
}

impl fmt::Display for EmailType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EmailType::Expiring(days) => write!(f, "expiring-{}", days),
            EmailType::Expired => write!(f, "expired"),
        }
    }
}

impl FromStr for EmailType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s == "expired" {
            return Ok(EmailType::Expired);
        }
        s.strip_prefix("expiring-")
            .and_then(|d| d.parse::<u32>().ok())
            .filter(|d| *d > 0)
            .map(EmailType::Expiring)
            .ok_or_else(|| format!("unknown email type: {}", s))
    }
}

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct EmailLogEntry {
    pub id: String,
    pub property_id: String,
    pub user_id: String,
    pub email_type: String,
    pub sent_at: NaiveDateTime,
}
