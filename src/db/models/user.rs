use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Contact details needed to address lifecycle emails.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct UserContact {
    pub id: String,
    pub email: String,
    pub full_name: String,
}
