use sqlx::SqlitePool;

use crate::db::models::UserContact;
use crate::error::{AppError, AppResult};

// ============================================================================
// User Repository
// ============================================================================

pub struct UserRepository;

impl UserRepository {
    pub async fn find_contact(pool: &SqlitePool, id: &str) -> AppResult<Option<UserContact>> {
        sqlx::query_as::<_, UserContact>("SELECT id, email, full_name FROM users WHERE id = ?")
            .bind(id)
            .fetch_optional(pool)
            .await
            .map_err(AppError::Database)
    }

    #[cfg(test)]
    pub async fn insert(pool: &SqlitePool, contact: &UserContact) -> AppResult<()> {
        sqlx::query("INSERT INTO users (id, email, full_name) VALUES (?, ?, ?)")
            .bind(&contact.id)
            .bind(&contact.email)
            .bind(&contact.full_name)
            .execute(pool)
            .await
            .map_err(AppError::Database)?;
        Ok(())
    }
}
