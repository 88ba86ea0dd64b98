use chrono::NaiveDateTime;
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::db::models::{EmailLogEntry, EmailType};
use crate::error::{AppError, AppResult};

// ============================================================================
// Email Log Repository (dedup ledger)
// ============================================================================

pub struct EmailLogRepository;

impl EmailLogRepository {
    /// Latest ledger entry for the dedup key sent at or after `since`.
    pub async fn find_since(
        pool: &SqlitePool,
        property_id: &str,
        user_id: &str,
        email_type: EmailType,
        since: NaiveDateTime,
    ) -> AppResult<Option<EmailLogEntry>> {
        sqlx::query_as::<_, EmailLogEntry>(
            r#"
            SELECT id, property_id, user_id, email_type, sent_at
            FROM email_logs
            WHERE property_id = ?
              AND user_id = ?
              AND email_type = ?
              AND sent_at >= ?
            ORDER BY sent_at DESC
            LIMIT 1
            "#,
        )
        .bind(property_id)
        .bind(user_id)
        .bind(email_type.to_string())
        .bind(since)
        .fetch_optional(pool)
        .await
        .map_err(AppError::Database)
    }

    /// Append a ledger entry unless one with the same key exists since `since`.
    ///
    /// The existence check and the insert are a single statement, so retried
    /// writes never produce two entries inside one window. Returns whether a row
    /// was written.
    pub async fn record(
        pool: &SqlitePool,
        property_id: &str,
        user_id: &str,
        email_type: EmailType,
        sent_at: NaiveDateTime,
        since: NaiveDateTime,
    ) -> AppResult<bool> {
        let id = Uuid::new_v4().to_string();
        let email_type = email_type.to_string();

        let result = sqlx::query(
            r#"
            INSERT INTO email_logs (id, property_id, user_id, email_type, sent_at)
            SELECT ?, ?, ?, ?, ?
            WHERE NOT EXISTS (
                SELECT 1 FROM email_logs
                WHERE property_id = ?
                  AND user_id = ?
                  AND email_type = ?
                  AND sent_at >= ?
            )
            "#,
        )
        .bind(id)
        .bind(property_id)
        .bind(user_id)
        .bind(&email_type)
        .bind(sent_at)
        .bind(property_id)
        .bind(user_id)
        .bind(&email_type)
        .bind(since)
        .execute(pool)
        .await
        .map_err(AppError::Database)?;

        Ok(result.rows_affected() == 1)
    }

    #[cfg(test)]
    pub async fn find_by_property(
        pool: &SqlitePool,
        property_id: &str,
    ) -> AppResult<Vec<EmailLogEntry>> {
        sqlx::query_as::<_, EmailLogEntry>(
            r#"
            SELECT id, property_id, user_id, email_type, sent_at
            FROM email_logs
            WHERE property_id = ?
            ORDER BY sent_at ASC
            "#,
        )
        .bind(property_id)
        .fetch_all(pool)
        .await
        .map_err(AppError::Database)
    }
}
