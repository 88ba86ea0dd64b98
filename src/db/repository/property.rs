use chrono::NaiveDateTime;
use sqlx::{SqliteConnection, SqlitePool};

use crate::db::models::{EmailType, Property};
use crate::error::{AppError, AppResult};

// ============================================================================
// Property Repository
// ============================================================================

pub struct PropertyRepository;

impl PropertyRepository {
    pub async fn find_by_id(pool: &SqlitePool, id: &str) -> AppResult<Option<Property>> {
        sqlx::query_as::<_, Property>(
            r#"
            SELECT
                id, owner_id, title, price, currency, is_active, expiry_date,
                created_at, updated_at
            FROM properties
            WHERE id = ?
            "#,
        )
        .bind(id)
        .fetch_optional(pool)
        .await
        .map_err(AppError::Database)
    }

    /// Active listings whose expiry falls in `[from, until)`.
    pub async fn find_active_expiring_between(
        pool: &SqlitePool,
        from: NaiveDateTime,
        until: NaiveDateTime,
    ) -> AppResult<Vec<Property>> {
        sqlx::query_as::<_, Property>(
            r#"
            SELECT
                id, owner_id, title, price, currency, is_active, expiry_date,
                created_at, updated_at
            FROM properties
            WHERE is_active = 1
              AND expiry_date IS NOT NULL
              AND expiry_date >= ?
              AND expiry_date < ?
            ORDER BY expiry_date ASC
            "#,
        )
        .bind(from)
        .bind(until)
        .fetch_all(pool)
        .await
        .map_err(AppError::Database)
    }

    /// Listings still marked active although their expiry is already in the past.
    pub async fn find_active_expired_before(
        pool: &SqlitePool,
        now: NaiveDateTime,
    ) -> AppResult<Vec<Property>> {
        sqlx::query_as::<_, Property>(
            r#"
            SELECT
                id, owner_id, title, price, currency, is_active, expiry_date,
                created_at, updated_at
            FROM properties
            WHERE is_active = 1
              AND expiry_date IS NOT NULL
              AND expiry_date < ?
            ORDER BY expiry_date ASC
            "#,
        )
        .bind(now)
        .fetch_all(pool)
        .await
        .map_err(AppError::Database)
    }

    /// Deactivated listings carrying a `notification_type` notification with no
    /// `email_type` ledger entry written at or after that notification.
    ///
    /// Covers both listings deactivated in the current pass and those whose
    /// expiration email failed on an earlier one.
    pub async fn find_deactivated_awaiting_email(
        pool: &SqlitePool,
        notification_type: &str,
        email_type: EmailType,
    ) -> AppResult<Vec<Property>> {
        sqlx::query_as::<_, Property>(
            r#"
            SELECT
                p.id, p.owner_id, p.title, p.price, p.currency, p.is_active, p.expiry_date,
                p.created_at, p.updated_at
            FROM properties p
            WHERE p.is_active = 0
              AND EXISTS (
                SELECT 1 FROM notifications n
                WHERE n.property_id = p.id
                  AND n.user_id = p.owner_id
                  AND n.notification_type = ?
                  AND NOT EXISTS (
                    SELECT 1 FROM email_logs e
                    WHERE e.property_id = p.id
                      AND e.user_id = p.owner_id
                      AND e.email_type = ?
                      AND e.sent_at >= n.created_at
                  )
              )
            ORDER BY p.expiry_date ASC
            "#,
        )
        .bind(notification_type)
        .bind(email_type.to_string())
        .fetch_all(pool)
        .await
        .map_err(AppError::Database)
    }

    /// Publish a listing until `expiry_date`. Returns `false` when no such listing exists.
    pub async fn activate(
        conn: &mut SqliteConnection,
        id: &str,
        expiry_date: NaiveDateTime,
        now: NaiveDateTime,
    ) -> AppResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE properties
            SET is_active = 1, expiry_date = ?, updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(expiry_date)
        .bind(now)
        .bind(id)
        .execute(conn)
        .await
        .map_err(AppError::Database)?;

        Ok(result.rows_affected() == 1)
    }

    /// Unpublish a listing that is still active. Returns `true` only for the call
    /// that actually flipped the flag, so concurrent passes cannot both claim it.
    pub async fn deactivate(
        conn: &mut SqliteConnection,
        id: &str,
        now: NaiveDateTime,
    ) -> AppResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE properties
            SET is_active = 0, updated_at = ?
            WHERE id = ? AND is_active = 1
            "#,
        )
        .bind(now)
        .bind(id)
        .execute(conn)
        .await
        .map_err(AppError::Database)?;

        Ok(result.rows_affected() == 1)
    }

    /// Insert a listing. Listing creation belongs to the surrounding app; this
    /// exists for seeding tests.
    #[cfg(test)]
    pub async fn insert(pool: &SqlitePool, property: &Property) -> AppResult<()> {
        sqlx::query(
            r#"
            INSERT INTO properties (
                id, owner_id, title, price, currency, is_active, expiry_date, created_at, updated_at
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&property.id)
        .bind(&property.owner_id)
        .bind(&property.title)
        .bind(property.price)
        .bind(&property.currency)
        .bind(property.is_active)
        .bind(property.expiry_date)
        .bind(property.created_at)
        .bind(property.updated_at)
        .execute(pool)
        .await
        .map_err(AppError::Database)?;

        Ok(())
    }
}
