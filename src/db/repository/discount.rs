use chrono::NaiveDateTime;
use sqlx::SqlitePool;

use crate::db::models::{Discount, DiscountGrant};
use crate::error::{AppError, AppResult};

// ============================================================================
// Discount Repository
// ============================================================================

pub struct DiscountRepository;

impl DiscountRepository {
    pub async fn find_by_code(pool: &SqlitePool, code: &str) -> AppResult<Option<Discount>> {
        sqlx::query_as::<_, Discount>(
            r#"
            SELECT id, code, percentage, start_date, expiration_date, created_at
            FROM discounts
            WHERE code = ?
            "#,
        )
        .bind(code)
        .fetch_optional(pool)
        .await
        .map_err(AppError::Database)
    }

    /// Grant a discount to a user. Re-granting is a no-op; returns whether a new
    /// grant row was written.
    pub async fn grant(
        pool: &SqlitePool,
        discount_id: &str,
        user_id: &str,
        now: NaiveDateTime,
    ) -> AppResult<bool> {
        let result = sqlx::query(
            r#"
            INSERT INTO discount_grants (discount_id, user_id, granted_at)
            VALUES (?, ?, ?)
            ON CONFLICT (discount_id, user_id) DO NOTHING
            "#,
        )
        .bind(discount_id)
        .bind(user_id)
        .bind(now)
        .execute(pool)
        .await
        .map_err(AppError::Database)?;

        Ok(result.rows_affected() == 1)
    }

    /// Every discount granted to the user, most recently granted first.
    pub async fn list_grants_for_user(
        pool: &SqlitePool,
        user_id: &str,
    ) -> AppResult<Vec<DiscountGrant>> {
        sqlx::query_as::<_, DiscountGrant>(
            r#"
            SELECT
                d.id, d.code, d.percentage, d.start_date, d.expiration_date, d.created_at,
                g.granted_at
            FROM discount_grants g
            JOIN discounts d ON d.id = g.discount_id
            WHERE g.user_id = ?
            ORDER BY g.granted_at DESC, d.code ASC
            "#,
        )
        .bind(user_id)
        .fetch_all(pool)
        .await
        .map_err(AppError::Database)
    }

    pub async fn find_grant_by_code(
        pool: &SqlitePool,
        user_id: &str,
        code: &str,
    ) -> AppResult<Option<DiscountGrant>> {
        sqlx::query_as::<_, DiscountGrant>(
            r#"
            SELECT
                d.id, d.code, d.percentage, d.start_date, d.expiration_date, d.created_at,
                g.granted_at
            FROM discount_grants g
            JOIN discounts d ON d.id = g.discount_id
            WHERE g.user_id = ? AND d.code = ?
            "#,
        )
        .bind(user_id)
        .bind(code)
        .fetch_optional(pool)
        .await
        .map_err(AppError::Database)
    }

    /// Discounts are provisioned by admin tooling outside this service.
    #[cfg(test)]
    pub async fn insert(pool: &SqlitePool, discount: &Discount) -> AppResult<()> {
        sqlx::query(
            r#"
            INSERT INTO discounts (id, code, percentage, start_date, expiration_date, created_at)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&discount.id)
        .bind(&discount.code)
        .bind(discount.percentage)
        .bind(discount.start_date)
        .bind(discount.expiration_date)
        .bind(discount.created_at)
        .execute(pool)
        .await
        .map_err(AppError::Database)?;

        Ok(())
    }
}
