use chrono::NaiveDateTime;
use sqlx::{Row, SqliteConnection, SqlitePool};
use uuid::Uuid;

use crate::db::models::{CreateOrder, Order, OrderRow};
use crate::error::{AppError, AppResult};

// ============================================================================
// Order Repository
// ============================================================================

pub struct OrderRepository;

impl OrderRepository {
    /// Insert the order row and one `order_properties` row per paid listing.
    ///
    /// Runs on the caller's connection so it can share the activation transaction.
    pub async fn create(
        conn: &mut SqliteConnection,
        order: CreateOrder,
        now: NaiveDateTime,
    ) -> AppResult<Order> {
        let id = Uuid::new_v4().to_string();

        let row = sqlx::query_as::<_, OrderRow>(
            r#"
            INSERT INTO orders (
                id, user_id, price_paid, payment_reference,
                tier_name, tier_duration_in_days, expiry_date, created_at
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            RETURNING
                id, user_id, price_paid, payment_reference,
                tier_name, tier_duration_in_days, expiry_date, created_at
            "#,
        )
        .bind(&id)
        .bind(&order.user_id)
        .bind(order.price_paid)
        .bind(&order.payment_reference)
        .bind(&order.tier_name)
        .bind(order.tier_duration_in_days)
        .bind(order.expiry_date)
        .bind(now)
        .fetch_one(&mut *conn)
        .await
        .map_err(AppError::Database)?;

        for property_id in &order.property_ids {
            sqlx::query("INSERT INTO order_properties (order_id, property_id) VALUES (?, ?)")
                .bind(&id)
                .bind(property_id)
                .execute(&mut *conn)
                .await
                .map_err(AppError::Database)?;
        }

        Ok(Order::from_row(row, order.property_ids))
    }

    pub async fn reference_exists(pool: &SqlitePool, payment_reference: &str) -> AppResult<bool> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM orders WHERE payment_reference = ?")
                .bind(payment_reference)
                .fetch_one(pool)
                .await
                .map_err(AppError::Database)?;

        Ok(count > 0)
    }

    /// Orders placed by a user, newest first.
    pub async fn find_by_user_id(
        pool: &SqlitePool,
        user_id: &str,
        limit: i64,
        offset: i64,
    ) -> AppResult<Vec<Order>> {
        let rows = sqlx::query_as::<_, OrderRow>(
            r#"
            SELECT
                id, user_id, price_paid, payment_reference,
                tier_name, tier_duration_in_days, expiry_date, created_at
            FROM orders
            WHERE user_id = ?
            ORDER BY created_at DESC
            LIMIT ?
            OFFSET ?
            "#,
        )
        .bind(user_id)
        .bind(limit)
        .bind(offset)
        .fetch_all(pool)
        .await
        .map_err(AppError::Database)?;

        let mut orders = Vec::with_capacity(rows.len());
        for row in rows {
            let property_ids = Self::property_ids(pool, &row.id).await?;
            orders.push(Order::from_row(row, property_ids));
        }

        Ok(orders)
    }

    pub async fn count_by_user_id(pool: &SqlitePool, user_id: &str) -> AppResult<i64> {
        sqlx::query_scalar("SELECT COUNT(*) FROM orders WHERE user_id = ?")
            .bind(user_id)
            .fetch_one(pool)
            .await
            .map_err(AppError::Database)
    }

    async fn property_ids(pool: &SqlitePool, order_id: &str) -> AppResult<Vec<String>> {
        let rows = sqlx::query(
            "SELECT property_id FROM order_properties WHERE order_id = ? ORDER BY property_id",
        )
        .bind(order_id)
        .fetch_all(pool)
        .await
        .map_err(AppError::Database)?;

        Ok(rows.into_iter().map(|r| r.get("property_id")).collect())
    }

    #[cfg(test)]
    pub async fn count_all(pool: &SqlitePool) -> AppResult<i64> {
        sqlx::query_scalar("SELECT COUNT(*) FROM orders")
            .fetch_one(pool)
            .await
            .map_err(AppError::Database)
    }
}
