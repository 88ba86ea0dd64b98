use chrono::NaiveDateTime;
use sqlx::{SqliteConnection, SqlitePool};
use uuid::Uuid;

use crate::db::models::{CreateNotification, Notification, STATUS_READ, STATUS_UNREAD};
use crate::error::{AppError, AppResult};

// ============================================================================
// In-app Notification Repository
// ============================================================================

pub struct NotificationRepository;

impl NotificationRepository {
    pub async fn create(
        conn: &mut SqliteConnection,
        notification: CreateNotification,
        now: NaiveDateTime,
    ) -> AppResult<Notification> {
        let id = Uuid::new_v4().to_string();

        sqlx::query_as::<_, Notification>(
            r#"
            INSERT INTO notifications (
                id, user_id, property_id, body, notification_type, status, created_at
            )
            VALUES (?, ?, ?, ?, ?, ?, ?)
            RETURNING id, user_id, property_id, body, notification_type, status, created_at
            "#,
        )
        .bind(id)
        .bind(notification.user_id)
        .bind(notification.property_id)
        .bind(notification.body)
        .bind(notification.notification_type)
        .bind(STATUS_UNREAD)
        .bind(now)
        .fetch_one(conn)
        .await
        .map_err(AppError::Database)
    }

    /// Find notifications for a user with an optional status filter and pagination.
    pub async fn find_by_user_id(
        pool: &SqlitePool,
        user_id: &str,
        status: Option<&str>,
        limit: i64,
        offset: i64,
    ) -> AppResult<Vec<Notification>> {
        sqlx::query_as::<_, Notification>(
            r#"
            SELECT id, user_id, property_id, body, notification_type, status, created_at
            FROM notifications
            WHERE user_id = ?
            AND (? IS NULL OR status = ?)
            ORDER BY created_at DESC
            LIMIT ?
            OFFSET ?
            "#,
        )
        .bind(user_id)
        .bind(status)
        .bind(status)
        .bind(limit)
        .bind(offset)
        .fetch_all(pool)
        .await
        .map_err(AppError::Database)
    }

    pub async fn count_by_user_id(
        pool: &SqlitePool,
        user_id: &str,
        status: Option<&str>,
    ) -> AppResult<i64> {
        sqlx::query_scalar(
            "SELECT COUNT(*) FROM notifications WHERE user_id = ? AND (? IS NULL OR status = ?)",
        )
        .bind(user_id)
        .bind(status)
        .bind(status)
        .fetch_one(pool)
        .await
        .map_err(AppError::Database)
    }

    /// Mark one of the user's notifications as read. `None` if it does not belong to them.
    pub async fn mark_read(
        pool: &SqlitePool,
        id: &str,
        user_id: &str,
    ) -> AppResult<Option<Notification>> {
        sqlx::query_as::<_, Notification>(
            r#"
            UPDATE notifications
            SET status = ?
            WHERE id = ? AND user_id = ?
            RETURNING id, user_id, property_id, body, notification_type, status, created_at
            "#,
        )
        .bind(STATUS_READ)
        .bind(id)
        .bind(user_id)
        .fetch_optional(pool)
        .await
        .map_err(AppError::Database)
    }
}
