use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};

use crate::db::{Notification, NotificationRepository, STATUS_READ, STATUS_UNREAD};
use crate::error::{AppError, AppResult};
use crate::routes::auth::AuthUser;
use crate::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", get(list_notifications))
        .route("/unread-count", get(unread_count))
        .route("/:id/read", post(mark_read))
}

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct ListNotificationsQuery {
    pub page: Option<i64>,
    pub per_page: Option<i64>,
    pub status: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct NotificationsListResponse {
    pub items: Vec<Notification>,
    pub total: i64,
    pub page: i64,
    pub per_page: i64,
    pub total_pages: i64,
}

#[derive(Debug, Serialize)]
pub struct UnreadCountResponse {
    pub unread: i64,
}

// ============================================================================
// Handlers
// ============================================================================

/// List in-app notifications for the current user
async fn list_notifications(
    State(state): State<Arc<AppState>>,
    AuthUser(user_id): AuthUser,
    Query(query): Query<ListNotificationsQuery>,
) -> AppResult<Json<NotificationsListResponse>> {
    let page = query.page.unwrap_or(1).max(1);
    let per_page = query.per_page.unwrap_or(20).clamp(1, 100);
    let offset = (page - 1) * per_page;

    let status = match query.status.as_deref().map(str::to_ascii_uppercase) {
        None => None,
        Some(s) if s == STATUS_READ => Some(STATUS_READ),
        Some(s) if s == STATUS_UNREAD => Some(STATUS_UNREAD),
        Some(other) => {
            return Err(AppError::Validation(format!(
                "unknown notification status: {}",
                other
            )))
        }
    };

    let items =
        NotificationRepository::find_by_user_id(&state.db, &user_id, status, per_page, offset)
            .await?;
    let total = NotificationRepository::count_by_user_id(&state.db, &user_id, status).await?;
    let total_pages = (total as f64 / per_page as f64).ceil() as i64;

    Ok(Json(NotificationsListResponse {
        items,
        total,
        page,
        per_page,
        total_pages,
    }))
}

async fn unread_count(
    State(state): State<Arc<AppState>>,
    AuthUser(user_id): AuthUser,
) -> AppResult<Json<UnreadCountResponse>> {
    let unread =
        NotificationRepository::count_by_user_id(&state.db, &user_id, Some(STATUS_UNREAD)).await?;
    Ok(Json(UnreadCountResponse { unread }))
}

async fn mark_read(
    State(state): State<Arc<AppState>>,
    AuthUser(user_id): AuthUser,
    Path(id): Path<String>,
) -> AppResult<Json<Notification>> {
    let notification = NotificationRepository::mark_read(&state.db, &id, &user_id)
        .await?
        .ok_or_else(|| AppError::NotFound("Notification not found".to_string()))?;
    Ok(Json(notification))
}
