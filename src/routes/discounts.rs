use std::sync::Arc;

use axum::{
    extract::State,
    routing::{get, post},
    Json, Router,
};
use chrono::{NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::AppResult;
use crate::routes::auth::AuthUser;
use crate::services::discounts::DiscountService;
use crate::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", get(list_grants))
        .route("/apply", post(apply_code))
}

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct ApplyCodeRequest {
    pub code: String,
}

#[derive(Debug, Serialize)]
pub struct ApplyCodeResponse {
    pub code: String,
    pub percentage: f64,
}

#[derive(Debug, Serialize)]
pub struct GrantResponse {
    pub code: String,
    pub percentage: f64,
    pub start_date: NaiveDateTime,
    pub expiration_date: NaiveDateTime,
    pub granted_at: NaiveDateTime,
    /// Whether the code can be used right now.
    pub active: bool,
}

// ============================================================================
// Handlers
// ============================================================================

/// Discounts granted to the current user, most recent first
async fn list_grants(
    State(state): State<Arc<AppState>>,
    AuthUser(user_id): AuthUser,
) -> AppResult<Json<Vec<GrantResponse>>> {
    let now = Utc::now().naive_utc();
    let grants = DiscountService::list_active_grants(&state.db, &user_id).await?;

    Ok(Json(
        grants
            .into_iter()
            .map(|g| GrantResponse {
                active: g.is_active_at(now),
                code: g.code,
                percentage: g.percentage,
                start_date: g.start_date,
                expiration_date: g.expiration_date,
                granted_at: g.granted_at,
            })
            .collect(),
    ))
}

async fn apply_code(
    State(state): State<Arc<AppState>>,
    AuthUser(user_id): AuthUser,
    Json(request): Json<ApplyCodeRequest>,
) -> AppResult<Json<ApplyCodeResponse>> {
    let percentage =
        DiscountService::apply_code(&state.db, &user_id, &request.code, Utc::now().naive_utc())
            .await?;

    Ok(Json(ApplyCodeResponse {
        code: request.code.trim().to_string(),
        percentage,
    }))
}
