use std::sync::Arc;

use axum::{
    extract::{Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::db::{Order, OrderRepository};
use crate::error::AppResult;
use crate::routes::auth::AuthUser;
use crate::services::checkout::{CheckoutReceipt, CheckoutRequest};
use crate::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/checkout", post(checkout))
        .route("/orders", get(list_orders))
}

#[derive(Debug, Deserialize)]
pub struct ListOrdersQuery {
    pub page: Option<i64>,
    pub per_page: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct OrdersListResponse {
    pub items: Vec<Order>,
    pub total: i64,
    pub page: i64,
    pub per_page: i64,
    pub total_pages: i64,
}

/// Verify a payment and publish the selected listings
async fn checkout(
    State(state): State<Arc<AppState>>,
    AuthUser(user_id): AuthUser,
    Json(request): Json<CheckoutRequest>,
) -> AppResult<(StatusCode, Json<CheckoutReceipt>)> {
    let receipt = state
        .checkout
        .complete(&user_id, request, Utc::now().naive_utc())
        .await?;

    Ok((StatusCode::CREATED, Json(receipt)))
}

/// Order history for the current user, newest first
async fn list_orders(
    State(state): State<Arc<AppState>>,
    AuthUser(user_id): AuthUser,
    Query(query): Query<ListOrdersQuery>,
) -> AppResult<Json<OrdersListResponse>> {
    let page = query.page.unwrap_or(1).max(1);
    let per_page = query.per_page.unwrap_or(20).clamp(1, 100);
    let offset = (page - 1) * per_page;

    let items = OrderRepository::find_by_user_id(&state.db, &user_id, per_page, offset).await?;
    let total = OrderRepository::count_by_user_id(&state.db, &user_id).await?;
    let total_pages = (total as f64 / per_page as f64).ceil() as i64;

    Ok(Json(OrdersListResponse {
        items,
        total,
        page,
        per_page,
        total_pages,
    }))
}
