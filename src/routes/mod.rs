use std::sync::Arc;

use axum::{routing::get, Router};

use crate::AppState;

pub mod auth;
pub mod discounts;
pub mod health;
pub mod notifications;
pub mod payments;
pub mod pricing;

/// Every route except checkout, which `main` nests separately behind its rate limiter.
pub fn api_router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/health", get(health::health_check))
        .nest("/api/pricing", pricing::router())
        .nest("/api/discounts", discounts::router())
        .nest("/api/notifications", notifications::router())
}
