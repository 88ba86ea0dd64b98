use std::sync::Arc;

use axum::{
    extract::State,
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use serde::Deserialize;

use crate::error::AppResult;
use crate::routes::auth::AuthUser;
use crate::services::checkout::quote_for_user;
use crate::services::pricing::{PricingCatalog, Quote, Tier, TierInfo};
use crate::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/tiers", get(list_tiers))
        .route("/quote", post(quote))
}

#[derive(Debug, Deserialize)]
pub struct QuoteRequest {
    pub property_count: u32,
    pub tier: String,
    pub discount_code: Option<String>,
}

/// Tier catalogue with per-bucket prices. Informational, no auth required.
async fn list_tiers() -> Json<Vec<TierInfo>> {
    Json(PricingCatalog::tiers())
}

async fn quote(
    State(state): State<Arc<AppState>>,
    AuthUser(user_id): AuthUser,
    Json(request): Json<QuoteRequest>,
) -> AppResult<Json<Quote>> {
    let tier: Tier = request.tier.parse()?;
    let quote = quote_for_user(
        &state.db,
        &user_id,
        request.property_count,
        tier,
        request.discount_code.as_deref(),
        Utc::now().naive_utc(),
    )
    .await?;

    Ok(Json(quote))
}
