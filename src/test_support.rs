//! Fixtures shared by the in-crate test modules.

use std::sync::Arc;

use chrono::{Duration, NaiveDateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::config::Config;
use crate::routes::auth::Claims;
use crate::services::checkout::CheckoutService;
use crate::services::payments::{PaymentGateway, PaymentVerifier};
use crate::AppState;

use crate::db::{Discount, DiscountRepository, Property, PropertyRepository, UserContact, UserRepository};

/// Fresh in-memory database with migrations applied.
///
/// A single connection that never idles out, otherwise SQLite would hand each
/// pooled connection its own empty database.
pub async fn pool() -> SqlitePool {
    let options: SqliteConnectOptions = "sqlite::memory:".parse().expect("sqlite options");
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect_with(options)
        .await
        .expect("in-memory sqlite");
    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .expect("migrations");
    pool
}

pub fn now() -> NaiveDateTime {
    Utc::now().naive_utc()
}

pub async fn seed_user(pool: &SqlitePool, id: &str) -> UserContact {
    let contact = UserContact {
        id: id.to_string(),
        email: format!("{}@example.com", id),
        full_name: format!("User {}", id),
    };
    UserRepository::insert(pool, &contact).await.unwrap();
    contact
}

pub async fn seed_property(
    pool: &SqlitePool,
    owner_id: &str,
    is_active: bool,
    expiry_date: Option<NaiveDateTime>,
) -> Property {
    let created = now() - Duration::days(90);
    let property = Property {
        id: Uuid::new_v4().to_string(),
        owner_id: owner_id.to_string(),
        title: "Two bedroom flat, Lekki".to_string(),
        price: 2_500_000,
        currency: "NGN".to_string(),
        is_active,
        expiry_date,
        created_at: created,
        updated_at: created,
    };
    PropertyRepository::insert(pool, &property).await.unwrap();
    property
}

pub async fn seed_discount(
    pool: &SqlitePool,
    code: &str,
    percentage: f64,
    start_date: NaiveDateTime,
    expiration_date: NaiveDateTime,
) -> Discount {
    let discount = Discount {
        id: Uuid::new_v4().to_string(),
        code: code.to_string(),
        percentage,
        start_date,
        expiration_date,
        created_at: start_date,
    };
    DiscountRepository::insert(pool, &discount).await.unwrap();
    discount
}

pub const JWT_SECRET: &str = "test-jwt-secret";

/// HS256 bearer token for `user_id`, valid for an hour.
pub fn token_for(user_id: &str) -> String {
    let claims = Claims {
        sub: user_id.to_string(),
        exp: (Utc::now() + Duration::hours(1)).timestamp() as usize,
    };
    jsonwebtoken::encode(
        &jsonwebtoken::Header::default(),
        &claims,
        &jsonwebtoken::EncodingKey::from_secret(JWT_SECRET.as_bytes()),
    )
    .expect("encode jwt")
}

/// Application state around `pool` with the given gateway behind checkout.
pub fn app_state(pool: SqlitePool, gateway: Arc<dyn PaymentGateway>) -> Arc<AppState> {
    let mut config = Config::default();
    config.jwt.secret = JWT_SECRET.to_string();
    Arc::new(AppState {
        checkout: CheckoutService::new(pool.clone(), PaymentVerifier::new(gateway)),
        db: pool,
        config,
    })
}
