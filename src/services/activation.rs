use chrono::{Duration, NaiveDateTime};
use sqlx::SqlitePool;

use crate::db::{CreateOrder, Order, OrderRepository, PropertyRepository};
use crate::error::{AppError, AppResult};

/// Attempts made before a write conflict is surfaced as `TransactionFailed`.
const MAX_ATTEMPTS: usize = 2;

/// Everything needed to publish a batch of listings under one payment.
#[derive(Debug, Clone)]
pub struct ActivationRequest {
    pub property_ids: Vec<String>,
    /// Verified amount in major units, or 0 for a bypassed free activation.
    pub amount: i64,
    pub user_id: String,
    pub payment_reference: String,
    pub tier_name: String,
    pub tier_duration_in_days: i64,
}

/// SQLite reports contention as SQLITE_BUSY (5) / SQLITE_LOCKED (6) and their
/// extended codes. Those are safe to retry with fresh reads.
fn is_write_conflict(err: &AppError) -> bool {
    match err {
        AppError::Database(sqlx::Error::Database(db)) => {
            matches!(db.code().as_deref(), Some("5" | "6" | "261" | "262" | "517"))
                || db.message().contains("database is locked")
        }
        AppError::Database(sqlx::Error::PoolTimedOut) => true,
        _ => false,
    }
}

fn is_unique_violation(err: &AppError) -> bool {
    matches!(err, AppError::Database(sqlx::Error::Database(db)) if db.is_unique_violation())
}

/// Trimmed, non-empty ids in first-seen order.
pub(crate) fn dedupe(ids: &[String]) -> Vec<String> {
    let mut out: Vec<String> = Vec::with_capacity(ids.len());
    for id in ids {
        let id = id.trim();
        if !id.is_empty() && !out.iter().any(|seen| seen == id) {
            out.push(id.to_string());
        }
    }
    out
}

pub struct ActivationService;

impl ActivationService {
    /// Activate every listing and record the order in one transaction.
    ///
    /// Either all listings become active with `expiry_date = now + duration`
    /// and exactly one order is written, or nothing is committed.
    pub async fn activate(
        pool: &SqlitePool,
        request: ActivationRequest,
        now: NaiveDateTime,
    ) -> AppResult<Order> {
        let property_ids = dedupe(&request.property_ids);
        if property_ids.is_empty() {
            return Err(AppError::Validation(
                "at least one property must be selected".to_string(),
            ));
        }
        if request.tier_duration_in_days <= 0 {
            return Err(AppError::Validation(
                "tier duration must be positive".to_string(),
            ));
        }
        if request.amount < 0 {
            return Err(AppError::Validation(
                "payment amount cannot be negative".to_string(),
            ));
        }

        let expiry_date = now + Duration::days(request.tier_duration_in_days);
        let order = CreateOrder {
            user_id: request.user_id.clone(),
            property_ids,
            price_paid: request.amount,
            payment_reference: request.payment_reference.clone(),
            tier_name: request.tier_name.clone(),
            tier_duration_in_days: request.tier_duration_in_days,
            expiry_date,
        };

        let mut attempt = 0;
        loop {
            attempt += 1;
            match Self::try_activate(pool, order.clone(), now).await {
                Ok(order) => {
                    tracing::info!(
                        "Activated {} listing(s) for user {} under payment {} until {}",
                        order.property_ids.len(),
                        order.user_id,
                        order.payment_reference,
                        order.expiry_date
                    );
                    return Ok(order);
                }
                Err(AppError::PropertyNotFound(missing)) => {
                    tracing::warn!(
                        "Activation for payment {} aborted, unknown listing(s): {}",
                        request.payment_reference,
                        missing.join(", ")
                    );
                    return Err(AppError::PropertyNotFound(missing));
                }
                Err(e) if is_unique_violation(&e) => {
                    tracing::warn!(
                        "Payment reference {} already consumed by another order",
                        request.payment_reference
                    );
                    return Err(AppError::Conflict(format!(
                        "payment reference {} has already been used",
                        request.payment_reference
                    )));
                }
                Err(e) if is_write_conflict(&e) && attempt < MAX_ATTEMPTS => {
                    tracing::warn!(
                        "Write conflict activating payment {}, retrying: {}",
                        request.payment_reference,
                        e
                    );
                }
                Err(e) => {
                    tracing::error!(
                        "Payment received, listings not activated; manual reconciliation required. \
                         reference={} user={} amount={} properties=[{}] error={}",
                        request.payment_reference,
                        request.user_id,
                        request.amount,
                        order.property_ids.join(", "),
                        e
                    );
                    return Err(AppError::TransactionFailed(e.to_string()));
                }
            }
        }
    }

    async fn try_activate(
        pool: &SqlitePool,
        order: CreateOrder,
        now: NaiveDateTime,
    ) -> AppResult<Order> {
        let mut tx = pool.begin().await.map_err(AppError::Database)?;

        let mut missing = Vec::new();
        for property_id in &order.property_ids {
            if !PropertyRepository::activate(&mut *tx, property_id, order.expiry_date, now).await? {
                missing.push(property_id.clone());
            }
        }

        if !missing.is_empty() {
            tx.rollback().await.map_err(AppError::Database)?;
            return Err(AppError::PropertyNotFound(missing));
        }

        let order = OrderRepository::create(&mut *tx, order, now).await?;
        tx.commit().await.map_err(AppError::Database)?;

        Ok(order)
    }
}
