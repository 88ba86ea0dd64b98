use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::db::{Order, OrderRepository, PropertyRepository};
use crate::error::{AppError, AppResult};
use crate::services::activation::{dedupe, ActivationRequest, ActivationService};
use crate::services::discounts::DiscountService;
use crate::services::payments::PaymentVerifier;
use crate::services::pricing::{PricingCatalog, Quote, Tier};

#[derive(Debug, Clone, Deserialize)]
pub struct CheckoutRequest {
    pub property_ids: Vec<String>,
    pub tier: String,
    #[serde(default)]
    pub discount_code: Option<String>,
    /// Amount the client paid, in major units. Must equal the server-side quote.
    pub amount: i64,
    #[serde(default)]
    pub payment_reference: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CheckoutReceipt {
    pub order: Order,
    pub quote: Quote,
    pub payment_bypassed: bool,
}

/// Quote the selection for `user_id`, applying a code the user already holds.
pub async fn quote_for_user(
    pool: &SqlitePool,
    user_id: &str,
    property_count: u32,
    tier: Tier,
    discount_code: Option<&str>,
    now: NaiveDateTime,
) -> AppResult<Quote> {
    let percentage = match discount_code.map(str::trim).filter(|c| !c.is_empty()) {
        Some(code) => Some(DiscountService::percentage_for_user(pool, user_id, code, now).await?),
        None => None,
    };
    PricingCatalog::quote(property_count, tier, percentage)
}

#[derive(Clone)]
pub struct CheckoutService {
    pool: SqlitePool,
    verifier: PaymentVerifier,
}

impl CheckoutService {
    pub fn new(pool: SqlitePool, verifier: PaymentVerifier) -> Self {
        Self { pool, verifier }
    }

    /// Verify the payment for a selection and activate it.
    ///
    /// Everything that can be rejected without touching money is checked
    /// before the gateway is called. No transaction is held open across the
    /// gateway call.
    pub async fn complete(
        &self,
        user_id: &str,
        request: CheckoutRequest,
        now: NaiveDateTime,
    ) -> AppResult<CheckoutReceipt> {
        let property_ids = dedupe(&request.property_ids);
        if property_ids.is_empty() {
            return Err(AppError::Validation(
                "at least one property must be selected".to_string(),
            ));
        }

        let tier: Tier = request.tier.parse()?;

        let mut missing = Vec::new();
        for id in &property_ids {
            match PropertyRepository::find_by_id(&self.pool, id).await? {
                Some(property) if property.owner_id != user_id => {
                    tracing::warn!("User {} attempted to pay for property {} they do not own", user_id, id);
                    return Err(AppError::Forbidden);
                }
                Some(_) => {}
                None => missing.push(id.clone()),
            }
        }
        if !missing.is_empty() {
            return Err(AppError::PropertyNotFound(missing));
        }

        let property_count = u32::try_from(property_ids.len())
            .map_err(|_| AppError::Validation("too many properties selected".to_string()))?;
        let quote = quote_for_user(
            &self.pool,
            user_id,
            property_count,
            tier,
            request.discount_code.as_deref(),
            now,
        )
        .await?;

        if request.amount != quote.total_amount {
            return Err(AppError::Validation(format!(
                "amount {} does not match the quoted total {}",
                request.amount, quote.total_amount
            )));
        }

        let reference = match request
            .payment_reference
            .as_deref()
            .map(str::trim)
            .filter(|r| !r.is_empty())
        {
            Some(reference) => reference.to_string(),
            None if quote.total_amount == 0 => format!("free-{}", Uuid::new_v4()),
            None => {
                return Err(AppError::Validation(
                    "payment reference is required".to_string(),
                ))
            }
        };

        if OrderRepository::reference_exists(&self.pool, &reference).await? {
            tracing::warn!("Payment reference {} already used", reference);
            return Err(AppError::Conflict(format!(
                "payment reference {} has already been used",
                reference
            )));
        }

        let verified = self.verifier.verify(&reference, quote.total_amount).await?;

        let activation = ActivationRequest {
            property_ids,
            amount: verified.amount,
            user_id: user_id.to_string(),
            payment_reference: verified.reference.clone(),
            tier_name: tier.name().to_string(),
            tier_duration_in_days: tier.duration_days(),
        };

        match ActivationService::activate(&self.pool, activation, now).await {
            Ok(order) => Ok(CheckoutReceipt {
                order,
                quote,
                payment_bypassed: verified.bypassed,
            }),
            Err(e) if verified.bypassed => Err(e),
            Err(e) => {
                tracing::error!(
                    "Payment {} of {} verified for user {} but activation failed: {}",
                    verified.reference,
                    verified.amount,
                    user_id,
                    e
                );
                Err(AppError::ActivationFailed {
                    reference: verified.reference,
                    reason: e.to_string(),
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::payments::tests::SpyGateway;
    use crate::test_support;
    use chrono::Duration;

    async fn owned_properties(pool: &SqlitePool, owner: &str, n: usize) -> Vec<String> {
        let mut ids = Vec::new();
        for _ in 0..n {
            ids.push(test_support::seed_property(pool, owner, false, None).await.id);
        }
        ids
    }

    fn request(ids: Vec<String>, tier: &str, code: Option<&str>, amount: i64, reference: Option<&str>) -> CheckoutRequest {
        CheckoutRequest {
            property_ids: ids,
            tier: tier.to_string(),
            discount_code: code.map(str::to_string),
            amount,
            payment_reference: reference.map(str::to_string),
        }
    }

    #[tokio::test]
    async fn six_diamond_listings_with_a_ten_percent_code() {
        let pool = test_support::pool().await;
        let now = test_support::now();
        test_support::seed_discount(&pool, "LAUNCH10", 10.0, now - Duration::days(1), now + Duration::days(1)).await;
        DiscountService::apply_code(&pool, "owner-1", "LAUNCH10", now).await.unwrap();
        let ids = owned_properties(&pool, "owner-1", 6).await;

        let spy = SpyGateway::paying(540_000);
        let checkout = CheckoutService::new(pool.clone(), PaymentVerifier::new(spy.clone()));
        let receipt = checkout
            .complete("owner-1", request(ids.clone(), "Diamond", Some("LAUNCH10"), 5400, Some("ref_6dia")), now)
            .await
            .unwrap();

        assert_eq!(receipt.quote.base_amount, 6000);
        assert_eq!(receipt.quote.total_amount, 5400);
        assert_eq!(receipt.quote.savings, 600);
        assert_eq!(receipt.order.price_paid, 5400);
        assert_eq!(receipt.order.tier_duration_in_days, 30);
        assert!(!receipt.payment_bypassed);
        assert_eq!(spy.calls(), 1);
        for id in &ids {
            let p = PropertyRepository::find_by_id(&pool, id).await.unwrap().unwrap();
            assert!(p.is_active);
            assert_eq!(p.expiry_date, Some(receipt.order.expiry_date));
        }
    }

    #[tokio::test]
    async fn fully_discounted_checkout_never_calls_the_gateway() {
        let pool = test_support::pool().await;
        let now = test_support::now();
        test_support::seed_discount(&pool, "FREE", 100.0, now - Duration::days(1), now + Duration::days(1)).await;
        DiscountService::apply_code(&pool, "owner-1", "FREE", now).await.unwrap();
        let ids = owned_properties(&pool, "owner-1", 2).await;

        let spy = SpyGateway::paying(0);
        let checkout = CheckoutService::new(pool.clone(), PaymentVerifier::new(spy.clone()));
        let receipt = checkout
            .complete("owner-1", request(ids, "Bronze", Some("FREE"), 0, None), now)
            .await
            .unwrap();

        assert!(receipt.payment_bypassed);
        assert!(receipt.order.payment_reference.starts_with("free-"));
        assert_eq!(receipt.order.price_paid, 0);
        assert_eq!(spy.calls(), 0);
    }

    #[tokio::test]
    async fn repeated_ids_are_priced_once() {
        let pool = test_support::pool().await;
        let ids = owned_properties(&pool, "owner-1", 1).await;
        let total = PricingCatalog::quote(1, Tier::Bronze, None).unwrap().total_amount;
        let spy = SpyGateway::paying(total * 100);
        let checkout = CheckoutService::new(pool.clone(), PaymentVerifier::new(spy.clone()));

        let repeated = vec![ids[0].clone(), format!(" {} ", ids[0]), ids[0].clone()];
        let receipt = checkout
            .complete("owner-1", request(repeated, "Bronze", None, total, Some("ref_once")), test_support::now())
            .await
            .unwrap();

        assert_eq!(receipt.order.property_ids, ids);
        assert_eq!(receipt.quote.total_amount, total);
        assert_eq!(spy.calls(), 1);
    }

    #[tokio::test]
    async fn amount_that_differs_from_the_quote_is_rejected_before_the_gateway() {
        let pool = test_support::pool().await;
        let ids = owned_properties(&pool, "owner-1", 1).await;
        let spy = SpyGateway::paying(0);
        let checkout = CheckoutService::new(pool.clone(), PaymentVerifier::new(spy.clone()));

        // A client claiming a free activation for a paid tier.
        let err = checkout
            .complete("owner-1", request(ids, "Platinum", None, 0, None), test_support::now())
            .await
            .unwrap_err();

        assert!(matches!(err, AppError::Validation(_)));
        assert_eq!(spy.calls(), 0);
        assert_eq!(OrderRepository::count_all(&pool).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn paying_for_someone_elses_listing_is_forbidden() {
        let pool = test_support::pool().await;
        let ids = owned_properties(&pool, "owner-2", 1).await;
        let spy = SpyGateway::paying(50_000);
        let checkout = CheckoutService::new(pool.clone(), PaymentVerifier::new(spy.clone()));

        let err = checkout
            .complete("owner-1", request(ids, "Bronze", None, 500, Some("ref_x")), test_support::now())
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Forbidden));
        assert_eq!(spy.calls(), 0);
    }

    #[tokio::test]
    async fn unknown_listing_and_reused_reference_are_rejected() {
        let pool = test_support::pool().await;
        let now = test_support::now();
        let ids = owned_properties(&pool, "owner-1", 1).await;
        let spy = SpyGateway::paying(50_000);
        let checkout = CheckoutService::new(pool.clone(), PaymentVerifier::new(spy.clone()));

        let err = checkout
            .complete("owner-1", request(vec!["nope".to_string()], "Bronze", None, 500, Some("ref_a")), now)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::PropertyNotFound(_)));

        checkout
            .complete("owner-1", request(ids.clone(), "Bronze", None, 500, Some("ref_b")), now)
            .await
            .unwrap();
        let err = checkout
            .complete("owner-1", request(ids, "Bronze", None, 500, Some("ref_b")), now)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));
        assert_eq!(spy.calls(), 1);
    }

    #[tokio::test]
    async fn quote_requires_the_code_to_be_granted() {
        let pool = test_support::pool().await;
        let now = test_support::now();
        test_support::seed_discount(&pool, "VIP", 20.0, now - Duration::days(1), now + Duration::days(1)).await;

        let err = quote_for_user(&pool, "owner-1", 3, Tier::Bronze, Some("VIP"), now)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));

        DiscountService::apply_code(&pool, "owner-1", "VIP", now).await.unwrap();
        let quote = quote_for_user(&pool, "owner-1", 3, Tier::Bronze, Some("VIP"), now)
            .await
            .unwrap();
        assert_eq!(quote.total_amount, 1200);
    }
}
