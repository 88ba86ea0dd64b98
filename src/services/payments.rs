use std::sync::Arc;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;

use crate::config::PaymentGatewayConfig;
use crate::error::{AppError, AppResult};

/// Transaction details as reported by the gateway. `amount` is in minor units.
#[derive(Debug, Clone, Deserialize)]
pub struct GatewayTransaction {
    pub status: String,
    pub amount: i64,
    #[serde(default)]
    pub reference: Option<String>,
}

#[async_trait]
pub trait PaymentGateway: Send + Sync + 'static {
    async fn verify_transaction(&self, reference: &str) -> AppResult<GatewayTransaction>;
}

#[derive(Debug, Deserialize)]
struct VerifyEnvelope {
    status: bool,
    #[serde(default)]
    message: String,
    data: Option<GatewayTransaction>,
}

fn parse_verify_response(body: &str) -> AppResult<GatewayTransaction> {
    let envelope: VerifyEnvelope = serde_json::from_str(body).map_err(|e| {
        AppError::GatewayUnreachable(format!("unreadable gateway response: {}", e))
    })?;

    match envelope.data {
        Some(data) if envelope.status => Ok(data),
        _ => Err(AppError::VerificationFailed(if envelope.message.is_empty() {
            "gateway could not verify the transaction".to_string()
        } else {
            envelope.message
        })),
    }
}

/// Payment references end up in a URL path; keep them to a safe alphabet.
fn validate_reference(reference: &str) -> AppResult<()> {
    if reference.is_empty()
        || reference.len() > 128
        || !reference
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
    {
        return Err(AppError::Validation(
            "payment reference is malformed".to_string(),
        ));
    }
    Ok(())
}

/// HTTP client for the gateway's `GET /transaction/verify/{reference}` endpoint.
#[derive(Clone)]
pub struct PaystackGateway {
    client: Client,
    base_url: String,
    secret_key: String,
}

impl PaystackGateway {
    pub fn new(config: &PaymentGatewayConfig) -> AppResult<Self> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(config.timeout_seconds))
            .build()
            .map_err(|e| AppError::Config(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            secret_key: config.secret_key.clone(),
        })
    }
}

#[async_trait]
impl PaymentGateway for PaystackGateway {
    async fn verify_transaction(&self, reference: &str) -> AppResult<GatewayTransaction> {
        let url = format!("{}/transaction/verify/{}", self.base_url, reference);

        let response = self
            .client
            .get(&url)
            .bearer_auth(&self.secret_key)
            .send()
            .await
            .map_err(|e| AppError::GatewayUnreachable(e.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| AppError::GatewayUnreachable(e.to_string()))?;

        if status.is_server_error() || status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(AppError::GatewayUnreachable(format!(
                "gateway responded with {}",
                status
            )));
        }

        if !status.is_success() {
            tracing::warn!(
                "Gateway rejected verification of {} ({}): {}",
                reference,
                status,
                body
            );
        }

        parse_verify_response(&body)
    }
}

/// Outcome of a successful verification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifiedPayment {
    pub reference: String,
    /// Amount in major units, as quoted.
    pub amount: i64,
    /// True for zero-amount payments that skipped the gateway.
    pub bypassed: bool,
}

#[derive(Clone)]
pub struct PaymentVerifier {
    gateway: Arc<dyn PaymentGateway>,
}

impl PaymentVerifier {
    pub fn new(gateway: Arc<dyn PaymentGateway>) -> Self {
        Self { gateway }
    }

    /// Confirm that `reference` paid exactly `expected_amount` major units.
    ///
    /// An expected amount of exactly 0 is a free activation and never reaches the gateway.
    pub async fn verify(&self, reference: &str, expected_amount: i64) -> AppResult<VerifiedPayment> {
        if expected_amount < 0 {
            return Err(AppError::Validation(
                "payment amount cannot be negative".to_string(),
            ));
        }

        if expected_amount == 0 {
            tracing::info!("Zero-amount payment {} bypasses gateway verification", reference);
            return Ok(VerifiedPayment {
                reference: reference.to_string(),
                amount: 0,
                bypassed: true,
            });
        }

        validate_reference(reference)?;

        let expected_minor = expected_amount
            .checked_mul(100)
            .ok_or_else(|| AppError::Validation("payment amount too large".to_string()))?;

        let transaction = self.gateway.verify_transaction(reference).await?;

        if transaction.status != "success" {
            tracing::warn!(
                "Payment {} not successful: gateway status {}",
                reference,
                transaction.status
            );
            return Err(AppError::VerificationFailed(format!(
                "transaction status is {}",
                transaction.status
            )));
        }

        if transaction.amount != expected_minor {
            tracing::error!(
                "Payment {} amount mismatch: expected {} minor units, gateway reported {}; manual reconciliation required",
                reference,
                expected_minor,
                transaction.amount
            );
            return Err(AppError::AmountMismatch {
                expected_minor,
                paid_minor: transaction.amount,
            });
        }

        Ok(VerifiedPayment {
            reference: reference.to_string(),
            amount: expected_amount,
            bypassed: false,
        })
    }
}
