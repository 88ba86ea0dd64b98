use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Authentication required")]
    Unauthorized,

    #[error("Access denied")]
    Forbidden,

    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Discount code not found: {0}")]
    DiscountNotFound(String),

    #[error("Discount code is not active: {0}")]
    DiscountNotActive(String),

    #[error("Payment gateway unreachable: {0}")]
    GatewayUnreachable(String),

    #[error("Payment verification failed: {0}")]
    VerificationFailed(String),

    #[error("Payment amount mismatch: expected {expected_minor} minor units, gateway reported {paid_minor}")]
    AmountMismatch { expected_minor: i64, paid_minor: i64 },

    #[error("Property not found: {}", .0.join(", "))]
    PropertyNotFound(Vec<String>),

    #[error("Activation transaction failed: {0}")]
    TransactionFailed(String),

    /// Payment was captured by the gateway but the listings could not be activated.
    #[error("Payment {reference} received but activation failed: {reason}")]
    ActivationFailed { reference: String, reason: String },

    #[error("Mail transport error: {0}")]
    MailTransport(String),

    #[error("Internal server error")]
    Internal(#[from] anyhow::Error),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("JWT error: {0}")]
    Jwt(#[from] jsonwebtoken::errors::Error),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl AppError {
    /// True when the caller can retry the payment without risking a double charge.
    pub fn is_payment_retryable(&self) -> bool {
        matches!(
            self,
            AppError::GatewayUnreachable(_) | AppError::VerificationFailed(_)
        )
    }
}

#[derive(Serialize)]
struct ErrorResponse {
    error: ErrorBody,
}

#[derive(Serialize)]
struct ErrorBody {
    code: String,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<serde_json::Value>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let mut details = None;
        let retryable = self.is_payment_retryable();
        let (status, code, message) = match &self {
            AppError::Unauthorized => (StatusCode::UNAUTHORIZED, "UNAUTHORIZED", self.to_string()),
            AppError::Forbidden => (StatusCode::FORBIDDEN, "FORBIDDEN", self.to_string()),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, "NOT_FOUND", msg.clone()),
            AppError::Conflict(msg) => (StatusCode::CONFLICT, "CONFLICT", msg.clone()),
            AppError::Validation(msg) => (
                StatusCode::UNPROCESSABLE_ENTITY,
                "VALIDATION_ERROR",
                msg.clone(),
            ),
            AppError::DiscountNotFound(_) => (
                StatusCode::NOT_FOUND,
                "DISCOUNT_NOT_FOUND",
                self.to_string(),
            ),
            AppError::DiscountNotActive(_) => (
                StatusCode::UNPROCESSABLE_ENTITY,
                "DISCOUNT_NOT_ACTIVE",
                self.to_string(),
            ),
            AppError::GatewayUnreachable(msg) => {
                tracing::warn!("Payment gateway unreachable: {}", msg);
                details = Some(serde_json::json!({ "retryable": retryable }));
                (
                    StatusCode::BAD_GATEWAY,
                    "PAYMENT_GATEWAY_UNREACHABLE",
                    "Payment could not be confirmed; it is safe to retry".to_string(),
                )
            }
            AppError::VerificationFailed(msg) => {
                details = Some(serde_json::json!({ "retryable": retryable }));
                (
                    StatusCode::PAYMENT_REQUIRED,
                    "PAYMENT_NOT_RECEIVED",
                    msg.clone(),
                )
            }
            AppError::AmountMismatch { .. } => {
                tracing::error!("{}", self);
                details = Some(serde_json::json!({ "contact_support": true }));
                (
                    StatusCode::PAYMENT_REQUIRED,
                    "PAYMENT_AMOUNT_MISMATCH",
                    "Paid amount does not match the quoted amount; please contact support"
                        .to_string(),
                )
            }
            AppError::PropertyNotFound(ids) => {
                details = Some(serde_json::json!({ "property_ids": ids }));
                (
                    StatusCode::NOT_FOUND,
                    "PROPERTY_NOT_FOUND",
                    "One or more listings do not exist".to_string(),
                )
            }
            AppError::TransactionFailed(msg) => {
                tracing::error!("Activation transaction failed: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "ACTIVATION_FAILED",
                    "Listings could not be activated".to_string(),
                )
            }
            AppError::ActivationFailed { reference, .. } => {
                details = Some(serde_json::json!({
                    "payment_reference": reference,
                    "contact_support": true,
                }));
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "PAYMENT_RECEIVED_ACTIVATION_FAILED",
                    "Your payment was received but your listings could not be activated. \
                     Please contact support; do not pay again."
                        .to_string(),
                )
            }
            AppError::MailTransport(msg) => {
                tracing::warn!("Mail transport error: {}", msg);
                (StatusCode::BAD_GATEWAY, "MAIL_TRANSPORT_ERROR", msg.clone())
            }
            AppError::Database(e) => {
                tracing::error!("Database error: {:?}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "DATABASE_ERROR",
                    "A database error occurred".to_string(),
                )
            }
            AppError::Jwt(e) => {
                tracing::warn!("JWT error: {:?}", e);
                (
                    StatusCode::UNAUTHORIZED,
                    "INVALID_TOKEN",
                    "Invalid or expired token".to_string(),
                )
            }
            AppError::Config(msg) => {
                tracing::error!("Configuration error: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "CONFIG_ERROR",
                    "Server configuration error".to_string(),
                )
            }
            AppError::Internal(e) => {
                tracing::error!("Internal error: {:?}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "INTERNAL_ERROR",
                    "An internal error occurred".to_string(),
                )
            }
        };

        let body = ErrorResponse {
            error: ErrorBody {
                code: code.to_string(),
                message,
                details,
            },
        };

        (status, Json(body)).into_response()
    }
}

pub type AppResult<T> = Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn activation_failure_is_not_retryable() {
        let err = AppError::ActivationFailed {
            reference: "ref_1".to_string(),
            reason: "database is locked".to_string(),
        };
        assert!(!err.is_payment_retryable());
        assert_eq!(
            err.into_response().status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn payment_not_received_is_retryable() {
        assert!(AppError::GatewayUnreachable("timeout".into()).is_payment_retryable());
        assert!(AppError::VerificationFailed("abandoned".into()).is_payment_retryable());
        assert!(!AppError::AmountMismatch {
            expected_minor: 100,
            paid_minor: 50
        }
        .is_payment_retryable());
    }

    #[test]
    fn property_not_found_lists_ids() {
        let err = AppError::PropertyNotFound(vec!["a".into(), "b".into()]);
        assert_eq!(err.to_string(), "Property not found: a, b");
        assert_eq!(err.into_response().status(), StatusCode::NOT_FOUND);
    }
}
