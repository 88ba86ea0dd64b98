use chrono::NaiveDateTime;
use sqlx::SqlitePool;

use crate::db::{DiscountGrant, DiscountRepository};
use crate::error::{AppError, AppResult};

const MAX_CODE_LEN: usize = 64;

pub struct DiscountService;

impl DiscountService {
    /// Trim and validate the shape of a discount code.
    pub fn normalize_code(code: &str) -> AppResult<&str> {
        let code = code.trim();
        if code.is_empty() {
            return Err(AppError::Validation(
                "discount code cannot be empty".to_string(),
            ));
        }
        if code.len() > MAX_CODE_LEN {
            return Err(AppError::Validation(format!(
                "discount code cannot exceed {} characters",
                MAX_CODE_LEN
            )));
        }
        if !code
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        {
            return Err(AppError::Validation(
                "discount code may only contain letters, digits, '-' and '_'".to_string(),
            ));
        }
        Ok(code)
    }

    /// All discounts granted to the user, most recently granted first.
    ///
    /// Validity windows are not filtered here.
    pub async fn list_active_grants(
        pool: &SqlitePool,
        user_id: &str,
    ) -> AppResult<Vec<DiscountGrant>> {
        DiscountRepository::list_grants_for_user(pool, user_id).await
    }

    /// Redeem a code for the user and return its percentage.
    ///
    /// Granting is idempotent. A code outside its validity window fails with
    /// `DiscountNotActive` and leaves the user's grants untouched.
    pub async fn apply_code(
        pool: &SqlitePool,
        user_id: &str,
        code: &str,
        now: NaiveDateTime,
    ) -> AppResult<f64> {
        let code = Self::normalize_code(code)?;

        let discount = DiscountRepository::find_by_code(pool, code)
            .await?
            .ok_or_else(|| AppError::DiscountNotFound(code.to_string()))?;

        if !discount.is_active_at(now) {
            tracing::debug!(
                "Discount {} rejected for user {}: window {} - {}",
                discount.code,
                user_id,
                discount.start_date,
                discount.expiration_date
            );
            return Err(AppError::DiscountNotActive(discount.code));
        }

        let granted = DiscountRepository::grant(pool, &discount.id, user_id, now).await?;
        if granted {
            tracing::info!("Granted discount {} to user {}", discount.code, user_id);
        } else {
            tracing::debug!("Discount {} already granted to user {}", discount.code, user_id);
        }

        Ok(discount.percentage)
    }

    /// Percentage of a code the user already holds, checked against `now`.
    pub async fn percentage_for_user(
        pool: &SqlitePool,
        user_id: &str,
        code: &str,
        now: NaiveDateTime,
    ) -> AppResult<f64> {
        let code = Self::normalize_code(code)?;

        let grant = match DiscountRepository::find_grant_by_code(pool, user_id, code).await? {
            Some(grant) => grant,
            None => {
                return match DiscountRepository::find_by_code(pool, code).await? {
                    Some(_) => Err(AppError::Validation(format!(
                        "discount code {} has not been applied to this account",
                        code
                    ))),
                    None => Err(AppError::DiscountNotFound(code.to_string())),
                };
            }
        };

        if !grant.is_active_at(now) {
            return Err(AppError::DiscountNotActive(grant.code));
        }

        Ok(grant.percentage)
    }
}
