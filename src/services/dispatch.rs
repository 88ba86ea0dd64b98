use std::sync::Arc;

use async_trait::async_trait;
use chrono::{Duration, NaiveDateTime};
use reqwest::Client;
use serde::Serialize;
use sqlx::SqlitePool;

use crate::config::MailConfig;
use crate::db::{EmailLogRepository, EmailType};
use crate::error::{AppError, AppResult};
use crate::templates;

/// An email of the same type about the same listing is sent at most once per window.
pub const DEDUP_WINDOW_HOURS: i64 = 24;

#[derive(Debug, Clone, Serialize)]
pub struct OutgoingEmail {
    pub from: String,
    pub to: Vec<String>,
    pub subject: String,
    pub html: String,
}

/// Trait for delivering rendered emails
#[async_trait]
pub trait MailTransport: Send + Sync {
    async fn send(&self, email: &OutgoingEmail) -> AppResult<()>;
}

/// Transactional mail API reached over HTTPS with a bearer key.
pub struct HttpMailTransport {
    client: Client,
    api_url: String,
    api_key: String,
}

impl HttpMailTransport {
    /// `None` when no API key is configured.
    pub fn from_config(config: &MailConfig) -> AppResult<Option<Self>> {
        let Some(api_key) = config.api_key.clone() else {
            return Ok(None);
        };

        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(config.timeout_seconds))
            .build()
            .map_err(|e| AppError::Config(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Some(Self {
            client,
            api_url: config.api_url.clone(),
            api_key,
        }))
    }
}

#[async_trait]
impl MailTransport for HttpMailTransport {
    async fn send(&self, email: &OutgoingEmail) -> AppResult<()> {
        let response = self
            .client
            .post(&self.api_url)
            .bearer_auth(&self.api_key)
            .json(email)
            .send()
            .await
            .map_err(|e| AppError::MailTransport(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(AppError::MailTransport(format!(
                "mail API responded with {}: {}",
                status, error_text
            )));
        }

        Ok(())
    }
}

/// Data interpolated into a lifecycle email.
#[derive(Debug, Clone)]
pub struct EmailPayload {
    pub recipient_email: String,
    pub recipient_name: String,
    pub property_id: String,
    pub property_title: String,
    /// Exact whole days left; only meaningful for reminders.
    pub days_remaining: Option<i64>,
    pub expiry_date: NaiveDateTime,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    Sent,
    /// A ledger entry for the same key exists inside the dedup window.
    Suppressed,
}

#[derive(Clone)]
pub struct NotificationDispatch {
    pool: SqlitePool,
    transport: Option<Arc<dyn MailTransport>>,
    from: String,
    app_base_url: String,
}

impl NotificationDispatch {
    pub fn new(
        pool: SqlitePool,
        transport: Option<Arc<dyn MailTransport>>,
        config: &MailConfig,
    ) -> Self {
        if transport.is_none() {
            tracing::warn!("Mail transport not configured; lifecycle emails will fail until MAIL_API_KEY is set");
        }
        Self {
            pool,
            transport,
            from: config.from.clone(),
            app_base_url: config.app_base_url.trim_end_matches('/').to_string(),
        }
    }

    fn render(&self, email_type: EmailType, payload: &EmailPayload) -> OutgoingEmail {
        let link = format!("{}/listings/{}/renew", self.app_base_url, payload.property_id);
        let expiry = payload.expiry_date.format("%Y-%m-%d").to_string();
        let days = payload.days_remaining.unwrap_or_default().to_string();

        let (subject_key, body_key) = match email_type {
            EmailType::Expiring(_) => ("email.expiring.subject", "email.expiring.body"),
            EmailType::Expired => ("email.expired.subject", "email.expired.body"),
        };

        let params = [
            ("name", payload.recipient_name.as_str()),
            ("title", payload.property_title.as_str()),
            ("days", days.as_str()),
            ("expiry_date", expiry.as_str()),
            ("link", link.as_str()),
        ];

        OutgoingEmail {
            from: self.from.clone(),
            to: vec![payload.recipient_email.clone()],
            subject: templates::render(subject_key, &params),
            html: templates::render_html(body_key, &params),
        }
    }

    /// Send one lifecycle email unless the same one went out inside the dedup window.
    ///
    /// The ledger entry is written only after the transport accepted the email,
    /// so a failed send is retried by the next scheduler pass.
    pub async fn send(
        &self,
        property_id: &str,
        user_id: &str,
        email_type: EmailType,
        payload: &EmailPayload,
        now: NaiveDateTime,
    ) -> AppResult<DispatchOutcome> {
        let since = now - Duration::hours(DEDUP_WINDOW_HOURS);

        if let Some(entry) =
            EmailLogRepository::find_since(&self.pool, property_id, user_id, email_type, since)
                .await?
        {
            tracing::debug!(
                "Suppressing duplicate {} email for property {} (last sent {})",
                email_type,
                property_id,
                entry.sent_at
            );
            return Ok(DispatchOutcome::Suppressed);
        }

        let transport = self
            .transport
            .as_ref()
            .ok_or_else(|| AppError::MailTransport("mail transport not configured".to_string()))?;

        let email = self.render(email_type, payload);
        transport.send(&email).await?;

        let recorded =
            EmailLogRepository::record(&self.pool, property_id, user_id, email_type, now, since)
                .await?;
        if !recorded {
            tracing::debug!(
                "Concurrent {} email for property {} already recorded",
                email_type,
                property_id
            );
        }

        tracing::info!(
            "Sent {} email for property {} to user {}",
            email_type,
            property_id,
            user_id
        );
        Ok(DispatchOutcome::Sent)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::config::Config;
    use crate::test_support;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use tokio::sync::Mutex;

    /// Transport double that records what it was asked to deliver.
    #[derive(Default)]
    pub(crate) struct SpyTransport {
        pub sent: Mutex<Vec<OutgoingEmail>>,
        pub calls: AtomicUsize,
        pub failing: AtomicBool,
    }

    impl SpyTransport {
        pub(crate) fn failing() -> Arc<Self> {
            let spy = Self::default();
            spy.failing.store(true, Ordering::SeqCst);
            Arc::new(spy)
        }
    }

    #[async_trait]
    impl MailTransport for SpyTransport {
        async fn send(&self, email: &OutgoingEmail) -> AppResult<()> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.failing.load(Ordering::SeqCst) {
                return Err(AppError::MailTransport("connection reset".to_string()));
            }
            self.sent.lock().await.push(email.clone());
            Ok(())
        }
    }

    pub(crate) fn payload(property_id: &str, days: Option<i64>, expiry: NaiveDateTime) -> EmailPayload {
        EmailPayload {
            recipient_email: "owner@example.com".to_string(),
            recipient_name: "Ada".to_string(),
            property_id: property_id.to_string(),
            property_title: "Two bedroom flat".to_string(),
            days_remaining: days,
            expiry_date: expiry,
        }
    }

    #[tokio::test]
    async fn second_send_inside_window_is_suppressed() {
        let pool = test_support::pool().await;
        let spy = Arc::new(SpyTransport::default());
        let dispatch = NotificationDispatch::new(pool.clone(), Some(spy.clone()), &Config::default().mail);
        let now = test_support::now();
        let p = payload("prop-1", Some(3), now + Duration::days(3));

        let first = dispatch.send("prop-1", "user-1", EmailType::Expiring(3), &p, now).await.unwrap();
        let second = dispatch
            .send("prop-1", "user-1", EmailType::Expiring(3), &p, now + Duration::hours(2))
            .await
            .unwrap();

        assert_eq!(first, DispatchOutcome::Sent);
        assert_eq!(second, DispatchOutcome::Suppressed);
        assert_eq!(spy.calls.load(Ordering::SeqCst), 1);
        assert_eq!(EmailLogRepository::find_by_property(&pool, "prop-1").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn different_type_or_expired_window_sends_again() {
        let pool = test_support::pool().await;
        let spy = Arc::new(SpyTransport::default());
        let dispatch = NotificationDispatch::new(pool.clone(), Some(spy.clone()), &Config::default().mail);
        let now = test_support::now();
        let p = payload("prop-2", Some(7), now + Duration::days(7));

        dispatch.send("prop-2", "user-1", EmailType::Expiring(7), &p, now).await.unwrap();
        let other_type = dispatch.send("prop-2", "user-1", EmailType::Expiring(3), &p, now).await.unwrap();
        let next_day = dispatch
            .send("prop-2", "user-1", EmailType::Expiring(7), &p, now + Duration::hours(25))
            .await
            .unwrap();

        assert_eq!(other_type, DispatchOutcome::Sent);
        assert_eq!(next_day, DispatchOutcome::Sent);
        assert_eq!(spy.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn failed_transport_writes_no_ledger_entry() {
        let pool = test_support::pool().await;
        let spy = SpyTransport::failing();
        let dispatch = NotificationDispatch::new(pool.clone(), Some(spy.clone()), &Config::default().mail);
        let now = test_support::now();

        let err = dispatch
            .send("prop-3", "user-1", EmailType::Expired, &payload("prop-3", None, now), now)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::MailTransport(_)));
        assert!(EmailLogRepository::find_by_property(&pool, "prop-3").await.unwrap().is_empty());

        spy.failing.store(false, Ordering::SeqCst);
        let retried = dispatch
            .send("prop-3", "user-1", EmailType::Expired, &payload("prop-3", None, now), now)
            .await
            .unwrap();
        assert_eq!(retried, DispatchOutcome::Sent);
    }

    #[tokio::test]
    async fn missing_transport_is_a_transport_error() {
        let pool = test_support::pool().await;
        let dispatch = NotificationDispatch::new(pool.clone(), None, &Config::default().mail);
        let now = test_support::now();
        let err = dispatch
            .send("prop-4", "user-1", EmailType::Expired, &payload("prop-4", None, now), now)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::MailTransport(_)));
    }

    #[tokio::test]
    async fn renders_subject_link_and_recipient() {
        let pool = test_support::pool().await;
        let spy = Arc::new(SpyTransport::default());
        let dispatch = NotificationDispatch::new(pool, Some(spy.clone()), &Config::default().mail);
        let now = test_support::now();

        dispatch
            .send("prop-5", "user-1", EmailType::Expiring(1), &payload("prop-5", Some(1), now), now)
            .await
            .unwrap();

        let sent = spy.sent.lock().await;
        assert_eq!(sent[0].to, vec!["owner@example.com".to_string()]);
        assert!(sent[0].subject.contains("expires in 1 day"));
        assert!(sent[0].html.contains("/listings/prop-5/renew"));
    }
}
