//! Background lifecycle job: expiry reminders and deactivation of expired listings.
//!
//! One `ExpirationScheduler` is built at startup and started exactly once;
//! `start` hands back a [`RunningScheduler`] whose `stop` ends the worker.
//! Passes can also be invoked directly, which is how tests drive them.
//!
//! Re-running a pass is safe: deactivation only touches listings that are
//! still active, and every email goes through the dispatch dedup ledger.

use std::sync::Arc;

use chrono::{DateTime, Duration, NaiveDateTime, Utc};
use sqlx::SqlitePool;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use crate::config::{ConfigError, SchedulerConfig};
use crate::db::{
    CreateNotification, EmailType, NotificationRepository, Property, PropertyRepository,
    UserRepository,
};
use crate::error::{AppError, AppResult};
use crate::services::dispatch::{DispatchOutcome, EmailPayload, NotificationDispatch};
use crate::services::schedule::DailySchedule;
use crate::templates;

pub const NOTIFICATION_TYPE_LISTING_EXPIRED: &str = "LISTING_EXPIRED";

/// Counters for one pass, logged at info level when the pass ends.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PassReport {
    pub matched: usize,
    pub sent: usize,
    pub suppressed: usize,
    pub failed: usize,
    pub deactivated: usize,
}

impl PassReport {
    fn absorb(&mut self, outcome: AppResult<DispatchOutcome>, property_id: &str, kind: EmailType) {
        match outcome {
            Ok(DispatchOutcome::Sent) => self.sent += 1,
            Ok(DispatchOutcome::Suppressed) => self.suppressed += 1,
            Err(e) => {
                self.failed += 1;
                tracing::warn!(
                    "Failed to send {} email for property {}: {}",
                    kind,
                    property_id,
                    e
                );
            }
        }
    }
}

/// Whole days until `expiry`, rounded up and never below 1.
pub fn remaining_days(expiry: NaiveDateTime, now: NaiveDateTime) -> i64 {
    let seconds = (expiry - now).num_seconds();
    let days = (seconds + 86_399).div_euclid(86_400);
    days.max(1)
}

pub struct ExpirationScheduler {
    pool: SqlitePool,
    dispatch: NotificationDispatch,
    reminder_days: Vec<u32>,
    reminder_schedule: DailySchedule,
    expiration_schedule: DailySchedule,
    run_on_startup: bool,
}

impl ExpirationScheduler {
    pub fn new(
        pool: SqlitePool,
        dispatch: NotificationDispatch,
        config: &SchedulerConfig,
    ) -> Result<Self, ConfigError> {
        Ok(Self {
            pool,
            dispatch,
            reminder_days: config.reminder_days.clone(),
            reminder_schedule: config.reminder_schedule()?,
            expiration_schedule: config.expiration_schedule()?,
            run_on_startup: config.run_on_startup,
        })
    }

    async fn payload_for(
        &self,
        property: &Property,
        days_remaining: Option<i64>,
    ) -> AppResult<EmailPayload> {
        let contact = UserRepository::find_contact(&self.pool, &property.owner_id)
            .await?
            .ok_or_else(|| {
                AppError::NotFound(format!(
                    "owner {} of property {}",
                    property.owner_id, property.id
                ))
            })?;

        Ok(EmailPayload {
            recipient_email: contact.email,
            recipient_name: contact.full_name,
            property_id: property.id.clone(),
            property_title: property.title.clone(),
            days_remaining,
            expiry_date: property.expiry_date.unwrap_or_default(),
        })
    }

    async fn notify(
        &self,
        property: &Property,
        email_type: EmailType,
        days_remaining: Option<i64>,
        now: NaiveDateTime,
    ) -> AppResult<DispatchOutcome> {
        let payload = self.payload_for(property, days_remaining).await?;
        self.dispatch
            .send(&property.id, &property.owner_id, email_type, &payload, now)
            .await
    }

    /// Send a reminder for every active listing expiring on one of the
    /// configured UTC days ahead. Failures are counted, never propagated per listing.
    pub async fn run_reminder_pass(&self, now: DateTime<Utc>) -> AppResult<PassReport> {
        let now_naive = now.naive_utc();
        let today = now_naive.date();
        let mut report = PassReport::default();

        for &offset in &self.reminder_days {
            let from = (today + Duration::days(offset as i64)).and_time(chrono::NaiveTime::MIN);
            let until = from + Duration::days(1);

            let properties =
                PropertyRepository::find_active_expiring_between(&self.pool, from, until).await?;
            tracing::debug!(
                "Reminder window {} day(s) [{} - {}): {} listing(s)",
                offset,
                from,
                until,
                properties.len()
            );

            for property in properties {
                report.matched += 1;
                let Some(expiry) = property.expiry_date else {
                    continue;
                };
                let days = remaining_days(expiry, now_naive);
                let kind = EmailType::Expiring(offset);
                let outcome = self.notify(&property, kind, Some(days), now_naive).await;
                report.absorb(outcome, &property.id, kind);
            }
        }

        tracing::info!(
            "Reminder pass finished: matched={} sent={} suppressed={} failed={}",
            report.matched,
            report.sent,
            report.suppressed,
            report.failed
        );
        Ok(report)
    }

    /// Deactivate every active listing whose expiry has passed and leave an
    /// in-app notification for its owner, then send the expiration email.
    ///
    /// Emails go out for every deactivated listing still missing one, so a
    /// send that failed on an earlier pass is retried here.
    pub async fn run_expiration_pass(&self, now: DateTime<Utc>) -> AppResult<PassReport> {
        let now_naive = now.naive_utc();
        let mut report = PassReport::default();

        let expired = PropertyRepository::find_active_expired_before(&self.pool, now_naive).await?;
        report.matched = expired.len();

        if !expired.is_empty() {
            let mut tx = self.pool.begin().await.map_err(AppError::Database)?;
            for property in expired {
                // Another pass may have flipped it since the read above.
                if !PropertyRepository::deactivate(&mut *tx, &property.id, now_naive).await? {
                    continue;
                }
                NotificationRepository::create(
                    &mut *tx,
                    CreateNotification {
                        user_id: property.owner_id.clone(),
                        property_id: property.id.clone(),
                        body: templates::render(
                            "notification.expired",
                            &[("title", property.title.as_str())],
                        ),
                        notification_type: NOTIFICATION_TYPE_LISTING_EXPIRED.to_string(),
                    },
                    now_naive,
                )
                .await?;
                report.deactivated += 1;
            }
            tx.commit().await.map_err(AppError::Database)?;
        }

        let awaiting_email = PropertyRepository::find_deactivated_awaiting_email(
            &self.pool,
            NOTIFICATION_TYPE_LISTING_EXPIRED,
            EmailType::Expired,
        )
        .await?;
        if awaiting_email.len() > report.deactivated {
            tracing::debug!(
                "Retrying expiration email for {} listing(s) deactivated earlier",
                awaiting_email.len() - report.deactivated
            );
        }
        for property in &awaiting_email {
            let outcome = self.notify(property, EmailType::Expired, None, now_naive).await;
            report.absorb(outcome, &property.id, EmailType::Expired);
        }

        tracing::info!(
            "Expiration pass finished: matched={} deactivated={} sent={} suppressed={} failed={}",
            report.matched,
            report.deactivated,
            report.sent,
            report.suppressed,
            report.failed
        );
        Ok(report)
    }

    /// Run the due passes for `now`. Reminders always go first, so a listing
    /// expiring in this run is never reminded after it was deactivated.
    /// Pass errors are logged and reported as `None`.
    pub async fn run_due(
        &self,
        now: DateTime<Utc>,
        run_reminders: bool,
        run_expirations: bool,
    ) -> (Option<PassReport>, Option<PassReport>) {
        let mut reminders = None;
        let mut expirations = None;
        if run_reminders {
            match self.run_reminder_pass(now).await {
                Ok(report) => reminders = Some(report),
                Err(e) => tracing::warn!("Reminder pass failed: {:?}", e),
            }
        }
        if run_expirations {
            match self.run_expiration_pass(now).await {
                Ok(report) => expirations = Some(report),
                Err(e) => tracing::warn!("Expiration pass failed: {:?}", e),
            }
        }
        (reminders, expirations)
    }

    /// Spawn the worker. Consumes the scheduler so it cannot be started twice.
    pub fn start(self) -> RunningScheduler {
        let (shutdown, mut shutdown_rx) = broadcast::channel::<()>(1);
        let scheduler = Arc::new(self);

        let handle = tokio::spawn(async move {
            tracing::info!(
                "Expiration scheduler started (reminder days {:?})",
                scheduler.reminder_days
            );

            if scheduler.run_on_startup {
                scheduler.run_due(Utc::now(), true, true).await;
            }

            loop {
                let now = Utc::now();
                let next_reminder = scheduler.reminder_schedule.next_after(now);
                let next_expiration = scheduler.expiration_schedule.next_after(now);
                let next = next_reminder.min(next_expiration);
                let wait = scheduler
                    .reminder_schedule
                    .duration_until_next(now)
                    .min(scheduler.expiration_schedule.duration_until_next(now));
                tracing::debug!("Next scheduler run at {}", next);

                tokio::select! {
                    _ = shutdown_rx.recv() => {
                        tracing::info!("Expiration scheduler shutting down");
                        break;
                    }
                    _ = tokio::time::sleep(wait) => {}
                }

                scheduler
                    .run_due(Utc::now(), next_reminder <= next, next_expiration <= next)
                    .await;
            }
        });

        RunningScheduler { shutdown, handle }
    }
}

/// Handle to the spawned scheduler worker.
pub struct RunningScheduler {
    shutdown: broadcast::Sender<()>,
    handle: JoinHandle<()>,
}

impl RunningScheduler {
    /// Signal the worker and wait up to `grace` for an in-flight pass to finish.
    pub async fn stop(mut self, grace: std::time::Duration) {
        let _ = self.shutdown.send(());
        match tokio::time::timeout(grace, &mut self.handle).await {
            Ok(Ok(())) => tracing::info!("Expiration scheduler stopped"),
            Ok(Err(e)) => tracing::warn!("Expiration scheduler task ended abnormally: {}", e),
            Err(_) => {
                tracing::warn!("Expiration scheduler did not stop within {:?}; aborting", grace);
                self.handle.abort();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::db::EmailLogRepository;
    use crate::services::dispatch::tests::SpyTransport;
    use crate::test_support;
    use chrono::TimeZone;
    use std::sync::atomic::Ordering;

    /// Fixed mid-day instant so the reminder windows do not shift across midnight mid-test.
    fn noon_today() -> DateTime<Utc> {
        let noon = Utc::now().date_naive().and_time(chrono::NaiveTime::MIN) + Duration::hours(12);
        Utc.from_utc_datetime(&noon)
    }

    fn scheduler(pool: &SqlitePool, spy: Arc<SpyTransport>) -> ExpirationScheduler {
        let config = Config::default();
        let dispatch = NotificationDispatch::new(pool.clone(), Some(spy), &config.mail);
        ExpirationScheduler::new(pool.clone(), dispatch, &config.scheduler).unwrap()
    }

    #[test]
    fn remaining_days_rounds_up() {
        let now = test_support::now();
        assert_eq!(remaining_days(now + Duration::days(3), now), 3);
        assert_eq!(remaining_days(now + Duration::days(2) + Duration::hours(1), now), 3);
        assert_eq!(remaining_days(now + Duration::minutes(5), now), 1);
    }

    #[tokio::test]
    async fn reminder_pass_writes_one_ledger_entry_per_window() {
        let pool = test_support::pool().await;
        test_support::seed_user(&pool, "owner-1").await;
        let now = noon_today();
        let property =
            test_support::seed_property(&pool, "owner-1", true, Some(now.naive_utc() + Duration::days(3)))
                .await;
        let spy = Arc::new(SpyTransport::default());
        let scheduler = scheduler(&pool, spy.clone());

        let first = scheduler.run_reminder_pass(now).await.unwrap();
        let second = scheduler
            .run_reminder_pass(now + Duration::minutes(30))
            .await
            .unwrap();

        assert_eq!(first.sent, 1);
        assert_eq!(second.suppressed, 1);
        let entries = EmailLogRepository::find_by_property(&pool, &property.id).await.unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].email_type, "expiring-3");
        assert_eq!(spy.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn far_and_inactive_listings_get_no_reminder() {
        let pool = test_support::pool().await;
        test_support::seed_user(&pool, "owner-1").await;
        let now = noon_today();
        test_support::seed_property(&pool, "owner-1", true, Some(now.naive_utc() + Duration::days(20))).await;
        test_support::seed_property(&pool, "owner-1", false, Some(now.naive_utc() + Duration::days(3))).await;
        let spy = Arc::new(SpyTransport::default());

        let report = scheduler(&pool, spy.clone()).run_reminder_pass(now).await.unwrap();
        assert_eq!(report.matched, 0);
        assert_eq!(spy.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn expiration_pass_deactivates_once() {
        let pool = test_support::pool().await;
        test_support::seed_user(&pool, "owner-1").await;
        let now = noon_today();
        let property =
            test_support::seed_property(&pool, "owner-1", true, Some(now.naive_utc() - Duration::hours(1)))
                .await;
        let spy = Arc::new(SpyTransport::default());
        let scheduler = scheduler(&pool, spy.clone());

        let first = scheduler.run_expiration_pass(now).await.unwrap();
        assert_eq!(first.deactivated, 1);
        assert_eq!(first.sent, 1);

        let stored = PropertyRepository::find_by_id(&pool, &property.id).await.unwrap().unwrap();
        assert!(!stored.is_active);
        assert_eq!(
            NotificationRepository::count_by_user_id(&pool, "owner-1", None).await.unwrap(),
            1
        );
        let entries = EmailLogRepository::find_by_property(&pool, &property.id).await.unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].email_type, "expired");

        let second = scheduler
            .run_expiration_pass(now + Duration::minutes(1))
            .await
            .unwrap();
        assert_eq!(second, PassReport::default());
        assert_eq!(
            NotificationRepository::count_by_user_id(&pool, "owner-1", None).await.unwrap(),
            1
        );
        assert_eq!(spy.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn failed_expiration_email_is_sent_on_a_later_pass() {
        let pool = test_support::pool().await;
        test_support::seed_user(&pool, "owner-1").await;
        let now = noon_today();
        let property =
            test_support::seed_property(&pool, "owner-1", true, Some(now.naive_utc() - Duration::hours(1)))
                .await;
        let spy = SpyTransport::failing();
        let scheduler = scheduler(&pool, spy.clone());

        let first = scheduler.run_expiration_pass(now).await.unwrap();
        assert_eq!(first.deactivated, 1);
        assert_eq!(first.failed, 1);
        assert!(EmailLogRepository::find_by_property(&pool, &property.id).await.unwrap().is_empty());

        spy.failing.store(false, Ordering::SeqCst);
        let second = scheduler.run_expiration_pass(now + Duration::days(1)).await.unwrap();
        assert_eq!(second.matched, 0);
        assert_eq!(second.deactivated, 0);
        assert_eq!(second.sent, 1);

        let third = scheduler.run_expiration_pass(now + Duration::days(2)).await.unwrap();
        assert_eq!(third, PassReport::default());

        let entries = EmailLogRepository::find_by_property(&pool, &property.id).await.unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].email_type, "expired");
        assert_eq!(spy.sent.lock().await.len(), 1);
        assert_eq!(spy.calls.load(Ordering::SeqCst), 2);
        assert_eq!(
            NotificationRepository::count_by_user_id(&pool, "owner-1", None).await.unwrap(),
            1
        );
    }

    #[tokio::test]
    async fn merged_run_reminds_before_it_expires() {
        let pool = test_support::pool().await;
        test_support::seed_user(&pool, "owner-1").await;
        let now = noon_today();
        let expiring =
            test_support::seed_property(&pool, "owner-1", true, Some(now.naive_utc() + Duration::days(1)))
                .await;
        let expired =
            test_support::seed_property(&pool, "owner-1", true, Some(now.naive_utc() - Duration::hours(2)))
                .await;
        let spy = Arc::new(SpyTransport::default());

        let (reminders, expirations) = scheduler(&pool, spy.clone()).run_due(now, true, true).await;
        assert_eq!(reminders.unwrap().sent, 1);
        let expirations = expirations.unwrap();
        assert_eq!(expirations.deactivated, 1);
        assert_eq!(expirations.sent, 1);

        let sent = spy.sent.lock().await;
        assert_eq!(sent.len(), 2);
        assert!(sent[0].subject.contains("expires in"));
        assert!(sent[1].subject.contains("has expired"));
        drop(sent);

        let expiring_log = EmailLogRepository::find_by_property(&pool, &expiring.id).await.unwrap();
        assert_eq!(expiring_log.len(), 1);
        assert_eq!(expiring_log[0].email_type, "expiring-1");
        let expired_log = EmailLogRepository::find_by_property(&pool, &expired.id).await.unwrap();
        assert_eq!(expired_log.len(), 1);
        assert_eq!(expired_log[0].email_type, "expired");

        let stored = PropertyRepository::find_by_id(&pool, &expiring.id).await.unwrap().unwrap();
        assert!(stored.is_active);
    }

    #[tokio::test]
    async fn run_due_skips_passes_that_are_not_due() {
        let pool = test_support::pool().await;
        test_support::seed_user(&pool, "owner-1").await;
        let now = noon_today();
        let expired =
            test_support::seed_property(&pool, "owner-1", true, Some(now.naive_utc() - Duration::hours(2)))
                .await;
        let spy = Arc::new(SpyTransport::default());

        let (reminders, expirations) = scheduler(&pool, spy).run_due(now, true, false).await;
        assert!(expirations.is_none());
        assert_eq!(reminders.unwrap().matched, 0);
        let stored = PropertyRepository::find_by_id(&pool, &expired.id).await.unwrap().unwrap();
        assert!(stored.is_active);
    }

    #[tokio::test]
    async fn transport_failure_is_retried_on_the_next_run() {
        let pool = test_support::pool().await;
        test_support::seed_user(&pool, "owner-1").await;
        let now = noon_today();
        let a = test_support::seed_property(&pool, "owner-1", true, Some(now.naive_utc() + Duration::days(1))).await;
        let b = test_support::seed_property(&pool, "owner-1", true, Some(now.naive_utc() + Duration::days(7))).await;
        let spy = SpyTransport::failing();
        let scheduler = scheduler(&pool, spy.clone());

        let report = scheduler.run_reminder_pass(now).await.unwrap();
        assert_eq!(report.matched, 2);
        assert_eq!(report.failed, 2);
        assert!(EmailLogRepository::find_by_property(&pool, &a.id).await.unwrap().is_empty());
        assert!(EmailLogRepository::find_by_property(&pool, &b.id).await.unwrap().is_empty());

        spy.failing.store(false, Ordering::SeqCst);
        let report = scheduler.run_reminder_pass(now + Duration::minutes(5)).await.unwrap();
        assert_eq!(report.sent, 2);
    }

    #[tokio::test]
    async fn one_broken_listing_does_not_stop_the_pass() {
        let pool = test_support::pool().await;
        test_support::seed_user(&pool, "owner-1").await;
        let now = noon_today();
        // No contact row for this owner.
        test_support::seed_property(&pool, "ghost", true, Some(now.naive_utc() + Duration::days(3))).await;
        test_support::seed_property(&pool, "owner-1", true, Some(now.naive_utc() + Duration::days(3))).await;
        let spy = Arc::new(SpyTransport::default());

        let report = scheduler(&pool, spy).run_reminder_pass(now).await.unwrap();
        assert_eq!(report.matched, 2);
        assert_eq!(report.sent, 1);
        assert_eq!(report.failed, 1);
    }

    #[tokio::test]
    async fn started_scheduler_stops_promptly() {
        let pool = test_support::pool().await;
        let running = scheduler(&pool, Arc::new(SpyTransport::default())).start();
        running.stop(std::time::Duration::from_secs(5)).await;
    }
}
