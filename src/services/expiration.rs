//! Listing expiration
//!
//! A listing stays visible until its paid window (`expires_at`) ends. The
//! sweep deactivates overdue listings; the warning pass tells owners ahead of
//! time at each configured threshold, once per threshold.

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use std::sync::Arc;
use tokio::{sync::mpsc, task::JoinHandle};
use uuid::Uuid;

use crate::{
    db::{Cache, ListingStore},
    error::AppResult,
    models::{Notification, NotificationKind, Property},
    services::{
        mailer::{EmailTemplate, Mailer},
        recommendations::popular_property_cache_keys,
    },
};

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SweepReport {
    pub deactivated: Vec<Uuid>,
    pub emails_sent: usize,
    pub email_failures: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct WarningReport {
    /// (listing, threshold in days) pairs that were warned
    pub warned: Vec<(Uuid, i64)>,
    pub emails_sent: usize,
    pub email_failures: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CycleReport {
    pub sweep: SweepReport,
    pub warnings: WarningReport,
}

#[derive(Debug, Clone)]
pub struct ExpirationSettings {
    /// Ascending, positive day counts
    pub warning_days: Vec<i64>,
    pub mail_from: String,
    pub site_url: String,
}

/// Smallest threshold `t` with `expires_at - now <= t days`, if any
pub fn applicable_threshold(
    expires_at: DateTime<Utc>,
    now: DateTime<Utc>,
    thresholds: &[i64],
) -> Option<i64> {
    let remaining = expires_at - now;
    if remaining <= Duration::zero() {
        return None;
    }
    thresholds
        .iter()
        .copied()
        .filter(|days| remaining <= Duration::days(*days))
        .min()
}

/// Whole days left, rounded up
fn days_left(expires_at: DateTime<Utc>, now: DateTime<Utc>) -> i64 {
    let seconds = (expires_at - now).num_seconds().max(1);
    (seconds + 86_399) / 86_400
}

fn expired_message(property: &Property) -> String {
    format!(
        "Your listing \"{}\" has expired and is no longer visible.",
        property.title
    )
}

fn expiring_message(property: &Property, days: i64) -> String {
    format!(
        "Your listing \"{}\" expires in {} {}.",
        property.title,
        days,
        if days == 1 { "day" } else { "days" }
    )
}

pub struct ExpirationService {
    store: Arc<dyn ListingStore>,
    mailer: Arc<dyn Mailer>,
    cache: Option<Cache>,
    settings: ExpirationSettings,
}

impl ExpirationService {
    pub fn new(
        store: Arc<dyn ListingStore>,
        mailer: Arc<dyn Mailer>,
        cache: Option<Cache>,
        mut settings: ExpirationSettings,
    ) -> Self {
        settings.warning_days.retain(|d| *d > 0);
        settings.warning_days.sort_unstable();
        settings.warning_days.dedup();
        Self {
            store,
            mailer,
            cache,
            settings,
        }
    }

    /// Sends one email; failures are logged and reported as `false`
    async fn deliver(&self, template: EmailTemplate<'_>) -> bool {
        let message = template.render(&self.settings.mail_from, &self.settings.site_url);
        match self.mailer.send(&message).await {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(
                    mailer = self.mailer.name(),
                    to = %message.to,
                    error = %e,
                    "Failed to send expiration email"
                );
                false
            }
        }
    }

    /// Deactivates every overdue listing in one transaction, then emails owners
    pub async fn sweep_expired(&self, now: DateTime<Utc>) -> AppResult<SweepReport> {
        let expired = self.store.find_expired_properties(now).await?;
        if expired.is_empty() {
            return Ok(SweepReport::default());
        }

        let notifications: Vec<Notification> = expired
            .iter()
            .map(|p| {
                Notification::new(
                    p.owner_id,
                    Some(p.id),
                    NotificationKind::ListingExpired,
                    expired_message(p),
                    now,
                )
            })
            .collect();

        let deactivated = self.store.deactivate_listings(now, &notifications).await?;

        // Cached popular lists must not keep serving deactivated listings
        if let Some(cache) = self.cache.as_ref().filter(|_| !deactivated.is_empty()) {
            cache.invalidate_in_background(&popular_property_cache_keys());
        }

        let mut report = SweepReport {
            deactivated: deactivated.clone(),
            ..SweepReport::default()
        };

        for property in expired.iter().filter(|p| deactivated.contains(&p.id)) {
            if self.deliver(EmailTemplate::ListingExpired { property }).await {
                report.emails_sent += 1;
            } else {
                report.email_failures += 1;
            }
        }

        tracing::info!(
            deactivated = report.deactivated.len(),
            emails_sent = report.emails_sent,
            email_failures = report.email_failures,
            "Expiration sweep finished"
        );

        Ok(report)
    }

    /// Warns owners of listings entering a warning threshold
    pub async fn warn_expiring(&self, now: DateTime<Utc>) -> AppResult<WarningReport> {
        let mut report = WarningReport::default();
        let Some(&horizon) = self.settings.warning_days.last() else {
            return Ok(report);
        };

        let expiring = self
            .store
            .find_expiring_properties(now, now + Duration::days(horizon))
            .await?;

        for property in &expiring {
            let Some(expires_at) = property.expires_at else {
                continue;
            };
            let Some(threshold) = applicable_threshold(expires_at, now, &self.settings.warning_days)
            else {
                continue;
            };
            if property
                .last_expiry_warning_days
                .is_some_and(|last| last <= threshold)
            {
                continue;
            }

            let days = days_left(expires_at, now);
            let notification = Notification::new(
                property.owner_id,
                Some(property.id),
                NotificationKind::ListingExpiring,
                expiring_message(property, days),
                now,
            );

            // The store re-checks the threshold inside its transaction
            if !self
                .store
                .mark_expiry_warning(property.id, threshold, &notification)
                .await?
            {
                continue;
            }
            report.warned.push((property.id, threshold));

            let template = EmailTemplate::ListingExpiring {
                property,
                days_left: days,
            };
            if self.deliver(template).await {
                report.emails_sent += 1;
            } else {
                report.email_failures += 1;
            }
        }

        tracing::info!(
            warned = report.warned.len(),
            emails_sent = report.emails_sent,
            email_failures = report.email_failures,
            "Expiry warning pass finished"
        );

        Ok(report)
    }

    /// One sweep followed by one warning pass
    pub async fn run_cycle(&self, now: DateTime<Utc>) -> AppResult<CycleReport> {
        let sweep = self.sweep_expired(now).await?;
        let warnings = self.warn_expiring(now).await?;
        Ok(CycleReport { sweep, warnings })
    }
}

/// Handle for stopping the periodic expiration job
pub struct ExpirationJobHandle {
    shutdown_tx: mpsc::Sender<()>,
    task: JoinHandle<()>,
}

impl ExpirationJobHandle {
    /// Stops the job after any in-flight cycle and waits for it to exit
    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(()).await;
        if let Err(e) = self.task.await {
            tracing::error!(error = %e, "Expiration job panicked");
        }
        tracing::info!("Expiration job stopped");
    }
}

/// Runs `run_cycle` every `interval` until shut down; a failing cycle is
/// logged and retried on the next tick
pub fn spawn_expiration_job(
    service: Arc<ExpirationService>,
    interval: std::time::Duration,
) -> ExpirationJobHandle {
    let (shutdown_tx, mut shutdown_rx) = mpsc::channel(1);

    let task = tokio::spawn(async move {
        tracing::info!(interval_secs = interval.as_secs(), "Expiration job started");
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(e) = service.run_cycle(Utc::now()).await {
                        tracing::error!(error = %e, "Expiration cycle failed");
                    }
                }
                _ = shutdown_rx.recv() => break,
            }
        }
    });

    ExpirationJobHandle { shutdown_tx, task }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::store::MockListingStore;
    use crate::db::{ListingStore, MemoryStore, NotificationStore};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use crate::error::AppError;
    use crate::models::PropertyType;
    use crate::services::mailer::{LogMailer, MockMailer};

    fn settings() -> ExpirationSettings {
        ExpirationSettings {
            warning_days: vec![7, 3, 1],
            mail_from: "no-reply@estate.local".to_string(),
            site_url: "http://localhost:3000".to_string(),
        }
    }

    fn listing(expires_at: Option<DateTime<Utc>>) -> Property {
        Property {
            id: Uuid::new_v4(),
            owner_id: Uuid::new_v4(),
            agent_name: "Otieno".to_string(),
            agent_email: "otieno@example.com".to_string(),
            title: "Lakeview plot".to_string(),
            property_type: PropertyType::Land,
            county: "Kisumu".to_string(),
            price: 1_500_000.0,
            is_active: true,
            expires_at,
            last_expiry_warning_days: None,
            views: 0,
            created_at: Utc::now(),
        }
    }

    fn service_with(store: &MemoryStore, mailer: Arc<dyn Mailer>) -> ExpirationService {
        ExpirationService::new(Arc::new(store.clone()), mailer, None, settings())
    }

    #[test]
    fn test_applicable_threshold_picks_smallest_covering() {
        let now = Utc::now();
        let thresholds = [1, 3, 7];
        assert_eq!(applicable_threshold(now + Duration::days(10), now, &thresholds), None);
        assert_eq!(applicable_threshold(now + Duration::days(5), now, &thresholds), Some(7));
        assert_eq!(applicable_threshold(now + Duration::days(3), now, &thresholds), Some(3));
        assert_eq!(applicable_threshold(now + Duration::hours(2), now, &thresholds), Some(1));
        assert_eq!(applicable_threshold(now - Duration::hours(2), now, &thresholds), None);
    }

    #[test]
    fn test_days_left_rounds_up() {
        let now = Utc::now();
        assert_eq!(days_left(now + Duration::hours(1), now), 1);
        assert_eq!(days_left(now + Duration::hours(25), now), 2);
        assert_eq!(days_left(now + Duration::days(3), now), 3);
    }

    #[tokio::test]
    async fn test_sweep_deactivates_and_notifies() {
        let store = MemoryStore::new();
        let now = Utc::now();
        let overdue = listing(Some(now - Duration::minutes(5)));
        let current = listing(Some(now + Duration::days(30)));
        let open_ended = listing(None);
        for p in [&overdue, &current, &open_ended] {
            store.insert_property(p).await.unwrap();
        }

        let report = service_with(&store, Arc::new(LogMailer))
            .sweep_expired(now)
            .await
            .unwrap();

        assert_eq!(report.deactivated, vec![overdue.id]);
        assert_eq!(report.emails_sent, 1);
        assert!(!store.get_property(overdue.id).await.unwrap().unwrap().is_active);
        assert!(store.get_property(current.id).await.unwrap().unwrap().is_active);

        let notes = store.list_notifications(overdue.owner_id, true).await.unwrap();
        assert_eq!(notes.len(), 1);
        assert_eq!(notes[0].kind, NotificationKind::ListingExpired);
    }

    #[tokio::test]
    async fn test_sweep_is_idempotent() {
        let store = MemoryStore::new();
        let now = Utc::now();
        store
            .insert_property(&listing(Some(now - Duration::days(1))))
            .await
            .unwrap();
        let service = service_with(&store, Arc::new(LogMailer));

        assert_eq!(service.sweep_expired(now).await.unwrap().deactivated.len(), 1);
        assert_eq!(service.sweep_expired(now).await.unwrap(), SweepReport::default());
    }

    #[tokio::test]
    async fn test_mail_failure_does_not_undo_deactivation() {
        let store = MemoryStore::new();
        let now = Utc::now();
        let overdue = listing(Some(now - Duration::hours(1)));
        store.insert_property(&overdue).await.unwrap();

        let mut mailer = MockMailer::new();
        mailer
            .expect_send()
            .times(1)
            .returning(|_| Err(AppError::Mail("relay down".to_string())));
        mailer.expect_name().return_const("mock");

        let report = service_with(&store, Arc::new(mailer))
            .sweep_expired(now)
            .await
            .unwrap();

        assert_eq!(report.deactivated, vec![overdue.id]);
        assert_eq!(report.emails_sent, 0);
        assert_eq!(report.email_failures, 1);
        assert!(!store.get_property(overdue.id).await.unwrap().unwrap().is_active);
    }

    #[tokio::test]
    async fn test_warnings_fire_once_per_threshold() {
        let store = MemoryStore::new();
        let now = Utc::now();
        let soon = listing(Some(now + Duration::days(2)));
        let later = listing(Some(now + Duration::days(20)));
        store.insert_property(&soon).await.unwrap();
        store.insert_property(&later).await.unwrap();

        let mut mailer = MockMailer::new();
        mailer
            .expect_send()
            .withf(|m| m.subject.ends_with("expires in 2 days"))
            .times(1)
            .returning(|_| Ok(()));
        mailer.expect_name().return_const("mock");
        let service = service_with(&store, Arc::new(mailer));

        let first = service.warn_expiring(now).await.unwrap();
        assert_eq!(first.warned, vec![(soon.id, 3)]);
        assert_eq!(first.emails_sent, 1);

        let second = service.warn_expiring(now + Duration::hours(1)).await.unwrap();
        assert!(second.warned.is_empty());

        let notes = store.list_notifications(soon.owner_id, false).await.unwrap();
        assert_eq!(notes.len(), 1);
        assert_eq!(notes[0].kind, NotificationKind::ListingExpiring);
    }

    #[tokio::test]
    async fn test_smaller_threshold_warns_again() {
        let store = MemoryStore::new();
        let now = Utc::now();
        let listing = listing(Some(now + Duration::days(5)));
        store.insert_property(&listing).await.unwrap();
        let service = service_with(&store, Arc::new(LogMailer));

        let week = service.warn_expiring(now).await.unwrap();
        assert_eq!(week.warned, vec![(listing.id, 7)]);

        let later = now + Duration::days(4) + Duration::hours(12);
        let day = service.warn_expiring(later).await.unwrap();
        assert_eq!(day.warned, vec![(listing.id, 1)]);
    }

    #[tokio::test]
    async fn test_run_cycle_combines_passes() {
        let store = MemoryStore::new();
        let now = Utc::now();
        store
            .insert_property(&listing(Some(now - Duration::hours(1))))
            .await
            .unwrap();
        store
            .insert_property(&listing(Some(now + Duration::hours(12))))
            .await
            .unwrap();

        let report = service_with(&store, Arc::new(LogMailer))
            .run_cycle(now)
            .await
            .unwrap();
        assert_eq!(report.sweep.deactivated.len(), 1);
        assert_eq!(report.warnings.warned.len(), 1);
    }

    #[tokio::test]
    async fn test_job_runs_and_shuts_down() {
        let store = MemoryStore::new();
        let overdue = listing(Some(Utc::now() - Duration::hours(1)));
        store.insert_property(&overdue).await.unwrap();

        let service = Arc::new(service_with(&store, Arc::new(LogMailer)));
        let handle = spawn_expiration_job(service, std::time::Duration::from_secs(3600));

        // The first tick fires immediately
        tokio::time::sleep(std::time::Duration::from_millis(100)).await;
        handle.shutdown().await;

        assert!(!store.get_property(overdue.id).await.unwrap().unwrap().is_active);
    }

    #[tokio::test]
    async fn test_job_keeps_ticking_after_failed_cycle() {
        let sweeps = Arc::new(AtomicUsize::new(0));
        let counter = sweeps.clone();

        let mut store = MockListingStore::new();
        store.expect_find_expired_properties().returning(move |_| {
            if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                Err(AppError::Internal("database unavailable".to_string()))
            } else {
                Ok(Vec::new())
            }
        });
        store
            .expect_find_expiring_properties()
            .returning(|_, _| Ok(Vec::new()));

        let service = Arc::new(ExpirationService::new(
            Arc::new(store),
            Arc::new(LogMailer),
            None,
            settings(),
        ));
        // The first tick fails; later ticks must still run
        let handle = spawn_expiration_job(service, std::time::Duration::from_millis(20));
        tokio::time::sleep(std::time::Duration::from_millis(200)).await;
        handle.shutdown().await;

        assert!(sweeps.load(Ordering::SeqCst) >= 3);
    }
}
