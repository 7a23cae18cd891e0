use chrono::Duration as RetentionWindow;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::engine::database::WatchStore;
use crate::engine::extractor::StatusExtractor;
use crate::engine::recorder::ChangeRecorder;
use crate::models::{NotificationChannel, Watch};
use crate::plugins::{NotificationDispatcher, OpenAlert};
use crate::utils::error::Result;

/// Pause between consecutive watch checks within one sweep.
pub const INTER_ITEM_DELAY: Duration = Duration::from_secs(2);

/// Age beyond which notification records are purged.
pub const RETENTION_DAYS: i64 = 4;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SweepSummary {
    pub total: usize,
    pub checked: usize,
    pub changed: usize,
    pub errors: usize,
    pub notifications: usize,
    pub duration_ms: u64,
}

/// Runs one pass over every active watch using a borrowed session.
pub struct SweepScheduler<S: Send + Sync> {
    store: Arc<dyn WatchStore>,
    extractor: Arc<dyn StatusExtractor<S>>,
    recorder: ChangeRecorder,
    dispatcher: NotificationDispatcher,
    registration_url: String,
    item_delay: Duration,
    retention: RetentionWindow,
}

enum ItemOutcome {
    Unchanged,
    Changed { notified: bool },
}

impl<S: Send + Sync> SweepScheduler<S> {
    pub fn new(
        store: Arc<dyn WatchStore>,
        extractor: Arc<dyn StatusExtractor<S>>,
        dispatcher: NotificationDispatcher,
        registration_url: impl Into<String>,
    ) -> Self {
        Self {
            recorder: ChangeRecorder::new(store.clone()),
            store,
            extractor,
            dispatcher,
            registration_url: registration_url.into(),
            item_delay: INTER_ITEM_DELAY,
            retention: RetentionWindow::days(RETENTION_DAYS),
        }
    }

    pub fn with_item_delay(mut self, delay: Duration) -> Self {
        self.item_delay = delay;
        self
    }

    /// Check every active watch once, stalest first.
    ///
    /// Only a failure to list the watches is returned as an error; problems
    /// with individual watches are counted in the summary.
    pub async fn run_sweep(&self, session: &S) -> Result<SweepSummary> {
        let started = Instant::now();
        let watches = self.store.list_active_ordered_by_staleness().await?;

        let mut summary = SweepSummary {
            total: watches.len(),
            ..SweepSummary::default()
        };

        if watches.is_empty() {
            tracing::info!("No active course watches to check");
        } else {
            tracing::info!("Checking {} course watch(es)", watches.len());
        }

        for (index, watch) in watches.iter().enumerate() {
            tracing::debug!(
                watch_id = watch.id,
                course = %watch.course_label(),
                term = %watch.term,
                "[{}/{}] Checking watch",
                index + 1,
                watches.len()
            );

            match self.check_watch(session, watch).await {
                Ok(ItemOutcome::Unchanged) => {
                    summary.checked += 1;
                }
                Ok(ItemOutcome::Changed { notified }) => {
                    summary.checked += 1;
                    summary.changed += 1;
                    if notified {
                        summary.notifications += 1;
                    }
                }
                Err(e) if e.is_item_scoped() => {
                    tracing::warn!(
                        watch_id = watch.id,
                        course = %watch.course_label(),
                        "Skipping watch this sweep: {}",
                        e
                    );
                    summary.errors += 1;
                }
                Err(e) => {
                    tracing::error!(
                        watch_id = watch.id,
                        course = %watch.course_label(),
                        "Unexpected error checking watch: {}",
                        e
                    );
                    summary.errors += 1;
                }
            }

            if !self.item_delay.is_zero() {
                tokio::time::sleep(self.item_delay).await;
            }
        }

        self.run_maintenance().await;

        summary.duration_ms = started.elapsed().as_millis() as u64;
        record_metrics(&summary);

        tracing::info!(
            checked = summary.checked,
            changed = summary.changed,
            errors = summary.errors,
            notifications = summary.notifications,
            "Sweep complete in {}ms",
            summary.duration_ms
        );

        Ok(summary)
    }

    async fn check_watch(&self, session: &S, watch: &Watch) -> Result<ItemOutcome> {
        let status = self
            .extractor
            .extract(session, &watch.subject, &watch.course_number, &watch.term)
            .await?;

        let transition = self.recorder.apply(watch, status).await?;
        if !transition.changed {
            return Ok(ItemOutcome::Unchanged);
        }

        let notified = if transition.should_notify(watch.notify_on_open) {
            self.notify_open(watch).await;
            true
        } else {
            false
        };

        Ok(ItemOutcome::Changed { notified })
    }

    /// Send the alert and append a record of the attempt. Nothing here can
    /// fail the watch: its new status is already stored.
    async fn notify_open(&self, watch: &Watch) {
        let alert = OpenAlert::for_watch(watch, &self.registration_url);
        let outcome = self.dispatcher.send_open_alert(&alert).await;

        if outcome.attempted.is_empty() {
            tracing::warn!(
                watch_id = watch.id,
                course = %watch.course_label(),
                "No notifier could reach the watch owner"
            );
        } else if outcome.all_delivered() {
            tracing::info!(
                watch_id = watch.id,
                course = %watch.course_label(),
                channels = ?outcome.delivered,
                "Open alert delivered"
            );
        } else {
            tracing::warn!(
                watch_id = watch.id,
                course = %watch.course_label(),
                delivered = ?outcome.delivered,
                failed = outcome.failures.len(),
                "Open alert only partly delivered"
            );
        }

        let channel = outcome.channel().unwrap_or(NotificationChannel::Email);
        if let Err(e) = self
            .store
            .create_notification_record(watch.user_id, watch.id, channel)
            .await
        {
            tracing::error!(watch_id = watch.id, "Failed to record notification: {}", e);
        }

        metrics::counter!("seat_watcher_notifications_total", "channel" => channel.as_str())
            .increment(1);
    }

    async fn run_maintenance(&self) {
        match self.store.purge_older_than(self.retention).await {
            Ok(report) => {
                if report.notifications_deleted > 0 || report.tokens_deleted > 0 {
                    tracing::info!(
                        notifications = report.notifications_deleted,
                        tokens = report.tokens_deleted,
                        "Purged expired records"
                    );
                }
            }
            Err(e) => tracing::warn!("Retention maintenance failed: {}", e),
        }
    }
}

fn record_metrics(summary: &SweepSummary) {
    metrics::counter!("seat_watcher_sweeps_total").increment(1);
    metrics::counter!("seat_watcher_watches_checked_total").increment(summary.checked as u64);
    metrics::counter!("seat_watcher_status_changes_total").increment(summary.changed as u64);
    metrics::counter!("seat_watcher_check_errors_total").increment(summary.errors as u64);
    metrics::gauge!("seat_watcher_active_watches").set(summary.total as f64);
    metrics::histogram!("seat_watcher_sweep_duration_seconds")
        .record(summary.duration_ms as f64 / 1000.0);
}

impl SweepSummary {
    pub fn had_errors(&self) -> bool {
        self.errors > 0
    }
}

impl fmt::Display for SweepSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{} checked, {} changed, {} error(s), {} notification(s) in {}ms",
            self.checked, self.total, self.changed, self.errors, self.notifications, self.duration_ms
        )
    }
}
