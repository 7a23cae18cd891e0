// Integration tests for Seat Watcher
// These tests drive the sweep engine against a real SQLite store with
// in-process stand-ins for the browser and the notification channels.

pub mod runner_tests;
pub mod store_tests;
pub mod sweep_tests;

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

use seat_watcher::config::{AppConfig, DatabaseConfig};
use seat_watcher::engine::{SessionProvider, SqliteWatchStore, StatusExtractor, SweepScheduler};
use seat_watcher::models::{CourseStatus, NotificationChannel};
use seat_watcher::plugins::traits::NotificationResult;
use seat_watcher::plugins::{NotificationDispatcher, NotifierPlugin, OpenAlert};
use seat_watcher::{AppError, Result};

pub const SEARCH_URL: &str = "https://registrar.example.edu/class-search";

/// File-backed store in a throwaway directory. Keep the `TempDir` alive for
/// the duration of the test.
pub async fn create_test_store() -> anyhow::Result<(TempDir, Arc<SqliteWatchStore>)> {
    let dir = tempfile::tempdir()?;
    let config = DatabaseConfig {
        url: format!("sqlite://{}", dir.path().join("courses.db").display()),
        ..AppConfig::default().database
    };

    let store = SqliteWatchStore::connect(&config).await?;
    Ok((dir, Arc::new(store)))
}

/// Register a watch for `email` on COMPSCI `course_number` in the test term.
pub async fn add_watch(
    store: &SqliteWatchStore,
    email: &str,
    phone: Option<&str>,
    course_number: &str,
) -> anyhow::Result<i64> {
    let user_id = store.get_or_create_user(email, phone).await?;
    let course_id = store
        .get_or_create_course("COMPSCI", course_number, "2026 Winter", None)
        .await?;
    Ok(store.register_watch(user_id, course_id, true).await?)
}

pub struct StubSession;

/// Session provider whose logins fail a set number of times, optionally
/// cancelling a token on a given attempt.
#[derive(Default)]
pub struct StubProvider {
    pub opens: Arc<AtomicUsize>,
    pub closes: Arc<AtomicUsize>,
    pub fail_first: usize,
    pub cancel_on: Option<(usize, CancellationToken)>,
}

#[async_trait]
impl SessionProvider for StubProvider {
    type Session = StubSession;

    async fn open(&self) -> Result<StubSession> {
        let attempt = self.opens.fetch_add(1, Ordering::SeqCst) + 1;
        if let Some((n, token)) = &self.cancel_on {
            if attempt == *n {
                token.cancel();
            }
        }
        if attempt <= self.fail_first {
            return Err(AppError::Authentication("portal rejected credentials".to_string()));
        }
        Ok(StubSession)
    }

    async fn close(&self, _session: StubSession) {
        self.closes.fetch_add(1, Ordering::SeqCst);
    }
}

/// Reports statuses from a mutable table keyed by course number.
#[derive(Default)]
pub struct TableExtractor {
    statuses: Mutex<HashMap<String, Option<CourseStatus>>>,
}

impl TableExtractor {
    pub fn set(&self, course_number: &str, status: CourseStatus) {
        self.statuses
            .lock()
            .unwrap()
            .insert(course_number.to_string(), Some(status));
    }

    pub fn fail(&self, course_number: &str) {
        self.statuses.lock().unwrap().insert(course_number.to_string(), None);
    }
}

#[async_trait]
impl StatusExtractor<StubSession> for TableExtractor {
    async fn extract(
        &self,
        _session: &StubSession,
        subject: &str,
        course_number: &str,
        term: &str,
    ) -> Result<CourseStatus> {
        match self.statuses.lock().unwrap().get(course_number) {
            Some(Some(status)) => Ok(*status),
            Some(None) => Err(AppError::extraction(subject, course_number, term, "timed out")),
            None => Ok(CourseStatus::Closed),
        }
    }
}

/// Notifier that records every alert it is handed.
pub struct RecordingNotifier {
    channel: NotificationChannel,
    needs_phone: bool,
    succeed: bool,
    pub sent: Arc<Mutex<Vec<OpenAlert>>>,
}

impl RecordingNotifier {
    pub fn email() -> Self {
        Self {
            channel: NotificationChannel::Email,
            needs_phone: false,
            succeed: true,
            sent: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn sms() -> Self {
        Self {
            channel: NotificationChannel::Sms,
            needs_phone: true,
            ..Self::email()
        }
    }

    pub fn failing(mut self) -> Self {
        self.succeed = false;
        self
    }
}

#[async_trait]
impl NotifierPlugin for RecordingNotifier {
    fn channel(&self) -> NotificationChannel {
        self.channel
    }

    fn accepts(&self, alert: &OpenAlert) -> bool {
        !self.needs_phone || alert.phone.is_some()
    }

    async fn notify(&self, alert: &OpenAlert) -> Result<NotificationResult> {
        self.sent.lock().unwrap().push(alert.clone());
        if self.succeed {
            Ok(NotificationResult {
                success: true,
                message_id: Some(format!("{}-{}", self.channel, alert.course_number)),
                error: None,
            })
        } else {
            Err(AppError::delivery(self.channel.as_str(), "relay unavailable"))
        }
    }
}

pub fn create_scheduler(
    store: Arc<SqliteWatchStore>,
    extractor: Arc<TableExtractor>,
    dispatcher: NotificationDispatcher,
) -> SweepScheduler<StubSession> {
    SweepScheduler::new(store, extractor, dispatcher, SEARCH_URL).with_item_delay(Duration::ZERO)
}
