use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::str::FromStr;

use crate::config::DatabaseConfig;
use crate::models::{CourseStatus, NotificationChannel, NotificationRecord, Watch};
use crate::utils::error::{AppError, Result};

/// Upper bound on concurrently active watches for one user.
pub const MAX_WATCHES_PER_USER: i64 = 2;

const WATCH_SELECT: &str = r#"
    SELECT
        cw.id,
        cw.user_id,
        cw.course_id,
        cw.status,
        cw.notify_on_open,
        cw.last_checked,
        cw.active,
        c.subject,
        c.course_number,
        c.course_name,
        c.term,
        u.email,
        u.phone
    FROM course_watches cw
    JOIN courses c ON cw.course_id = c.id
    JOIN users u ON cw.user_id = u.id
"#;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PurgeReport {
    pub notifications_deleted: u64,
    pub tokens_deleted: u64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreStats {
    pub total_users: i64,
    pub active_watches: i64,
    pub monitored_courses: i64,
}

/// Persistent registry of watches as seen by the polling engine.
#[async_trait]
pub trait WatchStore: Send + Sync {
    /// Active watches, never-checked first, then least recently checked.
    async fn list_active_ordered_by_staleness(&self) -> Result<Vec<Watch>>;

    async fn update_status(
        &self,
        watch_id: i64,
        status: CourseStatus,
        checked_at: DateTime<Utc>,
    ) -> Result<()>;

    async fn create_notification_record(
        &self,
        user_id: i64,
        watch_id: i64,
        channel: NotificationChannel,
    ) -> Result<i64>;

    /// Drop notification records older than `retention` and any used or
    /// expired password reset tokens.
    async fn purge_older_than(&self, retention: Duration) -> Result<PurgeReport>;
}

#[derive(Clone)]
pub struct SqliteWatchStore {
    pool: SqlitePool,
}

impl SqliteWatchStore {
    pub async fn connect(config: &DatabaseConfig) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(&config.url)?
            .create_if_missing(true)
            .foreign_keys(true);

        if let Some(parent) = options.clone().get_filename().parent() {
            if !parent.as_os_str().is_empty() && parent.to_str() != Some(":memory:") {
                std::fs::create_dir_all(parent)?;
            }
        }

        let pool = SqlitePoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(std::time::Duration::from_secs(config.acquire_timeout))
            .connect_with(options)
            .await?;

        let store = Self { pool };
        store.migrate().await?;
        tracing::debug!("Connected to watch store at {}", config.url);
        Ok(store)
    }

    /// Private in-memory database. Pinned to a single connection that never
    /// expires, otherwise each pooled connection would see its own empty DB.
    pub async fn in_memory() -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect("sqlite::memory:")
            .await?;

        let store = Self { pool };
        store.migrate().await?;
        Ok(store)
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }

    pub async fn get_or_create_user(&self, email: &str, phone: Option<&str>) -> Result<i64> {
        let existing: Option<i64> = sqlx::query_scalar("SELECT id FROM users WHERE email = ?")
            .bind(email)
            .fetch_optional(&self.pool)
            .await?;

        if let Some(id) = existing {
            return Ok(id);
        }

        let result = sqlx::query("INSERT INTO users (email, phone) VALUES (?, ?)")
            .bind(email)
            .bind(phone)
            .execute(&self.pool)
            .await?;

        Ok(result.last_insert_rowid())
    }

    pub async fn get_or_create_course(
        &self,
        subject: &str,
        course_number: &str,
        term: &str,
        course_name: Option<&str>,
    ) -> Result<i64> {
        let existing: Option<i64> = sqlx::query_scalar(
            "SELECT id FROM courses WHERE subject = ? AND course_number = ? AND term = ?",
        )
        .bind(subject)
        .bind(course_number)
        .bind(term)
        .fetch_optional(&self.pool)
        .await?;

        if let Some(id) = existing {
            return Ok(id);
        }

        let result = sqlx::query(
            "INSERT INTO courses (subject, course_number, course_name, term) VALUES (?, ?, ?, ?)",
        )
        .bind(subject)
        .bind(course_number)
        .bind(course_name)
        .bind(term)
        .execute(&self.pool)
        .await?;

        Ok(result.last_insert_rowid())
    }

    /// Register interest in a course. A previously deactivated watch for the
    /// same course is revived with a fresh `closed` baseline.
    pub async fn register_watch(
        &self,
        user_id: i64,
        course_id: i64,
        notify_on_open: bool,
    ) -> Result<i64> {
        let mut tx = self.pool.begin().await?;

        let existing: Option<(i64, bool)> = sqlx::query_as(
            "SELECT id, active FROM course_watches WHERE user_id = ? AND course_id = ?",
        )
        .bind(user_id)
        .bind(course_id)
        .fetch_optional(&mut *tx)
        .await?;

        if let Some((_, true)) = existing {
            return Err(AppError::Validation(
                "You are already watching this course".to_string(),
            ));
        }

        let active_count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM course_watches WHERE user_id = ? AND active = 1",
        )
        .bind(user_id)
        .fetch_one(&mut *tx)
        .await?;

        if active_count >= MAX_WATCHES_PER_USER {
            return Err(AppError::Validation(format!(
                "You can only watch up to {} courses",
                MAX_WATCHES_PER_USER
            )));
        }

        let watch_id = match existing {
            Some((watch_id, _)) => {
                sqlx::query(
                    r#"
                    UPDATE course_watches
                    SET active = 1, notify_on_open = ?, status = ?, last_checked = NULL
                    WHERE id = ?
                    "#,
                )
                .bind(notify_on_open)
                .bind(CourseStatus::default())
                .bind(watch_id)
                .execute(&mut *tx)
                .await?;
                watch_id
            }
            None => sqlx::query(
                "INSERT INTO course_watches (user_id, course_id, notify_on_open) VALUES (?, ?, ?)",
            )
            .bind(user_id)
            .bind(course_id)
            .bind(notify_on_open)
            .execute(&mut *tx)
            .await?
            .last_insert_rowid(),
        };

        tx.commit().await?;
        Ok(watch_id)
    }

    pub async fn deactivate_watch(&self, watch_id: i64) -> Result<()> {
        let result = sqlx::query("UPDATE course_watches SET active = 0 WHERE id = ?")
            .bind(watch_id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound {
                resource: format!("course watch {}", watch_id),
            });
        }
        Ok(())
    }

    pub async fn get_watch(&self, watch_id: i64) -> Result<Watch> {
        let query = format!("{} WHERE cw.id = ?", WATCH_SELECT);
        sqlx::query_as::<_, Watch>(&query)
            .bind(watch_id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| AppError::NotFound {
                resource: format!("course watch {}", watch_id),
            })
    }

    pub async fn list_notification_records(&self, watch_id: i64) -> Result<Vec<NotificationRecord>> {
        let records = sqlx::query_as::<_, NotificationRecord>(
            r#"
            SELECT id, user_id, course_watch_id, notification_type, sent_at
            FROM notifications
            WHERE course_watch_id = ?
            ORDER BY id ASC
            "#,
        )
        .bind(watch_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(records)
    }

    pub async fn stats(&self) -> Result<StoreStats> {
        let total_users: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM users")
            .fetch_one(&self.pool)
            .await?;
        let active_watches: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM course_watches WHERE active = 1")
                .fetch_one(&self.pool)
                .await?;
        let monitored_courses: i64 = sqlx::query_scalar(
            "SELECT COUNT(DISTINCT course_id) FROM course_watches WHERE active = 1",
        )
        .fetch_one(&self.pool)
        .await?;

        Ok(StoreStats {
            total_users,
            active_watches,
            monitored_courses,
        })
    }

    /// Retention with an explicit clock, so callers can purge relative to a
    /// fixed instant.
    pub async fn purge_before(&self, cutoff: DateTime<Utc>, now: DateTime<Utc>) -> Result<PurgeReport> {
        let mut tx = self.pool.begin().await?;

        // julianday() normalises both RFC 3339 and SQLite CURRENT_TIMESTAMP text.
        let notifications_deleted =
            sqlx::query("DELETE FROM notifications WHERE julianday(sent_at) < julianday(?)")
                .bind(cutoff)
                .execute(&mut *tx)
                .await?
                .rows_affected();

        let tokens_deleted = sqlx::query(
            "DELETE FROM password_reset_tokens WHERE used = 1 OR julianday(expires_at) < julianday(?)",
        )
        .bind(now)
        .execute(&mut *tx)
        .await?
        .rows_affected();

        tx.commit().await?;

        Ok(PurgeReport {
            notifications_deleted,
            tokens_deleted,
        })
    }
}

#[async_trait]
impl WatchStore for SqliteWatchStore {
    async fn list_active_ordered_by_staleness(&self) -> Result<Vec<Watch>> {
        let query = format!(
            "{} WHERE cw.active = 1 ORDER BY cw.last_checked IS NOT NULL, cw.last_checked ASC, cw.id ASC",
            WATCH_SELECT
        );

        let watches = sqlx::query_as::<_, Watch>(&query)
            .fetch_all(&self.pool)
            .await?;

        Ok(watches)
    }

    async fn update_status(
        &self,
        watch_id: i64,
        status: CourseStatus,
        checked_at: DateTime<Utc>,
    ) -> Result<()> {
        let result = sqlx::query(
            "UPDATE course_watches SET status = ?, last_checked = ? WHERE id = ?",
        )
        .bind(status)
        .bind(checked_at)
        .bind(watch_id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::Persistence(sqlx::Error::RowNotFound));
        }
        Ok(())
    }

    async fn create_notification_record(
        &self,
        user_id: i64,
        watch_id: i64,
        channel: NotificationChannel,
    ) -> Result<i64> {
        let result = sqlx::query(
            r#"
            INSERT INTO notifications (user_id, course_watch_id, notification_type, sent_at)
            VALUES (?, ?, ?, ?)
            "#,
        )
        .bind(user_id)
        .bind(watch_id)
        .bind(channel)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        Ok(result.last_insert_rowid())
    }

    async fn purge_older_than(&self, retention: Duration) -> Result<PurgeReport> {
        let now = Utc::now();
        self.purge_before(now - retention, now).await
    }
}
