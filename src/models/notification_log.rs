use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use crate::models::NotificationChannel;

/// Append-only record of a notification attempt. A row exists whether or not
/// the downstream channel accepted the message.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, PartialEq)]
pub struct NotificationRecord {
    pub id: i64,
    pub user_id: i64,
    pub course_watch_id: i64,
    pub notification_type: NotificationChannel,
    pub sent_at: DateTime<Utc>,
}
