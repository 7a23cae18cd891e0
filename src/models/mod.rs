use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

pub mod notification_log;
pub mod watch;

// Re-exports for convenience
pub use notification_log::*;
pub use watch::*;

/// Availability of a course offering as last observed on the registration site.
///
/// `NotFound` means the search returned no sections at all, which is distinct
/// from `Closed` (sections exist but are full).
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(type_name = "TEXT")]
pub enum CourseStatus {
    #[sqlx(rename = "open")]
    Open,
    #[default]
    #[sqlx(rename = "closed")]
    Closed,
    #[sqlx(rename = "waitlist")]
    Waitlist,
    #[sqlx(rename = "not_found")]
    NotFound,
}

impl CourseStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CourseStatus::Open => "open",
            CourseStatus::Closed => "closed",
            CourseStatus::Waitlist => "waitlist",
            CourseStatus::NotFound => "not_found",
        }
    }

    pub fn is_open(&self) -> bool {
        matches!(self, CourseStatus::Open)
    }
}

impl fmt::Display for CourseStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CourseStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "open" => Ok(CourseStatus::Open),
            "closed" => Ok(CourseStatus::Closed),
            "waitlist" => Ok(CourseStatus::Waitlist),
            "not_found" => Ok(CourseStatus::NotFound),
            other => Err(format!("unknown course status '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(type_name = "TEXT")]
pub enum NotificationChannel {
    #[sqlx(rename = "email")]
    Email,
    #[sqlx(rename = "sms")]
    Sms,
    #[sqlx(rename = "both")]
    Both,
}

impl NotificationChannel {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationChannel::Email => "email",
            NotificationChannel::Sms => "sms",
            NotificationChannel::Both => "both",
        }
    }

    /// Collapse the set of channels an alert went out on into the value stored
    /// on the notification record. `None` when nothing was attempted.
    pub fn from_attempts(email: bool, sms: bool) -> Option<Self> {
        match (email, sms) {
            (true, true) => Some(NotificationChannel::Both),
            (true, false) => Some(NotificationChannel::Email),
            (false, true) => Some(NotificationChannel::Sms),
            (false, false) => None,
        }
    }
}

impl fmt::Display for NotificationChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
