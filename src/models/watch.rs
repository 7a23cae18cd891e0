use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use crate::models::CourseStatus;

/// One user's subscription to a course offering, joined with the user's
/// contact details and the course identity.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, PartialEq)]
pub struct Watch {
    pub id: i64,
    pub user_id: i64,
    pub course_id: i64,

    pub status: CourseStatus,
    pub notify_on_open: bool,
    pub last_checked: Option<DateTime<Utc>>,
    pub active: bool,

    // Course
    pub subject: String,
    pub course_number: String,
    pub course_name: Option<String>,
    pub term: String,

    // Owner contact
    pub email: String,
    pub phone: Option<String>,
}

impl Watch {
    /// "COMPSCI 1MD3"
    pub fn course_label(&self) -> String {
        format!("{} {}", self.subject, self.course_number)
    }

    pub fn has_phone(&self) -> bool {
        self.phone.as_deref().is_some_and(|p| !p.trim().is_empty())
    }
}

#[cfg(test)]
pub(crate) fn sample_watch(id: i64, status: CourseStatus) -> Watch {
    Watch {
        id,
        user_id: 1,
        course_id: id,
        status,
        notify_on_open: true,
        last_checked: None,
        active: true,
        subject: "COMPSCI".to_string(),
        course_number: format!("{}MD3", id),
        course_name: None,
        term: "2026 Winter".to_string(),
        email: "student@example.com".to_string(),
        phone: None,
    }
}
