use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::models::{NotificationChannel, Watch};
use crate::utils::error::Result;

/// Everything a notifier needs to tell a user their course opened up.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OpenAlert {
    pub email: String,
    pub phone: Option<String>,
    pub subject: String,
    pub course_number: String,
    pub course_name: Option<String>,
    pub term: String,
    pub registration_url: String,
}

impl OpenAlert {
    pub fn for_watch(watch: &Watch, registration_url: &str) -> Self {
        Self {
            email: watch.email.clone(),
            phone: if watch.has_phone() { watch.phone.clone() } else { None },
            subject: watch.subject.clone(),
            course_number: watch.course_number.clone(),
            course_name: watch.course_name.clone(),
            term: watch.term.clone(),
            registration_url: registration_url.to_string(),
        }
    }

    pub fn course_label(&self) -> String {
        format!("{} {}", self.subject, self.course_number)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationResult {
    pub success: bool,
    pub message_id: Option<String>,
    pub error: Option<String>,
}

/// A delivery channel for open alerts (email, SMS).
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait NotifierPlugin: Send + Sync {
    fn channel(&self) -> NotificationChannel;

    /// Whether this channel can reach the alert's recipient at all.
    fn accepts(&self, alert: &OpenAlert) -> bool;

    async fn notify(&self, alert: &OpenAlert) -> Result<NotificationResult>;
}
