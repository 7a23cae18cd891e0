use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Authentication error: {0}")]
    Authentication(String),

    #[error("Extraction error: {subject} {course_number} ({term}): {message}")]
    Extraction {
        subject: String,
        course_number: String,
        term: String,
        message: String,
    },

    #[error("Persistence error: {0}")]
    Persistence(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("Notification delivery error: {channel}: {message}")]
    NotificationDelivery { channel: String, message: String },

    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Not found: {resource}")]
    NotFound { resource: String },

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    pub fn extraction(
        subject: &str,
        course_number: &str,
        term: &str,
        message: impl Into<String>,
    ) -> Self {
        AppError::Extraction {
            subject: subject.to_string(),
            course_number: course_number.to_string(),
            term: term.to_string(),
            message: message.into(),
        }
    }

    pub fn delivery(channel: impl Into<String>, message: impl Into<String>) -> Self {
        AppError::NotificationDelivery {
            channel: channel.into(),
            message: message.into(),
        }
    }

    /// Errors that only cost the current watch its check; the sweep moves on.
    pub fn is_item_scoped(&self) -> bool {
        matches!(self, AppError::Extraction { .. } | AppError::Persistence(_))
    }

    /// Errors that end the current sweep before any watch is checked.
    pub fn is_sweep_fatal(&self) -> bool {
        matches!(self, AppError::Authentication(_))
    }
}

// Result type alias for convenience
pub type Result<T> = std::result::Result<T, AppError>;
