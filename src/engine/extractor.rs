use async_trait::async_trait;

use crate::models::CourseStatus;
use crate::utils::error::Result;

/// Reads the current availability of one course offering through a live
/// session.
///
/// Implementations must not touch the watch store. They may retry internally;
/// a failure returned here is final for the current sweep and should be an
/// `AppError::Extraction`.
#[async_trait]
pub trait StatusExtractor<S: Send + Sync>: Send + Sync {
    async fn extract(
        &self,
        session: &S,
        subject: &str,
        course_number: &str,
        term: &str,
    ) -> Result<CourseStatus>;
}
