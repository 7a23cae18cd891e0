use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::engine::database::WatchStore;
use crate::models::{CourseStatus, Watch};
use crate::utils::error::Result;

/// The status pair produced by one check of a watch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transition {
    pub changed: bool,
    pub previous: CourseStatus,
    pub current: CourseStatus,
}

impl Transition {
    pub fn between(previous: CourseStatus, current: CourseStatus) -> Self {
        Self {
            changed: previous != current,
            previous,
            current,
        }
    }

    /// Alert only on entry into `open`, and only for owners who asked for it.
    pub fn should_notify(&self, notify_on_open: bool) -> bool {
        self.changed && self.current.is_open() && notify_on_open
    }
}

/// Compares a fresh status with the stored one and writes the result back.
#[derive(Clone)]
pub struct ChangeRecorder {
    store: Arc<dyn WatchStore>,
}

impl ChangeRecorder {
    pub fn new(store: Arc<dyn WatchStore>) -> Self {
        Self { store }
    }

    /// Persist `new_status` and a fresh check time whether or not the status
    /// moved; the check time drives staleness ordering for the next sweep.
    pub async fn apply(&self, watch: &Watch, new_status: CourseStatus) -> Result<Transition> {
        let transition = Transition::between(watch.status, new_status);

        self.store
            .update_status(watch.id, new_status, Utc::now())
            .await?;

        if transition.changed {
            tracing::info!(
                watch_id = watch.id,
                course = %watch.course_label(),
                "Status changed: {} -> {}",
                transition.previous,
                transition.current
            );
        }

        Ok(transition)
    }
}
