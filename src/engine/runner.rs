use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::engine::scheduler::{SweepScheduler, SweepSummary};
use crate::engine::session::{SessionManager, SessionProvider};
use crate::utils::error::Result;

pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(5 * 60);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RunnerState {
    Running,
    Stopped,
}

/// Drives sweeps back to back on one long-lived session until cancelled.
pub struct ContinuousRunner<P: SessionProvider> {
    sessions: SessionManager<P>,
    scheduler: SweepScheduler<P::Session>,
    interval: Duration,
    sweep_count: u64,
    failed_sweeps: u64,
    state: RunnerState,
}

impl<P: SessionProvider> ContinuousRunner<P> {
    pub fn new(sessions: SessionManager<P>, scheduler: SweepScheduler<P::Session>) -> Self {
        Self {
            sessions,
            scheduler,
            interval: DEFAULT_INTERVAL,
            sweep_count: 0,
            failed_sweeps: 0,
            state: RunnerState::Stopped,
        }
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn sweep_count(&self) -> u64 {
        self.sweep_count
    }

    pub fn failed_sweeps(&self) -> u64 {
        self.failed_sweeps
    }

    pub fn state(&self) -> RunnerState {
        self.state
    }

    /// One sweep on a fresh login, then log out.
    pub async fn run_once(&mut self) -> Result<SweepSummary> {
        let result = self.sweep().await;
        self.sessions.release().await;
        result
    }

    /// Sweep, sleep, repeat. Returns once `cancel` fires; a sweep already in
    /// progress is allowed to finish first.
    pub async fn run(&mut self, cancel: CancellationToken) {
        self.state = RunnerState::Running;
        tracing::info!(
            "Starting continuous monitoring (interval: {}s)",
            self.interval.as_secs()
        );

        loop {
            if cancel.is_cancelled() {
                break;
            }

            if let Err(e) = self.sweep().await {
                self.failed_sweeps += 1;
                metrics::counter!("seat_watcher_failed_sweeps_total").increment(1);
                tracing::error!("Sweep failed: {}", e);
                self.sessions.release().await;
            }

            tracing::debug!("Waiting {}s before next sweep", self.interval.as_secs());
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(self.interval) => {}
            }
        }

        self.sessions.release().await;
        self.state = RunnerState::Stopped;
        tracing::info!(
            sweeps = self.sweep_count,
            failed = self.failed_sweeps,
            "Continuous monitoring stopped"
        );
    }

    async fn sweep(&mut self) -> Result<SweepSummary> {
        if self.sessions.should_restart(self.sweep_count) {
            tracing::info!(
                "Restarting session after {} sweeps",
                self.sweep_count
            );
            self.sessions.release().await;
        }

        let session = self.sessions.acquire().await?;
        let summary = self.scheduler.run_sweep(session).await?;
        self.sweep_count += 1;

        tracing::info!(sweep = self.sweep_count, "Sweep #{}: {}", self.sweep_count, summary);
        Ok(summary)
    }
}
