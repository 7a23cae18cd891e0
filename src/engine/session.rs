use async_trait::async_trait;
use std::time::Duration;

use crate::utils::error::{AppError, Result};

/// Sweeps between forced session restarts. At a 5 minute interval this is
/// roughly ten days of continuous running.
pub const DEFAULT_RESTART_THRESHOLD: u64 = 2880;

/// Upper bound on launching a session and completing the login flow.
pub const DEFAULT_LOGIN_TIMEOUT: Duration = Duration::from_secs(30);

/// Creates and destroys authenticated automation sessions.
#[async_trait]
pub trait SessionProvider: Send + Sync {
    type Session: Send + Sync;

    /// Start a new session and log in with it.
    async fn open(&self) -> Result<Self::Session>;

    /// Tear a session down. Failures are the provider's to log.
    async fn close(&self, session: Self::Session);
}

/// Sole owner of the live automation session.
///
/// The session is created lazily on `acquire`, reused across sweeps, and
/// dropped through the provider on `release`.
pub struct SessionManager<P: SessionProvider> {
    provider: P,
    session: Option<P::Session>,
    restart_threshold: u64,
    login_timeout: Duration,
}

impl<P: SessionProvider> SessionManager<P> {
    pub fn new(provider: P) -> Self {
        Self {
            provider,
            session: None,
            restart_threshold: DEFAULT_RESTART_THRESHOLD,
            login_timeout: DEFAULT_LOGIN_TIMEOUT,
        }
    }

    pub fn with_restart_threshold(mut self, threshold: u64) -> Self {
        self.restart_threshold = threshold;
        self
    }

    pub fn with_login_timeout(mut self, timeout: Duration) -> Self {
        self.login_timeout = timeout;
        self
    }

    pub fn is_live(&self) -> bool {
        self.session.is_some()
    }

    /// Return the live session, logging in first if there is none.
    ///
    /// Every failure on the login path surfaces as `AppError::Authentication`.
    pub async fn acquire(&mut self) -> Result<&P::Session> {
        if self.session.is_none() {
            tracing::info!("Logging in to registration site...");
            let session = match tokio::time::timeout(self.login_timeout, self.provider.open()).await {
                Ok(Ok(session)) => session,
                Ok(Err(AppError::Authentication(message))) => {
                    return Err(AppError::Authentication(message));
                }
                Ok(Err(e)) => return Err(AppError::Authentication(e.to_string())),
                Err(_) => {
                    return Err(AppError::Authentication(format!(
                        "login did not complete within {}s",
                        self.login_timeout.as_secs_f64()
                    )));
                }
            };
            tracing::info!("Logged in successfully");
            self.session = Some(session);
        }

        self.session
            .as_ref()
            .ok_or_else(|| AppError::Internal("session missing after login".to_string()))
    }

    /// True when `completed_sweeps` is a positive multiple of the restart
    /// threshold.
    pub fn should_restart(&self, completed_sweeps: u64) -> bool {
        self.restart_threshold > 0
            && completed_sweeps > 0
            && completed_sweeps % self.restart_threshold == 0
    }

    /// Close the live session, if any. Safe to call repeatedly.
    pub async fn release(&mut self) {
        if let Some(session) = self.session.take() {
            tracing::info!("Closing automation session");
            self.provider.close(session).await;
        }
    }
}
