use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use super::notifiers::{EmailNotifier, SmsNotifier};
use super::traits::{NotifierPlugin, OpenAlert};
use crate::config::NotificationsConfig;
use crate::models::NotificationChannel;

pub type NotifierPluginBox = Box<dyn NotifierPlugin>;

/// Channels tried for every open alert, in order.
const DISPATCH_ORDER: [NotificationChannel; 2] = [NotificationChannel::Email, NotificationChannel::Sms];

/// What happened when an open alert was fanned out to the notifiers.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DispatchOutcome {
    pub attempted: Vec<NotificationChannel>,
    pub delivered: Vec<NotificationChannel>,
    pub failures: Vec<(NotificationChannel, String)>,
}

impl DispatchOutcome {
    /// The channel to record for this dispatch: `email`, `sms` or `both`,
    /// based on what was attempted.
    pub fn channel(&self) -> Option<NotificationChannel> {
        NotificationChannel::from_attempts(
            self.attempted.contains(&NotificationChannel::Email),
            self.attempted.contains(&NotificationChannel::Sms),
        )
    }

    pub fn all_delivered(&self) -> bool {
        !self.attempted.is_empty() && self.failures.is_empty()
    }
}

#[derive(Clone)]
pub struct NotificationDispatcher {
    notifiers: Arc<RwLock<HashMap<NotificationChannel, NotifierPluginBox>>>,
}

impl NotificationDispatcher {
    pub fn new() -> Self {
        Self {
            notifiers: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Email is always registered; SMS only once a provider is configured.
    pub async fn from_config(config: &NotificationsConfig) -> Self {
        let dispatcher = Self::new();

        if !config.smtp.has_credentials() {
            tracing::warn!("SMTP credentials not set; email alerts will fail until configured");
        }
        dispatcher
            .register_notifier(Box::new(EmailNotifier::new(config.smtp.clone())))
            .await;

        if config.sms.is_configured() {
            dispatcher
                .register_notifier(Box::new(SmsNotifier::new(config.sms.clone())))
                .await;
        } else {
            tracing::warn!("SMS provider not configured; text alerts are disabled");
        }

        dispatcher
    }

    /// Register a notifier plugin, replacing any previous one for its channel
    pub async fn register_notifier(&self, plugin: NotifierPluginBox) {
        let channel = plugin.channel();

        let mut notifiers = self.notifiers.write().await;
        notifiers.insert(channel, plugin);
    }

    /// List all registered channels
    pub async fn list_channels(&self) -> Vec<NotificationChannel> {
        let notifiers = self.notifiers.read().await;
        DISPATCH_ORDER
            .iter()
            .copied()
            .filter(|channel| notifiers.contains_key(channel))
            .collect()
    }

    /// Send an open alert through every registered channel that can reach the
    /// recipient. Delivery problems are logged and reported, never raised.
    pub async fn send_open_alert(&self, alert: &OpenAlert) -> DispatchOutcome {
        let notifiers = self.notifiers.read().await;
        let mut outcome = DispatchOutcome::default();

        for channel in DISPATCH_ORDER {
            let Some(notifier) = notifiers.get(&channel) else {
                continue;
            };
            if !notifier.accepts(alert) {
                continue;
            }

            outcome.attempted.push(channel);
            match notifier.notify(alert).await {
                Ok(result) if result.success => {
                    outcome.delivered.push(channel);
                }
                Ok(result) => {
                    let error = result.error.unwrap_or_else(|| "unknown failure".to_string());
                    tracing::error!(%channel, course = %alert.course_label(), "Failed to send alert: {}", error);
                    outcome.failures.push((channel, error));
                }
                Err(e) => {
                    tracing::error!(%channel, course = %alert.course_label(), "Failed to send alert: {}", e);
                    outcome.failures.push((channel, e.to_string()));
                }
            }
        }

        outcome
    }
}

impl Default for NotificationDispatcher {
    fn default() -> Self {
        Self::new()
    }
}
