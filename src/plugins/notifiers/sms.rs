use crate::config::SmsConfig;
use crate::models::NotificationChannel;
use crate::plugins::traits::{NotificationResult, NotifierPlugin, OpenAlert};
use crate::utils::error::{AppError, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;

const CHANNEL: &str = "sms";

/// Subset of the Twilio message resource we care about.
#[derive(Debug, Deserialize)]
struct MessageResource {
    sid: Option<String>,
    status: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    message: Option<String>,
}

/// Sends open alerts as text messages through a Twilio-compatible REST API.
pub struct SmsNotifier {
    client: Client,
    config: SmsConfig,
}

impl SmsNotifier {
    pub fn new(config: SmsConfig) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(15))
            .build()
            .unwrap_or_else(|_| Client::new());

        SmsNotifier { client, config }
    }

    fn format_message(&self, alert: &OpenAlert) -> String {
        format!(
            "{} ({}) is now OPEN! Register at {}",
            alert.course_label(),
            alert.term,
            alert.registration_url
        )
    }

    fn messages_url(&self, account_sid: &str) -> String {
        format!(
            "{}/2010-04-01/Accounts/{}/Messages.json",
            self.config.api_base.trim_end_matches('/'),
            account_sid
        )
    }
}

#[async_trait]
impl NotifierPlugin for SmsNotifier {
    fn channel(&self) -> NotificationChannel {
        NotificationChannel::Sms
    }

    fn accepts(&self, alert: &OpenAlert) -> bool {
        alert.phone.is_some()
    }

    async fn notify(&self, alert: &OpenAlert) -> Result<NotificationResult> {
        let (account_sid, auth_token, from_number) = match (
            &self.config.account_sid,
            &self.config.auth_token,
            &self.config.from_number,
        ) {
            (Some(sid), Some(token), Some(from)) => (sid, token, from),
            _ => return Err(AppError::delivery(CHANNEL, "SMS provider is not configured")),
        };

        let to = alert
            .phone
            .as_deref()
            .ok_or_else(|| AppError::delivery(CHANNEL, "recipient has no phone number"))?;

        let body = self.format_message(alert);
        let params = [("To", to), ("From", from_number.as_str()), ("Body", body.as_str())];

        let response = self
            .client
            .post(self.messages_url(account_sid))
            .basic_auth(account_sid, Some(auth_token))
            .form(&params)
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            let resource: MessageResource = response.json().await?;
            tracing::info!(
                to = %to,
                course = %alert.course_label(),
                status = resource.status.as_deref().unwrap_or("unknown"),
                "SMS queued"
            );
            Ok(NotificationResult {
                success: true,
                message_id: resource.sid,
                error: None,
            })
        } else {
            let detail = response
                .json::<ApiError>()
                .await
                .ok()
                .and_then(|e| e.message)
                .unwrap_or_else(|| status.to_string());
            Ok(NotificationResult {
                success: false,
                message_id: None,
                error: Some(format!("SMS API returned {}: {}", status.as_u16(), detail)),
            })
        }
    }
}
