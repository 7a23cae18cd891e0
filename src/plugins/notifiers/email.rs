use crate::config::SmtpConfig;
use crate::models::NotificationChannel;
use crate::plugins::traits::{NotificationResult, NotifierPlugin, OpenAlert};
use crate::utils::error::{AppError, Result};
use async_trait::async_trait;
use lettre::message::{header, Mailbox, MultiPart, SinglePart};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};

const CHANNEL: &str = "email";

pub struct EmailNotifier {
    config: SmtpConfig,
}

impl EmailNotifier {
    pub fn new(config: SmtpConfig) -> Self {
        EmailNotifier { config }
    }

    fn format_subject(&self, alert: &OpenAlert) -> String {
        format!("{} is now OPEN!", alert.course_label())
    }

    fn format_html_body(&self, alert: &OpenAlert) -> String {
        let name_line = alert
            .course_name
            .as_ref()
            .map(|name| format!(r#"<p style="margin: 5px 0;"><strong>Title:</strong> {}</p>"#, name))
            .unwrap_or_default();

        format!(
            r#"<!DOCTYPE html>
<html>
<body style="font-family: Arial, sans-serif; padding: 20px;">
    <h2 style="color: #7A003C;">Course Now Available!</h2>
    <p>Good news! A course you're tracking is now open for registration:</p>
    <div style="background-color: #f5f5f5; padding: 15px; border-left: 4px solid #7A003C; margin: 20px 0;">
        <p style="margin: 5px 0;"><strong>Course:</strong> {course}</p>
        {name_line}
        <p style="margin: 5px 0;"><strong>Term:</strong> {term}</p>
        <p style="margin: 5px 0;"><strong>Status:</strong> <span style="color: green; font-weight: bold;">OPEN</span></p>
    </div>
    <p><strong>Register now before seats fill up!</strong></p>
    <p><a href="{url}" style="background-color: #7A003C; color: white; padding: 10px 20px; text-decoration: none; border-radius: 5px;">Go to registration</a></p>
    <hr style="margin-top: 30px; border: none; border-top: 1px solid #ddd;">
    <p style="color: #666; font-size: 12px;">You're receiving this because you're watching this course.</p>
</body>
</html>
"#,
            course = alert.course_label(),
            name_line = name_line,
            term = alert.term,
            url = alert.registration_url,
        )
    }

    fn format_text_body(&self, alert: &OpenAlert) -> String {
        let mut text = String::new();

        text.push_str("COURSE NOW AVAILABLE\n\n");
        text.push_str(&format!("Course: {}\n", alert.course_label()));
        if let Some(name) = &alert.course_name {
            text.push_str(&format!("Title: {}\n", name));
        }
        text.push_str(&format!("Term: {}\n", alert.term));
        text.push_str("Status: OPEN\n\n");
        text.push_str(&format!("Register now: {}\n", alert.registration_url));

        text
    }

    fn sender(&self) -> Result<Mailbox> {
        let address = self
            .config
            .sender()
            .ok_or_else(|| AppError::delivery(CHANNEL, "no sender address configured"))?;

        format!("{} <{}>", self.config.from_name, address)
            .parse()
            .map_err(|e| AppError::delivery(CHANNEL, format!("invalid sender address: {}", e)))
    }

    pub(crate) fn build_message(&self, alert: &OpenAlert) -> Result<Message> {
        let to: Mailbox = alert
            .email
            .parse()
            .map_err(|e| AppError::delivery(CHANNEL, format!("invalid recipient {}: {}", alert.email, e)))?;

        Message::builder()
            .from(self.sender()?)
            .to(to)
            .subject(self.format_subject(alert))
            .multipart(
                MultiPart::alternative()
                    .singlepart(
                        SinglePart::builder()
                            .header(header::ContentType::TEXT_PLAIN)
                            .body(self.format_text_body(alert)),
                    )
                    .singlepart(
                        SinglePart::builder()
                            .header(header::ContentType::TEXT_HTML)
                            .body(self.format_html_body(alert)),
                    ),
            )
            .map_err(|e| AppError::delivery(CHANNEL, e.to_string()))
    }

    fn transport(&self) -> Result<AsyncSmtpTransport<Tokio1Executor>> {
        let (username, password) = match (&self.config.username, &self.config.password) {
            (Some(u), Some(p)) => (u.clone(), p.clone()),
            _ => return Err(AppError::delivery(CHANNEL, "SMTP credentials are not configured")),
        };

        let builder = if self.config.use_tls {
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&self.config.host)
                .map_err(|e| AppError::delivery(CHANNEL, e.to_string()))?
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(&self.config.host)
        };

        Ok(builder
            .port(self.config.port)
            .credentials(Credentials::new(username, password))
            .build())
    }
}

#[async_trait]
impl NotifierPlugin for EmailNotifier {
    fn channel(&self) -> NotificationChannel {
        NotificationChannel::Email
    }

    fn accepts(&self, alert: &OpenAlert) -> bool {
        !alert.email.trim().is_empty()
    }

    async fn notify(&self, alert: &OpenAlert) -> Result<NotificationResult> {
        let mailer = self.transport()?;
        let email = self.build_message(alert)?;

        match mailer.send(email).await {
            Ok(response) => {
                tracing::info!(to = %alert.email, course = %alert.course_label(), "Email sent");
                Ok(NotificationResult {
                    success: true,
                    message_id: response.message().next().map(|line| line.to_string()),
                    error: None,
                })
            }
            Err(e) => Ok(NotificationResult {
                success: false,
                message_id: None,
                error: Some(e.to_string()),
            }),
        }
    }
}
