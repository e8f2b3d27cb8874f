use lettre::message::header::ContentType;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use serde_json::json;
use thiserror::Error;
use tracing::{info, warn};

use crate::db::models::Settings;

#[derive(Debug, Error)]
pub enum MailError {
    #[error("invalid mail address: {0}")]
    Address(#[from] lettre::address::AddressError),
    #[error("mail build error: {0}")]
    Build(#[from] lettre::error::Error),
    #[error("smtp transport error: {0}")]
    Smtp(#[from] lettre::transport::smtp::Error),
    #[error("resend api error: {0}")]
    Resend(#[from] reqwest::Error),
    #[error("no mail transport configured")]
    NotConfigured,
}

/// Outgoing mail transport: SMTP from the settings row, with the Resend API
/// as fallback when only an API key is configured.
#[derive(Clone)]
pub struct Mailer {
    resend_api_key: String,
    http: reqwest::Client,
}

impl Mailer {
    pub fn new(resend_api_key: String) -> Self {
        Mailer {
            resend_api_key,
            http: reqwest::Client::new(),
        }
    }

    /// Sends one message, choosing the transport from the settings snapshot.
    /// Failures are the caller's to log; the notification record is written
    /// regardless.
    pub async fn send(
        &self,
        settings: &Settings,
        to: &str,
        subject: &str,
        html: &str,
    ) -> Result<(), MailError> {
        if settings.smtp_configured() {
            self.send_smtp(settings, to, subject, html).await
        } else if !self.resend_api_key.trim().is_empty() {
            self.send_resend(to, subject, html).await
        } else {
            Err(MailError::NotConfigured)
        }
    }

    async fn send_smtp(
        &self,
        settings: &Settings,
        to: &str,
        subject: &str,
        html: &str,
    ) -> Result<(), MailError> {
        let creds = Credentials::new(settings.smtp_user.clone(), settings.smtp_password.clone());
        // Port 465 speaks TLS from the first byte; everything else upgrades
        // via STARTTLS.
        let transport: AsyncSmtpTransport<Tokio1Executor> = if settings.smtp_port == 465 {
            AsyncSmtpTransport::<Tokio1Executor>::relay(&settings.smtp_server)?
                .port(settings.smtp_port as u16)
                .credentials(creds)
                .build()
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&settings.smtp_server)?
                .port(settings.smtp_port as u16)
                .credentials(creds)
                .build()
        };

        let message = Message::builder()
            .from(settings.from_email.parse()?)
            .to(to.trim().parse()?)
            .subject(subject)
            .header(ContentType::TEXT_HTML)
            .body(html.to_string())?;

        transport.send(message).await?;
        info!(to = to, server = %settings.smtp_server, "SMTP邮件已发送");
        Ok(())
    }

    async fn send_resend(&self, to: &str, subject: &str, html: &str) -> Result<(), MailError> {
        let payload = json!({
            "from": "Monitor <no-reply@monitor.local>",
            "to": to,
            "subject": subject,
            "html": html,
        });
        let response = self
            .http
            .post("https://api.resend.com/emails")
            .bearer_auth(&self.resend_api_key)
            .json(&payload)
            .send()
            .await?;
        if !response.status().is_success() {
            warn!(status = %response.status(), to = to, "Resend接口返回非成功状态");
        }
        Ok(())
    }
}
