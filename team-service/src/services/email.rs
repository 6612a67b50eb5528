//! Invitation notifications over SMTP.
//!
//! The raw invite token travels through here and nowhere else: it goes
//! into the acceptance link of the outgoing mail and is never persisted
//! or returned to the issuing caller.

use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use lettre::{
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
    message::{Mailbox, MultiPart, SinglePart, header::ContentType},
    transport::smtp::authentication::Credentials,
};
use service_core::error::AppError;
use tokio::sync::Mutex;

use crate::config::SmtpConfig;
use crate::models::TeamRole;

/// Everything the invitation mail needs.
#[derive(Debug, Clone)]
pub struct InvitationEmail {
    pub to_email: String,
    pub provider_name: String,
    pub inviter_name: String,
    pub role: TeamRole,
    pub invite_token: String,
    pub expiry_utc: DateTime<Utc>,
}

#[async_trait]
pub trait NotificationSender: Send + Sync {
    async fn send_invitation(&self, email: &InvitationEmail) -> Result<(), anyhow::Error>;
}

pub struct EmailNotifier {
    config: SmtpConfig,
    public_base_url: String,
    transport: AsyncSmtpTransport<Tokio1Executor>,
}

impl EmailNotifier {
    pub fn new(config: SmtpConfig, public_base_url: String) -> Result<Self, AppError> {
        let creds = Credentials::new(config.user.clone(), config.password.clone());

        let transport = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.host)
            .map_err(|e| {
                AppError::ConfigError(anyhow::anyhow!("Failed to create SMTP relay: {}", e))
            })?
            .port(config.port)
            .credentials(creds)
            .build();

        Ok(Self {
            config,
            public_base_url: public_base_url.trim_end_matches('/').to_string(),
            transport,
        })
    }

    fn accept_url(&self, token: &str) -> String {
        format!("{}/invitations/{}", self.public_base_url, token)
    }
}

#[async_trait]
impl NotificationSender for EmailNotifier {
    async fn send_invitation(&self, email: &InvitationEmail) -> Result<(), anyhow::Error> {
        let from_mailbox: Mailbox =
            format!("{} <{}>", self.config.from_name, self.config.from_email)
                .parse()
                .map_err(|e| anyhow::anyhow!("Invalid from address: {}", e))?;

        let to_mailbox: Mailbox = email
            .to_email
            .parse()
            .map_err(|e| anyhow::anyhow!("Invalid recipient: {}", e))?;

        let accept_url = self.accept_url(&email.invite_token);
        let expiry = email.expiry_utc.format("%Y-%m-%d %H:%M UTC");

        let body_text = format!(
            "Hello,\n\n\
             {inviter} has invited you to join {provider} as {role}.\n\n\
             Open this link to accept the invitation:\n\n\
             {url}\n\n\
             The invitation expires on {expiry}. If you were not expecting\n\
             it, you can ignore this email.\n",
            inviter = email.inviter_name,
            provider = email.provider_name,
            role = email.role.as_str(),
            url = accept_url,
            expiry = expiry,
        );

        let body_html = format!(
            "<p>Hello,</p>\
             <p><strong>{inviter}</strong> has invited you to join <strong>{provider}</strong> as <strong>{role}</strong>.</p>\
             <p><a href=\"{url}\">Accept the invitation</a></p>\
             <p>The invitation expires on {expiry}. If you were not expecting it, you can ignore this email.</p>",
            inviter = email.inviter_name,
            provider = email.provider_name,
            role = email.role.as_str(),
            url = accept_url,
            expiry = expiry,
        );

        let message = Message::builder()
            .from(from_mailbox)
            .to(to_mailbox)
            .subject(format!("Invitation to join {}", email.provider_name))
            .multipart(
                MultiPart::alternative()
                    .singlepart(
                        SinglePart::builder()
                            .header(ContentType::TEXT_PLAIN)
                            .body(body_text),
                    )
                    .singlepart(
                        SinglePart::builder()
                            .header(ContentType::TEXT_HTML)
                            .body(body_html),
                    ),
            )
            .map_err(|e| anyhow::anyhow!("Failed to build message: {}", e))?;

        self.transport
            .send(message)
            .await
            .map_err(|e| anyhow::anyhow!("Failed to send email: {}", e))?;

        tracing::info!(
            to = %email.to_email,
            provider = %email.provider_name,
            "Invitation email sent"
        );

        Ok(())
    }
}

/// Test sender that records payloads instead of talking to SMTP.
#[derive(Default)]
pub struct MockNotificationSender {
    sent: Mutex<Vec<InvitationEmail>>,
    fail: AtomicBool,
}

impl MockNotificationSender {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent send fail.
    pub fn fail_sends(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    pub async fn sent(&self) -> Vec<InvitationEmail> {
        self.sent.lock().await.clone()
    }
}

#[async_trait]
impl NotificationSender for MockNotificationSender {
    async fn send_invitation(&self, email: &InvitationEmail) -> Result<(), anyhow::Error> {
        if self.fail.load(Ordering::SeqCst) {
            anyhow::bail!("Injected notification failure");
        }

        tracing::info!(
            to = %email.to_email,
            provider = %email.provider_name,
            "[MOCK] Invitation email would be sent"
        );

        self.sent.lock().await.push(email.clone());
        Ok(())
    }
}
