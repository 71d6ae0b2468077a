//! Outbound email notifications (activation links) via SMTP.

use async_trait::async_trait;
use lettre::message::Mailbox;
use lettre::message::header::ContentType;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{Message, SmtpTransport, Transport};
use secrecy::ExposeSecret;

use crate::config::MailConfig;
use crate::error::NotifyError;

/// Port of SMTP submission over implicit TLS (SMTPS).
pub const SMTPS_PORT: u16 = 465;

/// How the SMTP connection gets encrypted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SmtpSecurity {
    /// TLS from the first byte (port 465).
    Implicit,
    /// Plaintext greeting upgraded with STARTTLS (587 and everything else).
    StartTls,
}

impl SmtpSecurity {
    pub fn for_port(port: u16) -> Self {
        if port == SMTPS_PORT {
            Self::Implicit
        } else {
            Self::StartTls
        }
    }
}

/// Sends one-off messages to a contact address.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send_email(&self, to: &str, subject: &str, body: &str) -> Result<(), NotifyError>;
}

/// SMTP relay notifier built on lettre.
pub struct SmtpNotifier {
    config: MailConfig,
}

impl SmtpNotifier {
    pub fn new(config: MailConfig) -> Self {
        Self { config }
    }

    /// Build the plain-text message without touching the network.
    fn build_message(&self, to: &str, subject: &str, body: &str) -> Result<Message, NotifyError> {
        let from: Mailbox = self
            .config
            .sender
            .parse()
            .map_err(|e| NotifyError::InvalidAddress {
                address: self.config.sender.clone(),
                reason: format!("{e}"),
            })?;
        let to_mailbox: Mailbox = to.parse().map_err(|e| NotifyError::InvalidAddress {
            address: to.to_string(),
            reason: format!("{e}"),
        })?;

        Message::builder()
            .from(from)
            .to(to_mailbox)
            .subject(subject)
            .header(ContentType::TEXT_PLAIN)
            .body(body.to_string())
            .map_err(|e| NotifyError::Build(e.to_string()))
    }
}

#[async_trait]
impl Notifier for SmtpNotifier {
    async fn send_email(&self, to: &str, subject: &str, body: &str) -> Result<(), NotifyError> {
        let email = self.build_message(to, subject, body)?;

        let host = self.config.smtp_host.clone();
        let port = self.config.smtp_port;
        let creds = Credentials::new(
            self.config.sender.clone(),
            self.config.password.expose_secret().to_string(),
        );

        // lettre's SmtpTransport is blocking.
        tokio::task::spawn_blocking(move || {
            let builder = match SmtpSecurity::for_port(port) {
                SmtpSecurity::Implicit => SmtpTransport::relay(&host),
                SmtpSecurity::StartTls => SmtpTransport::starttls_relay(&host),
            };
            let transport = builder
                .map_err(|e| NotifyError::Send(format!("SMTP relay error: {e}")))?
                .port(port)
                .credentials(creds)
                .build();
            transport
                .send(&email)
                .map_err(|e| NotifyError::Send(format!("SMTP send failed: {e}")))?;
            Ok::<(), NotifyError>(())
        })
        .await
        .map_err(|e| NotifyError::Send(format!("SMTP task panicked: {e}")))??;

        tracing::info!(to, "Activation email sent");
        Ok(())
    }
}
