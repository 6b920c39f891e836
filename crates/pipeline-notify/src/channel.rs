//! SMTP owner-notification channel: builds and sends a single plaintext
//! message to a capped recipient list (`mailutil.py::_send_mail`).

use lettre::message::Mailbox;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use tracing::{info, warn};

use crate::error::NotifyError;

/// `_send_mail`'s hard cap: GitHub/SMTP relays commonly reject or silently
/// truncate envelopes with an unbounded `To:` list.
const MAX_RECIPIENTS: usize = 50;

/// Configuration for the SMTP owner-notification channel, mirroring
/// `model.email.EmailConfig`.
#[derive(Debug, Clone)]
pub struct MailChannelConfig {
    pub smtp_host: String,
    pub smtp_port: u16,
    pub sender_address: String,
    pub smtp_password: Option<String>,
    pub smtp_username: Option<String>,
}

/// Sends owner-notification emails over SMTP.
pub struct MailChannel {
    config: MailChannelConfig,
    transport: AsyncSmtpTransport<Tokio1Executor>,
}

impl MailChannel {
    pub fn new(config: MailChannelConfig) -> Result<Self, NotifyError> {
        let mut builder = AsyncSmtpTransport::<Tokio1Executor>::relay(&config.smtp_host)?
            .port(config.smtp_port);
        if let (Some(username), Some(password)) = (&config.smtp_username, &config.smtp_password) {
            builder = builder.credentials(Credentials::new(username.clone(), password.clone()));
        }
        Ok(Self {
            transport: builder.build(),
            config,
        })
    }

    /// Sends `body` as plaintext to `recipients`, lower-casing and capping the
    /// list at [`MAX_RECIPIENTS`] the way `_send_mail` does. Returns
    /// [`NotifyError::NoRecipients`] if `recipients` is empty after
    /// normalization.
    pub async fn send(&self, subject: &str, body: &str, recipients: &[String]) -> Result<(), NotifyError> {
        let mut normalized: Vec<String> = recipients.iter().map(|r| r.to_lowercase()).collect();
        normalized.sort();
        normalized.dedup();

        if normalized.is_empty() {
            return Err(NotifyError::NoRecipients);
        }

        if normalized.len() > MAX_RECIPIENTS {
            warn!(
                count = normalized.len(),
                max = MAX_RECIPIENTS,
                "max recipients exceeded, truncating"
            );
            normalized.truncate(MAX_RECIPIENTS);
        }

        let from: Mailbox = self
            .config
            .sender_address
            .parse()
            .map_err(|source| NotifyError::InvalidAddress {
                address: self.config.sender_address.clone(),
                source,
            })?;

        let mut builder = Message::builder().from(from).subject(subject.to_string());
        for recipient in &normalized {
            let mailbox: Mailbox =
                recipient
                    .parse()
                    .map_err(|source| NotifyError::InvalidAddress {
                        address: recipient.clone(),
                        source,
                    })?;
            builder = builder.to(mailbox);
        }

        let message = builder.body(body.to_string())?;
        self.transport.send(message).await?;
        info!(recipient_count = normalized.len(), "sent owner-notification email");
        Ok(())
    }
}
