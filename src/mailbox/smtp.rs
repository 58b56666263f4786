//! Outbound mail over SMTP via lettre.

use async_trait::async_trait;
use lettre::message::{Mailbox, MultiPart};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{SmtpTransport, Transport};
use secrecy::ExposeSecret;
use tracing::info;

use super::MailSender;
use super::imap::MailConfig;
use super::types::OutgoingMail;
use crate::error::MailboxError;

/// Port on which SMTP speaks implicit TLS; anything else uses STARTTLS.
const SMTPS_PORT: u16 = 465;

/// Sends mail through the account's SMTP relay.
pub struct SmtpSender {
    config: MailConfig,
}

impl SmtpSender {
    pub fn new(config: MailConfig) -> Self {
        Self { config }
    }

    fn transport(&self) -> Result<SmtpTransport, MailboxError> {
        let host = &self.config.smtp_host;
        let builder = if self.config.smtp_port == SMTPS_PORT {
            SmtpTransport::relay(host)
        } else {
            SmtpTransport::starttls_relay(host)
        }
        .map_err(|e| MailboxError::Connect {
            host: host.clone(),
            reason: format!("SMTP relay error: {e}"),
        })?;

        let creds = Credentials::new(
            self.config.username.clone(),
            self.config.password.expose_secret().to_string(),
        );

        Ok(builder.port(self.config.smtp_port).credentials(creds).build())
    }
}

/// Build a multipart/alternative email (plain + HTML).
pub fn build_email(mail: &OutgoingMail) -> Result<lettre::Message, MailboxError> {
    let send_failed = |reason: String| MailboxError::SendFailed {
        to: mail.to.clone(),
        reason,
    };

    lettre::Message::builder()
        .from(
            mail.from
                .parse::<Mailbox>()
                .map_err(|e| send_failed(format!("Invalid from address: {e}")))?,
        )
        .to(mail
            .to
            .parse::<Mailbox>()
            .map_err(|e| send_failed(format!("Invalid to address: {e}")))?)
        .subject(mail.subject.clone())
        .multipart(MultiPart::alternative_plain_html(
            mail.body_plain.clone(),
            mail.body_html.clone(),
        ))
        .map_err(|e| send_failed(format!("Failed to build email: {e}")))
}

#[async_trait]
impl MailSender for SmtpSender {
    fn account_address(&self) -> &str {
        &self.config.from_address
    }

    async fn send(&self, mail: &OutgoingMail) -> Result<(), MailboxError> {
        let email = build_email(mail)?;
        let transport = self.transport()?;
        let to = mail.to.clone();

        tokio::task::spawn_blocking(move || transport.send(&email))
            .await
            .map_err(|e| MailboxError::Task(e.to_string()))?
            .map_err(|e| MailboxError::SendFailed {
                to: to.clone(),
                reason: format!("SMTP send failed: {e}"),
            })?;

        info!("Email sent to {to}");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConfigSource;

    fn mail() -> OutgoingMail {
        OutgoingMail {
            from: "me@example.com".into(),
            to: "target@example.com".into(),
            subject: "[GenAI] ChatGPT API Integration Request".into(),
            body_plain: "We need GPT-3.5".into(),
            body_html: "<div>We need GPT-3.5</div>".into(),
        }
    }

    #[test]
    fn build_email_is_multipart_alternative() {
        let email = build_email(&mail()).unwrap();
        let raw = String::from_utf8(email.formatted()).unwrap();
        assert!(raw.contains("From: me@example.com"));
        assert!(raw.contains("To: target@example.com"));
        assert!(raw.contains("Subject: [GenAI] ChatGPT API Integration Request"));
        assert!(raw.contains("multipart/alternative"));
        assert!(raw.contains("text/plain"));
        assert!(raw.contains("text/html"));
    }

    #[test]
    fn build_email_rejects_bad_destination() {
        let mut m = mail();
        m.to = "not an address".into();
        let err = build_email(&m).unwrap_err();
        assert!(matches!(err, MailboxError::SendFailed { .. }));
    }

    #[test]
    fn sender_reports_from_address() {
        let source = ConfigSource::from_pairs(&[
            ("EMAIL_IMAP_HOST", "imap.example.com"),
            ("EMAIL_USERNAME", "me@example.com"),
            ("EMAIL_PASSWORD", "pw"),
        ]);
        let sender = SmtpSender::new(MailConfig::from_source(&source).unwrap());
        assert_eq!(sender.account_address(), "me@example.com");
    }
}
