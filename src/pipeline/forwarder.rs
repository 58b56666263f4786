//! Forwarder — sends a copy of a matching message to the destination.

use std::sync::Arc;

use tracing::info;

use crate::error::MailboxError;
use crate::mailbox::{MailSender, Message, OutgoingMail};

/// First line of the HTML preamble.
pub const FORWARD_MARKER: &str = "---------- Forwarded message ----------";

pub struct Forwarder {
    sender: Arc<dyn MailSender>,
    subject_prefix: String,
}

impl Forwarder {
    pub fn new(sender: Arc<dyn MailSender>, subject_prefix: impl Into<String>) -> Self {
        Self {
            sender,
            subject_prefix: subject_prefix.into(),
        }
    }

    /// Address forwards are sent from.
    pub fn account_address(&self) -> &str {
        self.sender.account_address()
    }

    /// Build the outgoing copy of `message`.
    pub fn compose(&self, message: &Message, destination: &str) -> OutgoingMail {
        OutgoingMail {
            from: self.account_address().to_string(),
            to: destination.to_string(),
            subject: format!("{}{}", self.subject_prefix, message.subject),
            body_plain: message.body_plain.clone(),
            body_html: forwarded_html(message),
        }
    }

    /// Compose and send. A failure concerns this message only.
    pub async fn forward(&self, message: &Message, destination: &str) -> Result<(), MailboxError> {
        let mail = self.compose(message, destination);
        self.sender.send(&mail).await?;
        info!(message = %message.id, to = %destination, subject = %mail.subject, "Forwarded message");
        Ok(())
    }
}

/// HTML part: forward preamble followed by the original body.
fn forwarded_html(message: &Message) -> String {
    let body = match &message.body_html {
        Some(html) => html.clone(),
        None => escape_html(&message.body_plain).replace('\n', "<br>\n"),
    };
    format!(
        "<div>{FORWARD_MARKER}<br>\n\
         From: {}<br>\n\
         Date: {}<br>\n\
         Subject: {}<br>\n\
         <br>\n\
         </div>\n{body}",
        escape_html(&message.from),
        message.date.to_rfc2822(),
        escape_html(&message.subject),
    )
}

fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            _ => out.push(c),
        }
    }
    out
}
