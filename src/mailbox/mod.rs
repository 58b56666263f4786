//! Mailbox abstraction: what the pipeline needs from a mail provider,
//! split into narrow traits.
//!
//! - [`MailSource`]: search by recency
//! - [`LabelStore`]: find/create labels, attach them to threads
//! - [`MailSender`]: send mail as the account owner

pub mod imap;
pub mod memory;
pub mod smtp;
pub mod types;

pub use imap::{ImapMailbox, MailConfig};
pub use memory::InMemoryMailbox;
pub use types::{Label, Message, OutgoingMail, Thread, group_into_threads};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::MailboxError;

/// Read access to the mailbox.
#[async_trait]
pub trait MailSource: Send + Sync {
    /// Threads with at least one message received at or after `since`.
    ///
    /// Only messages inside the window are returned for each thread.
    async fn search_since(&self, since: DateTime<Utc>) -> Result<Vec<Thread>, MailboxError>;
}

/// Label namespace of the mailbox.
#[async_trait]
pub trait LabelStore: Send + Sync {
    /// Look up a label by exact name.
    async fn find_label(&self, name: &str) -> Result<Option<Label>, MailboxError>;

    /// Create a label. Callers look it up first.
    async fn create_label(&self, name: &str) -> Result<Label, MailboxError>;

    /// Attach `label` to every message of `thread`. Attaching an already
    /// present label is a no-op, not an error.
    async fn add_label(&self, thread: &Thread, label: &Label) -> Result<(), MailboxError>;
}

/// Outbound mail.
#[async_trait]
pub trait MailSender: Send + Sync {
    /// Address of the authenticated account; used as the `From` of forwards.
    fn account_address(&self) -> &str;

    /// Send one message.
    async fn send(&self, mail: &OutgoingMail) -> Result<(), MailboxError>;
}
