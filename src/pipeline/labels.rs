//! Label manager: get-or-create a label, attach it to threads.

use std::sync::Arc;

use tracing::{debug, info};

use crate::error::MailboxError;
use crate::mailbox::{Label, LabelStore, Thread};

pub struct LabelManager {
    store: Arc<dyn LabelStore>,
}

impl LabelManager {
    pub fn new(store: Arc<dyn LabelStore>) -> Self {
        Self { store }
    }

    /// Look up `name`, creating it if the mailbox has no such label.
    pub async fn ensure_label(&self, name: &str) -> Result<Label, MailboxError> {
        if let Some(label) = self.store.find_label(name).await? {
            debug!(label = %name, "Label exists");
            return Ok(label);
        }
        let label = self.store.create_label(name).await?;
        info!(label = %name, "Created label");
        Ok(label)
    }

    /// Attach `label` to `thread`. Re-attaching is a no-op.
    pub async fn attach(&self, thread: &Thread, label: &Label) -> Result<(), MailboxError> {
        self.store.add_label(thread, label).await?;
        debug!(thread = %thread.id, label = %label.name, "Label attached");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mailbox::{InMemoryMailbox, Message};
    use chrono::Utc;

    fn thread() -> Thread {
        Thread {
            id: "t1".into(),
            messages: vec![Message {
                id: "m1".into(),
                thread_id: "t1".into(),
                from: "alice@example.com".into(),
                subject: "Hi".into(),
                body_plain: "body".into(),
                body_html: None,
                date: Utc::now(),
            }],
        }
    }

    #[tokio::test]
    async fn ensure_label_creates_once() {
        let mailbox = InMemoryMailbox::new("me@example.com");
        let manager = LabelManager::new(mailbox.clone());

        let first = manager.ensure_label("GenAI-Related").await.unwrap();
        let second = manager.ensure_label("GenAI-Related").await.unwrap();
        assert_eq!(first, second);
        assert_eq!(mailbox.label_creations(), 1);
    }

    #[tokio::test]
    async fn attach_twice_keeps_single_label() {
        let mailbox = InMemoryMailbox::new("me@example.com");
        mailbox.add_thread(thread()).await;
        let manager = LabelManager::new(mailbox.clone());

        let label = manager.ensure_label("GenAI-Related").await.unwrap();
        manager.attach(&thread(), &label).await.unwrap();
        manager.attach(&thread(), &label).await.unwrap();
        assert_eq!(mailbox.labels_on("t1").await, vec!["GenAI-Related"]);
    }

    #[tokio::test]
    async fn store_failure_propagates() {
        let mailbox = InMemoryMailbox::new("me@example.com");
        mailbox.fail_label_operations(true);
        let manager = LabelManager::new(mailbox);
        assert!(manager.ensure_label("GenAI-Related").await.is_err());
    }
}
