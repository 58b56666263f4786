//! In-memory mailbox: threads, labels and sent mail held in process.
//!
//! Implements every mailbox trait, so the whole pipeline can run against it.
//! Failure switches let callers simulate a flaky provider.

use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use tracing::debug;

use super::types::{Label, OutgoingMail, Thread};
use super::{LabelStore, MailSender, MailSource};
use crate::error::MailboxError;

struct StoredThread {
    thread: Thread,
    label_ids: Vec<String>,
}

/// Mailbox kept entirely in memory.
pub struct InMemoryMailbox {
    account: String,
    threads: RwLock<Vec<StoredThread>>,
    labels: RwLock<Vec<Label>>,
    sent: RwLock<Vec<OutgoingMail>>,
    labels_created: AtomicUsize,
    failing_subjects: RwLock<HashSet<String>>,
    fail_labels: AtomicBool,
}

impl InMemoryMailbox {
    /// Create an empty mailbox owned by `account`.
    pub fn new(account: impl Into<String>) -> Arc<Self> {
        Arc::new(Self {
            account: account.into(),
            threads: RwLock::new(Vec::new()),
            labels: RwLock::new(Vec::new()),
            sent: RwLock::new(Vec::new()),
            labels_created: AtomicUsize::new(0),
            failing_subjects: RwLock::new(HashSet::new()),
            fail_labels: AtomicBool::new(false),
        })
    }

    /// Add a thread, or append its messages to an existing thread with the same id.
    pub async fn add_thread(&self, thread: Thread) {
        let mut threads = self.threads.write().await;
        match threads.iter_mut().find(|t| t.thread.id == thread.id) {
            Some(existing) => {
                existing.thread.messages.extend(thread.messages);
                existing.thread.messages.sort_by_key(|m| m.date);
            }
            None => threads.push(StoredThread {
                thread,
                label_ids: Vec::new(),
            }),
        }
    }

    /// Names of the labels attached to a thread.
    pub async fn labels_on(&self, thread_id: &str) -> Vec<String> {
        let threads = self.threads.read().await;
        let labels = self.labels.read().await;
        threads
            .iter()
            .find(|t| t.thread.id == thread_id)
            .map(|t| {
                t.label_ids
                    .iter()
                    .filter_map(|id| labels.iter().find(|l| &l.id == id))
                    .map(|l| l.name.clone())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Every message sent so far, in order.
    pub async fn sent(&self) -> Vec<OutgoingMail> {
        self.sent.read().await.clone()
    }

    /// How many labels have been created.
    pub fn label_creations(&self) -> usize {
        self.labels_created.load(Ordering::SeqCst)
    }

    /// Make sends whose subject ends with `subject` fail.
    pub async fn fail_sends_for_subject(&self, subject: impl Into<String>) {
        self.failing_subjects.write().await.insert(subject.into());
    }

    /// Make every label operation fail.
    pub fn fail_label_operations(&self, fail: bool) {
        self.fail_labels.store(fail, Ordering::SeqCst);
    }

    fn check_labels_available(&self) -> Result<(), MailboxError> {
        if self.fail_labels.load(Ordering::SeqCst) {
            return Err(MailboxError::CommandFailed {
                command: "label".into(),
                response: "label service unavailable".into(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl MailSource for InMemoryMailbox {
    async fn search_since(&self, since: DateTime<Utc>) -> Result<Vec<Thread>, MailboxError> {
        let threads = self.threads.read().await;
        Ok(threads
            .iter()
            .filter_map(|stored| {
                let messages: Vec<_> = stored
                    .thread
                    .messages
                    .iter()
                    .filter(|m| m.date >= since)
                    .cloned()
                    .collect();
                (!messages.is_empty()).then(|| Thread {
                    id: stored.thread.id.clone(),
                    messages,
                })
            })
            .collect())
    }
}

#[async_trait]
impl LabelStore for InMemoryMailbox {
    async fn find_label(&self, name: &str) -> Result<Option<Label>, MailboxError> {
        self.check_labels_available()?;
        Ok(self.labels.read().await.iter().find(|l| l.name == name).cloned())
    }

    async fn create_label(&self, name: &str) -> Result<Label, MailboxError> {
        self.check_labels_available()?;
        let mut labels = self.labels.write().await;
        let index = self.labels_created.fetch_add(1, Ordering::SeqCst) + 1;
        let label = Label {
            id: format!("Label_{index}"),
            name: name.to_string(),
        };
        labels.push(label.clone());
        debug!(label = %name, id = %label.id, "Created label");
        Ok(label)
    }

    async fn add_label(&self, thread: &Thread, label: &Label) -> Result<(), MailboxError> {
        self.check_labels_available()?;
        if !self.labels.read().await.iter().any(|l| l.id == label.id) {
            return Err(MailboxError::LabelNotFound {
                name: label.name.clone(),
            });
        }
        let mut threads = self.threads.write().await;
        let stored = threads
            .iter_mut()
            .find(|t| t.thread.id == thread.id)
            .ok_or_else(|| MailboxError::Protocol(format!("unknown thread {}", thread.id)))?;
        if !stored.label_ids.contains(&label.id) {
            stored.label_ids.push(label.id.clone());
        }
        Ok(())
    }
}

#[async_trait]
impl MailSender for InMemoryMailbox {
    fn account_address(&self) -> &str {
        &self.account
    }

    async fn send(&self, mail: &OutgoingMail) -> Result<(), MailboxError> {
        let failing = self
            .failing_subjects
            .read()
            .await
            .iter()
            .any(|s| mail.subject.ends_with(s.as_str()));
        if failing {
            return Err(MailboxError::SendFailed {
                to: mail.to.clone(),
                reason: "simulated send failure".into(),
            });
        }
        self.sent.write().await.push(mail.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mailbox::types::Message;
    use chrono::TimeZone;

    fn thread(id: &str, minutes: &[u32]) -> Thread {
        Thread {
            id: id.into(),
            messages: minutes
                .iter()
                .map(|m| Message {
                    id: format!("{id}-{m}"),
                    thread_id: id.into(),
                    from: "alice@example.com".into(),
                    subject: "Hello".into(),
                    body_plain: "body".into(),
                    body_html: None,
                    date: Utc.with_ymd_and_hms(2026, 3, 1, 12, *m, 0).unwrap(),
                })
                .collect(),
        }
    }

    #[tokio::test]
    async fn search_filters_by_window() {
        let mailbox = InMemoryMailbox::new("me@example.com");
        mailbox.add_thread(thread("old", &[0, 5])).await;
        mailbox.add_thread(thread("mixed", &[5, 40])).await;

        let since = Utc.with_ymd_and_hms(2026, 3, 1, 12, 30, 0).unwrap();
        let threads = mailbox.search_since(since).await.unwrap();
        assert_eq!(threads.len(), 1);
        assert_eq!(threads[0].id, "mixed");
        assert_eq!(threads[0].messages.len(), 1);
    }

    #[tokio::test]
    async fn search_window_is_inclusive() {
        let mailbox = InMemoryMailbox::new("me@example.com");
        mailbox.add_thread(thread("edge", &[30])).await;
        let since = Utc.with_ymd_and_hms(2026, 3, 1, 12, 30, 0).unwrap();
        assert_eq!(mailbox.search_since(since).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn add_label_twice_keeps_one_copy() {
        let mailbox = InMemoryMailbox::new("me@example.com");
        let t = thread("t1", &[1]);
        mailbox.add_thread(t.clone()).await;
        let label = mailbox.create_label("GenAI-Related").await.unwrap();

        mailbox.add_label(&t, &label).await.unwrap();
        mailbox.add_label(&t, &label).await.unwrap();
        assert_eq!(mailbox.labels_on("t1").await, vec!["GenAI-Related"]);
    }

    #[tokio::test]
    async fn add_unknown_label_fails() {
        let mailbox = InMemoryMailbox::new("me@example.com");
        let t = thread("t1", &[1]);
        mailbox.add_thread(t.clone()).await;
        let err = mailbox.add_label(&t, &Label::named("ghost")).await.unwrap_err();
        assert!(matches!(err, MailboxError::LabelNotFound { .. }));
    }

    #[tokio::test]
    async fn simulated_send_failure() {
        let mailbox = InMemoryMailbox::new("me@example.com");
        mailbox.fail_sends_for_subject("Broken").await;
        let mail = OutgoingMail {
            from: "me@example.com".into(),
            to: "you@example.com".into(),
            subject: "[GenAI] Broken".into(),
            body_plain: "x".into(),
            body_html: "<p>x</p>".into(),
        };
        assert!(mailbox.send(&mail).await.is_err());
        assert!(mailbox.sent().await.is_empty());
    }

    #[tokio::test]
    async fn label_failure_switch() {
        let mailbox = InMemoryMailbox::new("me@example.com");
        mailbox.fail_label_operations(true);
        assert!(mailbox.find_label("x").await.is_err());
        mailbox.fail_label_operations(false);
        assert!(mailbox.find_label("x").await.unwrap().is_none());
    }
}
