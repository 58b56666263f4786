//! Mailbox data model: messages, threads, labels, outgoing mail.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Immutable view of one mailbox entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// Provider-native identifier (IMAP UID, API id, ...).
    pub id: String,
    /// Conversation this message belongs to.
    pub thread_id: String,
    /// Sender address.
    pub from: String,
    pub subject: String,
    /// Plain-text body.
    pub body_plain: String,
    /// Raw HTML body, when the message has one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body_html: Option<String>,
    /// When the mailbox received the message.
    pub date: DateTime<Utc>,
}

/// A conversation: messages sharing a thread id, oldest first.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Thread {
    pub id: String,
    pub messages: Vec<Message>,
}

impl Thread {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            messages: Vec::new(),
        }
    }
}

/// Group messages into threads by `thread_id`.
///
/// Threads are ordered by first appearance; messages inside a thread are
/// sorted by date.
pub fn group_into_threads(messages: Vec<Message>) -> Vec<Thread> {
    let mut threads: Vec<Thread> = Vec::new();
    for message in messages {
        match threads.iter_mut().find(|t| t.id == message.thread_id) {
            Some(thread) => thread.messages.push(message),
            None => {
                let mut thread = Thread::new(message.thread_id.clone());
                thread.messages.push(message);
                threads.push(thread);
            }
        }
    }
    for thread in &mut threads {
        thread.messages.sort_by_key(|m| m.date);
    }
    threads
}

/// A named tag in the mailbox's label namespace.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Label {
    /// Provider-native id; equals the name where the provider has no ids.
    pub id: String,
    pub name: String,
}

impl Label {
    pub fn named(name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            id: name.clone(),
            name,
        }
    }
}

/// A message ready to send.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutgoingMail {
    pub from: String,
    pub to: String,
    pub subject: String,
    pub body_plain: String,
    pub body_html: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn message(id: &str, thread: &str, minute: u32) -> Message {
        Message {
            id: id.into(),
            thread_id: thread.into(),
            from: "alice@example.com".into(),
            subject: format!("msg {id}"),
            body_plain: "hello".into(),
            body_html: None,
            date: Utc.with_ymd_and_hms(2026, 1, 1, 10, minute, 0).unwrap(),
        }
    }

    #[test]
    fn grouping_preserves_first_seen_thread_order() {
        let threads = group_into_threads(vec![
            message("1", "b", 5),
            message("2", "a", 1),
            message("3", "b", 2),
        ]);
        assert_eq!(threads.len(), 2);
        assert_eq!(threads[0].id, "b");
        assert_eq!(threads[1].id, "a");
    }

    #[test]
    fn grouping_sorts_messages_by_date() {
        let threads = group_into_threads(vec![message("late", "t", 30), message("early", "t", 1)]);
        let ids: Vec<_> = threads[0].messages.iter().map(|m| m.id.as_str()).collect();
        assert_eq!(ids, vec!["early", "late"]);
    }

    #[test]
    fn named_label_uses_name_as_id() {
        let label = Label::named("GenAI-Related");
        assert_eq!(label.id, "GenAI-Related");
        assert_eq!(label.name, "GenAI-Related");
    }

    #[test]
    fn message_serde_omits_missing_html() {
        let json = serde_json::to_string(&message("1", "t", 0)).unwrap();
        assert!(!json.contains("body_html"));
        let parsed: Message = serde_json::from_str(&json).unwrap();
        assert!(parsed.body_html.is_none());
    }
}
