//! Mail fetcher: threads with activity inside the scan window.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::info;

use crate::error::MailboxError;
use crate::mailbox::{MailSource, Thread};

pub struct MailFetcher {
    source: Arc<dyn MailSource>,
}

impl MailFetcher {
    pub fn new(source: Arc<dyn MailSource>) -> Self {
        Self { source }
    }

    /// All threads with a message at or after `window_start`. No paging;
    /// whatever the provider returns is the batch.
    pub async fn fetch(&self, window_start: DateTime<Utc>) -> Result<Vec<Thread>, MailboxError> {
        let threads = self.source.search_since(window_start).await?;
        info!(
            threads = threads.len(),
            since = %window_start,
            "Fetched candidate threads"
        );
        Ok(threads)
    }
}
