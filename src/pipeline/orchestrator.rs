//! Orchestrator — one pass of fetch → classify → forward → label, and the
//! interval scheduler that runs passes.
//!
//! A pass is sequential. Per-message failures (classification, send) are
//! logged and skipped; a label failure aborts the pass.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use serde::Serialize;
use tokio::task::{JoinError, JoinHandle};
use tokio::time::MissedTickBehavior;
use tracing::{Instrument, debug, error, info, info_span, warn};
use uuid::Uuid;

use super::classifier::{Classifier, ClassifierConfig, Verdict};
use super::fetcher::MailFetcher;
use super::forwarder::Forwarder;
use super::labels::LabelManager;
use crate::config::Config;
use crate::error::PipelineError;
use crate::llm::LlmProvider;
use crate::mailbox::{Label, LabelStore, MailSender, MailSource, Message};

/// Probe sent by [`Orchestrator::verify_setup`].
const SETUP_PROBE_SUBJECT: &str = "Setup check";
const SETUP_PROBE_BODY: &str = "Test email about ChatGPT and LLMs";

/// What a pass needs besides its collaborators.
#[derive(Debug, Clone)]
pub struct PipelineSettings {
    pub forward_to: String,
    pub label_name: String,
    pub subject_prefix: String,
    pub scan_interval: Duration,
    pub classifier: ClassifierConfig,
}

impl PipelineSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            forward_to: config.forward_to.clone(),
            label_name: config.label_name.clone(),
            subject_prefix: config.subject_prefix.clone(),
            scan_interval: config.scan_interval,
            classifier: config.classifier.clone(),
        }
    }
}

/// Counters for one pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PassReport {
    pub threads: usize,
    pub messages: usize,
    pub matches: usize,
    pub forwarded: usize,
    pub labeled: usize,
    pub send_failures: usize,
    /// Messages sent by the account itself.
    pub skipped: usize,
}

pub struct Orchestrator {
    fetcher: MailFetcher,
    classifier: Classifier,
    labels: LabelManager,
    forwarder: Forwarder,
    forward_to: String,
    label_name: String,
    scan_interval: Duration,
    running: AtomicBool,
}

/// Clears the run-in-progress flag when a pass ends, however it ends.
struct RunGuard<'a>(&'a AtomicBool);

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

impl Orchestrator {
    pub fn new(
        source: Arc<dyn MailSource>,
        label_store: Arc<dyn LabelStore>,
        sender: Arc<dyn MailSender>,
        llm: Arc<dyn LlmProvider>,
        settings: PipelineSettings,
    ) -> Self {
        Self {
            fetcher: MailFetcher::new(source),
            classifier: Classifier::new(llm, settings.classifier),
            labels: LabelManager::new(label_store),
            forwarder: Forwarder::new(sender, settings.subject_prefix),
            forward_to: settings.forward_to,
            label_name: settings.label_name,
            scan_interval: settings.scan_interval,
            running: AtomicBool::new(false),
        }
    }

    /// Run a pass for the window ending now.
    pub async fn run(&self) -> Result<PassReport, PipelineError> {
        self.run_at(Utc::now()).await
    }

    /// Run a pass for the window ending at `now`. Returns
    /// [`PipelineError::AlreadyRunning`] if another pass is in progress.
    pub async fn run_at(&self, now: DateTime<Utc>) -> Result<PassReport, PipelineError> {
        if self.running.swap(true, Ordering::SeqCst) {
            warn!("Pass already in progress, skipping");
            return Err(PipelineError::AlreadyRunning);
        }
        let _guard = RunGuard(&self.running);
        let span = info_span!("pass", id = %Uuid::new_v4());
        self.pass(now).instrument(span).await
    }

    async fn pass(&self, now: DateTime<Utc>) -> Result<PassReport, PipelineError> {
        let window_start = TimeDelta::from_std(self.scan_interval)
            .ok()
            .and_then(|window| now.checked_sub_signed(window))
            .ok_or_else(|| PipelineError::Window {
                seconds: self.scan_interval.as_secs(),
                now: now.to_rfc3339(),
            })?;
        let threads = self
            .fetcher
            .fetch(window_start)
            .await
            .map_err(PipelineError::Fetch)?;

        let mut report = PassReport {
            threads: threads.len(),
            ..PassReport::default()
        };
        let mut pass_label: Option<Label> = None;

        for thread in &threads {
            let mut thread_labeled = false;

            for message in &thread.messages {
                report.messages += 1;

                if self.is_own_message(message) {
                    debug!(message = %message.id, "Skipping message sent by this account");
                    report.skipped += 1;
                    continue;
                }

                let verdict = self
                    .classifier
                    .classify(&message.subject, &message.body_plain)
                    .await;
                let Verdict::Match(category) = verdict else {
                    continue;
                };
                report.matches += 1;
                info!(
                    thread = %thread.id,
                    message = %message.id,
                    category = %category,
                    "Message matched"
                );

                let label = match pass_label.clone() {
                    Some(label) => label,
                    None => {
                        let found = self.labels.ensure_label(&self.label_name).await.map_err(
                            |source| PipelineError::Label {
                                name: self.label_name.clone(),
                                source,
                            },
                        )?;
                        pass_label = Some(found.clone());
                        found
                    }
                };

                if let Err(e) = self.forwarder.forward(message, &self.forward_to).await {
                    warn!(
                        thread = %thread.id,
                        message = %message.id,
                        error = %e,
                        "Forward failed, skipping message"
                    );
                    report.send_failures += 1;
                    continue;
                }
                report.forwarded += 1;

                if !thread_labeled {
                    self.labels
                        .attach(thread, &label)
                        .await
                        .map_err(|source| PipelineError::Label {
                            name: label.name.clone(),
                            source,
                        })?;
                    thread_labeled = true;
                    report.labeled += 1;
                }
            }
        }

        info!(
            threads = report.threads,
            messages = report.messages,
            matches = report.matches,
            forwarded = report.forwarded,
            labeled = report.labeled,
            send_failures = report.send_failures,
            skipped = report.skipped,
            "Pass complete"
        );
        Ok(report)
    }

    fn is_own_message(&self, message: &Message) -> bool {
        let account = self.forwarder.account_address();
        !account.is_empty() && message.from.eq_ignore_ascii_case(account)
    }

    /// Startup check: send a test classification and make sure the label exists.
    ///
    /// A failed test classification is only logged; a label failure is returned.
    pub async fn verify_setup(&self) -> Result<Label, PipelineError> {
        match self
            .classifier
            .try_classify(SETUP_PROBE_SUBJECT, SETUP_PROBE_BODY)
            .await
        {
            Ok(verdict) => info!(verdict = %verdict, "Classification endpoint reachable"),
            Err(e) => warn!(error = %e, "Classification endpoint check failed"),
        }

        let label = self
            .labels
            .ensure_label(&self.label_name)
            .await
            .map_err(|source| PipelineError::Label {
                name: self.label_name.clone(),
                source,
            })?;
        info!(label = %label.name, "Label ready");
        Ok(label)
    }
}

/// Spawn a background task that runs a pass every `interval`, starting
/// immediately.
///
/// Returns a `JoinHandle` and shutdown flag.
pub fn spawn_scheduler(
    orchestrator: Arc<Orchestrator>,
    interval: Duration,
) -> (JoinHandle<()>, Arc<AtomicBool>) {
    let shutdown = Arc::new(AtomicBool::new(false));
    let shutdown_flag = Arc::clone(&shutdown);

    let handle = tokio::spawn(async move {
        info!("Scheduler started, running every {}s", interval.as_secs());

        let mut tick = tokio::time::interval(interval);
        tick.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tick.tick().await;

            if shutdown.load(Ordering::Relaxed) {
                info!("Scheduler shutting down");
                return;
            }

            match orchestrator.run().await {
                Ok(report) => debug!(?report, "Scheduled pass finished"),
                Err(PipelineError::AlreadyRunning) => {}
                Err(e) => error!(error = %e, "Scheduled pass failed"),
            }
        }
    });

    (handle, shutdown_flag)
}

/// Signal the scheduler to stop, abort it and wait for the task to end.
/// A cancelled task is a clean stop; a panic inside it comes back as the error.
pub async fn stop_scheduler(
    handle: JoinHandle<()>,
    shutdown: &AtomicBool,
) -> Result<(), JoinError> {
    shutdown.store(true, Ordering::Relaxed);
    handle.abort();
    match handle.await {
        Err(e) if !e.is_cancelled() => Err(e),
        _ => Ok(()),
    }
}
