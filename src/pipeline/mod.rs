//! Mail pipeline.
//!
//! Each pass flows through:
//! 1. `MailFetcher::fetch()` — threads active in the scan window
//! 2. `Classifier::classify()` — one-word LLM verdict per message
//! 3. `Forwarder::forward()` — prefixed copy to the destination
//! 4. `LabelManager::attach()` — label on the thread, once per pass
//!
//! `Orchestrator` drives a pass; `spawn_scheduler` repeats it on a timer.

pub mod classifier;
pub mod fetcher;
pub mod forwarder;
pub mod labels;
pub mod orchestrator;

pub use classifier::{Classifier, ClassifierConfig, Verdict, Vocabulary};
pub use fetcher::MailFetcher;
pub use forwarder::Forwarder;
pub use labels::LabelManager;
pub use orchestrator::{Orchestrator, PassReport, PipelineSettings, spawn_scheduler, stop_scheduler};
