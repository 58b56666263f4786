//! mail-sift: classify new mail with an LLM, forward and label the matches.

pub mod config;
pub mod error;
pub mod llm;
pub mod mailbox;
pub mod pipeline;
