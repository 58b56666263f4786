//! Configuration types.
//!
//! Everything is read once at startup from the environment into an
//! immutable [`Config`] that is handed to each component. Parsing goes
//! through [`ConfigSource`] so tests can supply variables without touching
//! the process environment.

use std::collections::HashMap;
use std::fmt::Display;
use std::str::FromStr;
use std::time::Duration;

use crate::error::ConfigError;
use crate::llm::LlmConfig;
use crate::mailbox::imap::MailConfig;
use crate::pipeline::classifier::ClassifierConfig;

/// Default label applied to matching threads.
pub const DEFAULT_LABEL_NAME: &str = "GenAI-Related";

/// Default prefix for forwarded subjects.
pub const DEFAULT_SUBJECT_PREFIX: &str = "[GenAI] ";

/// Default scan interval in minutes.
pub const DEFAULT_SCAN_INTERVAL_MIN: u64 = 30;

/// Longest accepted scan interval: one week.
pub const MAX_SCAN_INTERVAL_MIN: u64 = 7 * 24 * 60;

/// A snapshot of key/value settings, usually the process environment.
#[derive(Debug, Clone, Default)]
pub struct ConfigSource {
    vars: HashMap<String, String>,
}

impl ConfigSource {
    /// Snapshot the current process environment.
    pub fn from_env() -> Self {
        Self {
            vars: std::env::vars().collect(),
        }
    }

    /// Build a source from literal pairs.
    pub fn from_pairs(pairs: &[(&str, &str)]) -> Self {
        Self {
            vars: pairs
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        }
    }

    /// Look up a key. Blank values count as unset.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.vars
            .get(key)
            .map(|v| v.trim())
            .filter(|v| !v.is_empty())
    }

    /// Look up a key that must be present.
    pub fn require(&self, key: &str) -> Result<String, ConfigError> {
        self.get(key)
            .map(str::to_string)
            .ok_or_else(|| ConfigError::MissingEnvVar(key.to_string()))
    }

    /// Comma-separated list, trimmed, empty entries dropped.
    pub fn list(&self, key: &str) -> Option<Vec<String>> {
        self.get(key).map(|raw| {
            raw.split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect()
        })
    }

    /// Boolean flag: `1`, `true`, `yes`, `on` (any case) are true.
    pub fn flag(&self, key: &str) -> bool {
        self.get(key).is_some_and(|v| {
            matches!(v.to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on")
        })
    }
}

/// Parse `key` if set, otherwise return `default`. A malformed value is an error.
pub fn parse_or<T>(source: &ConfigSource, key: &str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: Display,
{
    match source.get(key) {
        None => Ok(default),
        Some(raw) => raw.parse().map_err(|e: T::Err| ConfigError::InvalidValue {
            key: key.to_string(),
            message: format!("{raw:?}: {e}"),
        }),
    }
}

/// Process-wide settings, loaded once.
#[derive(Debug, Clone)]
pub struct Config {
    /// Chat completion endpoint and credential.
    pub llm: LlmConfig,
    /// IMAP/SMTP account.
    pub mail: MailConfig,
    /// Prompt, vocabulary and truncation.
    pub classifier: ClassifierConfig,
    /// Where matching messages are forwarded.
    pub forward_to: String,
    /// Label attached to matching threads.
    pub label_name: String,
    /// Prefix prepended to forwarded subjects.
    pub subject_prefix: String,
    /// Interval between passes; also the width of the scan window.
    pub scan_interval: Duration,
    /// Run a single pass and exit instead of scheduling.
    pub run_once: bool,
}

impl Config {
    /// Load from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_source(&ConfigSource::from_env())
    }

    pub fn from_source(source: &ConfigSource) -> Result<Self, ConfigError> {
        let scan_minutes: u64 =
            parse_or(source, "MAIL_SIFT_SCAN_INTERVAL_MIN", DEFAULT_SCAN_INTERVAL_MIN)?;
        if !(1..=MAX_SCAN_INTERVAL_MIN).contains(&scan_minutes) {
            return Err(ConfigError::InvalidValue {
                key: "MAIL_SIFT_SCAN_INTERVAL_MIN".into(),
                message: format!("must be between 1 and {MAX_SCAN_INTERVAL_MIN} minutes"),
            });
        }
        let scan_secs = scan_minutes
            .checked_mul(60)
            .ok_or_else(|| ConfigError::InvalidValue {
                key: "MAIL_SIFT_SCAN_INTERVAL_MIN".into(),
                message: "too large".into(),
            })?;

        let forward_to = source.require("FORWARD_TO")?;
        if !forward_to.contains('@') {
            return Err(ConfigError::InvalidValue {
                key: "FORWARD_TO".into(),
                message: format!("{forward_to:?} is not an email address"),
            });
        }

        Ok(Self {
            llm: LlmConfig::from_source(source)?,
            mail: MailConfig::from_source(source)?,
            classifier: ClassifierConfig::from_source(source)?,
            forward_to,
            label_name: parse_or(source, "MAIL_SIFT_LABEL", DEFAULT_LABEL_NAME.to_string())?,
            subject_prefix: source
                .vars
                .get("MAIL_SIFT_SUBJECT_PREFIX")
                .cloned()
                .unwrap_or_else(|| DEFAULT_SUBJECT_PREFIX.to_string()),
            scan_interval: Duration::from_secs(scan_secs),
            run_once: source.flag("MAIL_SIFT_RUN_ONCE"),
        })
    }
}
