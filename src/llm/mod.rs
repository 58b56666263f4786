//! LLM integration for mail-sift.
//!
//! The classifier depends only on the `LlmProvider` trait. The concrete
//! provider speaks the OpenAI chat completion format over reqwest.

pub mod openai;
pub mod provider;

pub use openai::OpenAiCompatProvider;
pub use provider::*;

use std::sync::Arc;

use crate::config::{ConfigSource, parse_or};
use crate::error::ConfigError;

/// Default chat completion endpoint base.
pub const DEFAULT_API_BASE: &str = "https://api.openai.com/v1";

/// Default model for classification.
pub const DEFAULT_MODEL: &str = "gpt-3.5-turbo";

/// Configuration for creating an LLM provider.
#[derive(Debug, Clone)]
pub struct LlmConfig {
    pub api_key: secrecy::SecretString,
    pub model: String,
    pub base_url: String,
}

impl LlmConfig {
    /// Build from `OPENAI_API_KEY`, `MAIL_SIFT_MODEL` and `MAIL_SIFT_API_BASE`.
    pub fn from_source(source: &ConfigSource) -> Result<Self, ConfigError> {
        let api_key = source.require("OPENAI_API_KEY")?;
        Ok(Self {
            api_key: secrecy::SecretString::from(api_key),
            model: parse_or(source, "MAIL_SIFT_MODEL", DEFAULT_MODEL.to_string())?,
            base_url: parse_or(source, "MAIL_SIFT_API_BASE", DEFAULT_API_BASE.to_string())?,
        })
    }
}

/// Create an LLM provider from configuration.
pub fn create_provider(config: &LlmConfig) -> Arc<dyn LlmProvider> {
    tracing::info!("Using OpenAI-compatible endpoint {} (model: {})", config.base_url, config.model);
    Arc::new(OpenAiCompatProvider::new(
        config.base_url.clone(),
        config.api_key.clone(),
        config.model.clone(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_provider_reports_model() {
        let config = LlmConfig {
            api_key: secrecy::SecretString::from("sk-test"),
            model: "gpt-4o-mini".to_string(),
            base_url: DEFAULT_API_BASE.to_string(),
        };
        let provider = create_provider(&config);
        assert_eq!(provider.model_name(), "gpt-4o-mini");
    }

    #[test]
    fn from_source_applies_defaults() {
        let source = ConfigSource::from_pairs(&[("OPENAI_API_KEY", "sk-abc")]);
        let config = LlmConfig::from_source(&source).unwrap();
        assert_eq!(config.model, DEFAULT_MODEL);
        assert_eq!(config.base_url, DEFAULT_API_BASE);
    }

    #[test]
    fn from_source_requires_api_key() {
        let source = ConfigSource::from_pairs(&[]);
        let err = LlmConfig::from_source(&source).unwrap_err();
        assert!(matches!(err, ConfigError::MissingEnvVar(ref k) if k == "OPENAI_API_KEY"));
    }
}
