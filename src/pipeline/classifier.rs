//! Classifier — asks the LLM for a one-word verdict on a message.
//!
//! The reply is compared (lower-cased, trimmed) against a configured
//! vocabulary. Anything unexpected, and any failure of the remote call,
//! becomes [`Verdict::NoMatch`]; the caller never sees an error from
//! [`Classifier::classify`].

use std::fmt;
use std::sync::Arc;

use tracing::{debug, warn};

use crate::config::{ConfigSource, parse_or};
use crate::error::{ConfigError, LlmError};
use crate::llm::provider::{ChatMessage, CompletionRequest, FinishReason, LlmProvider};

/// Default hard cutoff on body characters sent for classification.
pub const DEFAULT_MAX_BODY_CHARS: usize = 1000;

/// Default output token cap. Verdicts are a single word.
pub const DEFAULT_MAX_TOKENS: u32 = 5;

/// Placeholder replaced by the rendered vocabulary.
pub const CATEGORIES_PLACEHOLDER: &str = "{categories}";

/// Default system instruction.
pub const DEFAULT_PROMPT: &str = "You are an AI that determines if an email is related to \
Generative AI, LLMs, or AI technology. Respond with only {categories}.";

/// Classification outcome for one message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    /// The reply was this configured category word.
    Match(String),
    NoMatch,
}

impl Verdict {
    pub fn is_match(&self) -> bool {
        matches!(self, Verdict::Match(_))
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Verdict::Match(category) => write!(f, "match:{category}"),
            Verdict::NoMatch => f.write_str("no-match"),
        }
    }
}

/// Words the model may answer with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Vocabulary {
    /// Words that produce [`Verdict::Match`].
    pub categories: Vec<String>,
    /// Words offered to the model as the negative answer.
    pub no_match: Vec<String>,
}

impl Vocabulary {
    fn from_words(categories: &[&str], no_match: &[&str]) -> Self {
        Self {
            categories: categories.iter().map(|s| s.to_string()).collect(),
            no_match: no_match.iter().map(|s| s.to_string()).collect(),
        }
    }

    /// `true` / `false`.
    pub fn binary() -> Self {
        Self::from_words(&["true"], &["false"])
    }

    /// `match` / `no-match`.
    pub fn match_words() -> Self {
        Self::from_words(&["match"], &["no-match"])
    }

    /// `academic`, `career`, `genai-news` / `no-match`.
    pub fn topics() -> Self {
        Self::from_words(&["academic", "career", "genai-news"], &["no-match"])
    }

    /// Look up a preset by name.
    pub fn preset(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "binary" => Some(Self::binary()),
            "match" => Some(Self::match_words()),
            "topics" => Some(Self::topics()),
            _ => None,
        }
    }

    /// Map a raw reply to a verdict.
    pub fn parse(&self, reply: &str) -> Verdict {
        let word = reply.trim().to_lowercase();
        self.categories
            .iter()
            .find(|c| c.to_lowercase() == word)
            .map(|c| Verdict::Match(c.to_lowercase()))
            .unwrap_or(Verdict::NoMatch)
    }

    /// Every allowed answer, quoted: `'a', 'b' or 'c'`.
    pub fn render(&self) -> String {
        let words: Vec<String> = self
            .categories
            .iter()
            .chain(self.no_match.iter())
            .map(|w| format!("'{w}'"))
            .collect();
        match words.split_last() {
            None => String::new(),
            Some((last, [])) => last.clone(),
            Some((last, rest)) => format!("{} or {last}", rest.join(", ")),
        }
    }
}

impl Default for Vocabulary {
    fn default() -> Self {
        Self::binary()
    }
}

/// Prompt, vocabulary and limits for classification.
#[derive(Debug, Clone, PartialEq)]
pub struct ClassifierConfig {
    pub vocabulary: Vocabulary,
    /// System instruction; `{categories}` is replaced by the vocabulary.
    pub prompt_template: String,
    pub max_body_chars: usize,
    pub max_tokens: u32,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            vocabulary: Vocabulary::default(),
            prompt_template: DEFAULT_PROMPT.to_string(),
            max_body_chars: DEFAULT_MAX_BODY_CHARS,
            max_tokens: DEFAULT_MAX_TOKENS,
        }
    }
}

impl ClassifierConfig {
    pub fn from_source(source: &ConfigSource) -> Result<Self, ConfigError> {
        let mut vocabulary = match source.get("MAIL_SIFT_VOCABULARY") {
            None => Vocabulary::default(),
            Some(name) => Vocabulary::preset(name).ok_or_else(|| ConfigError::InvalidValue {
                key: "MAIL_SIFT_VOCABULARY".into(),
                message: format!("unknown preset {name:?} (expected binary, match or topics)"),
            })?,
        };
        if let Some(categories) = source.list("MAIL_SIFT_CATEGORIES") {
            vocabulary.categories = categories;
        }
        if let Some(no_match) = source.list("MAIL_SIFT_NO_MATCH") {
            vocabulary.no_match = no_match;
        }
        if vocabulary.categories.is_empty() {
            return Err(ConfigError::InvalidValue {
                key: "MAIL_SIFT_CATEGORIES".into(),
                message: "at least one category is required".into(),
            });
        }

        let max_body_chars = parse_or(source, "MAIL_SIFT_MAX_BODY_CHARS", DEFAULT_MAX_BODY_CHARS)?;
        let max_tokens = parse_or(source, "MAIL_SIFT_MAX_TOKENS", DEFAULT_MAX_TOKENS)?;
        if max_tokens == 0 {
            return Err(ConfigError::InvalidValue {
                key: "MAIL_SIFT_MAX_TOKENS".into(),
                message: "must be at least 1".into(),
            });
        }

        Ok(Self {
            vocabulary,
            prompt_template: source
                .get("MAIL_SIFT_PROMPT")
                .map(str::to_string)
                .unwrap_or_else(|| DEFAULT_PROMPT.to_string()),
            max_body_chars,
            max_tokens,
        })
    }

    /// System instruction with the vocabulary filled in.
    pub fn system_prompt(&self) -> String {
        self.prompt_template
            .replace(CATEGORIES_PLACEHOLDER, &self.vocabulary.render())
    }
}

/// First `max` characters of `text`.
pub fn truncate_chars(text: &str, max: usize) -> &str {
    match text.char_indices().nth(max) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

/// Stateless verdict source backed by an [`LlmProvider`].
pub struct Classifier {
    llm: Arc<dyn LlmProvider>,
    config: ClassifierConfig,
    system_prompt: String,
}

impl Classifier {
    pub fn new(llm: Arc<dyn LlmProvider>, config: ClassifierConfig) -> Self {
        let system_prompt = config.system_prompt();
        Self {
            llm,
            config,
            system_prompt,
        }
    }

    /// Classify one message. Failures become [`Verdict::NoMatch`].
    pub async fn classify(&self, subject: &str, body: &str) -> Verdict {
        match self.try_classify(subject, body).await {
            Ok(verdict) => verdict,
            Err(e) => {
                warn!(
                    subject = %subject,
                    error = %e,
                    "Classification call failed, treating as no-match"
                );
                Verdict::NoMatch
            }
        }
    }

    /// Classify one message, surfacing remote failures.
    pub async fn try_classify(&self, subject: &str, body: &str) -> Result<Verdict, LlmError> {
        let response = self.llm.complete(self.build_request(subject, body)).await?;
        if response.finish_reason == FinishReason::Length {
            warn!(
                subject = %subject,
                reply = %response.content,
                max_tokens = self.config.max_tokens,
                "Verdict cut off by the token cap"
            );
        }
        let verdict = self.config.vocabulary.parse(&response.content);
        debug!(
            subject = %subject,
            reply = %response.content,
            verdict = %verdict,
            input_tokens = response.input_tokens,
            output_tokens = response.output_tokens,
            finish_reason = ?response.finish_reason,
            response_id = response.response_id.as_deref().unwrap_or("-"),
            "Classified message"
        );
        Ok(verdict)
    }

    fn build_request(&self, subject: &str, body: &str) -> CompletionRequest {
        let body = truncate_chars(body, self.config.max_body_chars);
        CompletionRequest::new(vec![
            ChatMessage::system(self.system_prompt.clone()),
            ChatMessage::user(format!("Subject: {subject}\n\nBody: {body}")),
        ])
        .with_temperature(0.0)
        .with_max_tokens(self.config.max_tokens)
    }
}
