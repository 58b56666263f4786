//! Error types for mail-sift.

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

/// LLM provider errors.
#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("Provider {provider} request failed: {reason}")]
    RequestFailed { provider: String, reason: String },

    #[error("Provider {provider} returned HTTP {status}: {body}")]
    HttpStatus {
        provider: String,
        status: u16,
        body: String,
    },

    #[error("Invalid response from {provider}: {reason}")]
    InvalidResponse { provider: String, reason: String },
}

/// Mailbox provider errors (IMAP, SMTP, or any other backend).
#[derive(Debug, thiserror::Error)]
pub enum MailboxError {
    #[error("Failed to connect to {host}: {reason}")]
    Connect { host: String, reason: String },

    #[error("Authentication failed for {user}")]
    AuthFailed { user: String },

    #[error("Command {command} rejected: {response}")]
    CommandFailed { command: String, response: String },

    #[error("Unexpected server response: {0}")]
    Protocol(String),

    #[error("Label {name} not found")]
    LabelNotFound { name: String },

    #[error("Failed to send message to {to}: {reason}")]
    SendFailed { to: String, reason: String },

    #[error("Background mailbox task failed: {0}")]
    Task(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Pipeline-related errors.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("Fetch failed: {0}")]
    Fetch(#[source] MailboxError),

    #[error("Label {name} unavailable: {source}")]
    Label {
        name: String,
        #[source]
        source: MailboxError,
    },

    #[error("Forward failed: {0}")]
    Forward(#[source] MailboxError),

    #[error("A pass is already running")]
    AlreadyRunning,

    #[error("Scan interval of {seconds}s does not fit before {now}")]
    Window { seconds: u64, now: String },
}
