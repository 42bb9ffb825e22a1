//! Error types for autodraft.

use std::time::Duration;

/// Top-level error type.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Mail error: {0}")]
    Mail(#[from] MailError),

    #[error("LLM error: {0}")]
    Llm(#[from] LlmError),

    #[error("Pipeline error: {0}")]
    Pipeline(#[from] PipelineError),

    #[error("Corpus error: {0}")]
    Corpus(#[from] CorpusError),
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Missing required configuration: {key}. {hint}")]
    MissingRequired { key: String, hint: String },

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

/// Mail collaborator errors.
///
/// Every failure to reach or talk to the mailbox surfaces here; an empty
/// mailbox is never reported as an error.
#[derive(Debug, thiserror::Error)]
pub enum MailError {
    #[error("Failed to connect to {host}:{port}: {reason}")]
    Connect {
        host: String,
        port: u16,
        reason: String,
    },

    #[error("TLS setup failed: {0}")]
    Tls(String),

    #[error("Authentication failed for {username}")]
    AuthFailed { username: String },

    #[error("Protocol error in {command}: {reason}")]
    Protocol { command: String, reason: String },

    #[error("Thread {thread_id} not found")]
    ThreadNotFound { thread_id: String },

    #[error("Failed to build draft: {0}")]
    DraftBuild(String),

    #[error("Mail task aborted: {0}")]
    TaskAborted(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// LLM provider errors.
#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("Provider {provider} request failed: {reason}")]
    RequestFailed { provider: String, reason: String },

    #[error("Provider {provider} rate limited, retry after {retry_after:?}")]
    RateLimited {
        provider: String,
        retry_after: Option<Duration>,
    },

    #[error("Invalid response from {provider}: {reason}")]
    InvalidResponse { provider: String, reason: String },

    #[error("Authentication failed for provider {provider}")]
    AuthFailed { provider: String },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Drafting pipeline errors.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("Filter stage failed: {0}")]
    Filter(String),

    #[error("Thread analysis failed for {thread_id}: {reason}")]
    Analysis { thread_id: String, reason: String },

    #[error("Draft writing failed for {thread_id}: {reason}")]
    Drafting { thread_id: String, reason: String },

    #[error("Invalid draft input: {0}")]
    InvalidDraftInput(String),

    #[error("Mail error: {0}")]
    Mail(#[from] MailError),

    #[error("LLM error: {0}")]
    Llm(#[from] LlmError),
}

/// Retrieval corpus backend errors.
#[derive(Debug, thiserror::Error)]
pub enum CorpusError {
    #[error("Corpus backend request failed: {0}")]
    Request(String),

    #[error("Corpus backend returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Corpus {0} not found")]
    NotFound(String),

    #[error("Invalid corpus backend response: {0}")]
    InvalidResponse(String),

    #[error("Missing access token: {0}")]
    MissingToken(String),
}

impl From<reqwest::Error> for CorpusError {
    fn from(e: reqwest::Error) -> Self {
        Self::Request(e.to_string())
    }
}

/// Result type alias.
pub type Result<T> = std::result::Result<T, Error>;
