//! Error types for inbox-assist.

use std::time::Duration;

/// Top-level error type for a run.
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
}

/// Configuration-related errors. Always fatal at startup.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required configuration: {key}. {hint}")]
    MissingRequired { key: String, hint: String },

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

/// Mail provider errors.
#[derive(Debug, thiserror::Error)]
pub enum MailError {
    #[error("Authentication failed: {reason}")]
    AuthenticationFailed { reason: String },

    #[error("Listing messages failed: {reason}")]
    ListFailed { reason: String },

    #[error("Fetching message {id} failed: {reason}")]
    FetchFailed { id: String, reason: String },

    #[error("Saving draft in thread {thread_id} failed: {reason}")]
    DraftSaveFailed { thread_id: String, reason: String },
}

impl MailError {
    /// The provider's explanation without the operation prefix.
    pub fn reason(&self) -> &str {
        match self {
            Self::AuthenticationFailed { reason }
            | Self::ListFailed { reason }
            | Self::FetchFailed { reason, .. }
            | Self::DraftSaveFailed { reason, .. } => reason,
        }
    }
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

/// Per-email pipeline errors.
///
/// Each one is scoped to a single email: the orchestrator records it on that
/// email's outcome and moves on to the next one.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PipelineError {
    #[error("Fetch failed for {id}: {reason}")]
    FetchFailed { id: String, reason: String },

    #[error("Summarization failed for {id}: {reason}")]
    SummarizationFailed { id: String, reason: String },

    #[error("Draft generation failed for {id}: {reason}")]
    DraftGenerationFailed { id: String, reason: String },

    #[error("Draft save failed for {id}: {reason}")]
    DraftSaveFailed { id: String, reason: String },
}

impl PipelineError {
    /// Short label for logging and the transcript.
    pub fn stage(&self) -> &'static str {
        match self {
            Self::FetchFailed { .. } => "fetch",
            Self::SummarizationFailed { .. } => "summarize",
            Self::DraftGenerationFailed { .. } => "draft",
            Self::DraftSaveFailed { .. } => "save",
        }
    }
}

/// Result type alias for a run.
pub type Result<T> = std::result::Result<T, Error>;
