//! LLM integration for inbox-assist.
//!
//! Supports:
//! - **Groq**: OpenAI-compatible chat completions over reqwest (default)
//! - **Anthropic**: Direct API access via rig-core
//! - **OpenAI**: Direct API access via rig-core
//!
//! Every backend is reached through the `LlmProvider` trait; the pipeline
//! never sees which one is in use.

pub mod costs;
pub mod openai_compat;
pub mod provider;
mod rig_adapter;

pub use costs::{MeteredProvider, UsageReport};
pub use openai_compat::OpenAiCompatProvider;
pub use provider::*;
pub use rig_adapter::RigAdapter;

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use rig::client::CompletionClient;
use secrecy::ExposeSecret;

use crate::error::LlmError;

/// Supported LLM backends.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LlmBackend {
    #[default]
    Groq,
    Anthropic,
    OpenAi,
}

impl LlmBackend {
    /// Environment variable holding this backend's API key.
    pub fn api_key_var(self) -> &'static str {
        match self {
            Self::Groq => "GROQ_API_KEY",
            Self::Anthropic => "ANTHROPIC_API_KEY",
            Self::OpenAi => "OPENAI_API_KEY",
        }
    }

    /// Model used when none is configured.
    pub fn default_model(self) -> &'static str {
        match self {
            Self::Groq => "llama-3.3-70b-versatile",
            Self::Anthropic => "claude-sonnet-4-20250514",
            Self::OpenAi => "gpt-4o-mini",
        }
    }
}

impl FromStr for LlmBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "groq" => Ok(Self::Groq),
            "anthropic" => Ok(Self::Anthropic),
            "openai" => Ok(Self::OpenAi),
            other => Err(format!(
                "unknown LLM backend '{other}' (expected groq, anthropic or openai)"
            )),
        }
    }
}

impl fmt::Display for LlmBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Groq => "groq",
            Self::Anthropic => "anthropic",
            Self::OpenAi => "openai",
        };
        f.write_str(s)
    }
}

/// Configuration for creating an LLM provider.
#[derive(Debug, Clone)]
pub struct LlmConfig {
    pub backend: LlmBackend,
    pub api_key: secrecy::SecretString,
    pub model: String,
}

/// Create an LLM provider from configuration.
pub fn create_provider(config: &LlmConfig) -> Result<Arc<dyn LlmProvider>, LlmError> {
    match config.backend {
        LlmBackend::Groq => create_groq_provider(config),
        LlmBackend::Anthropic => create_anthropic_provider(config),
        LlmBackend::OpenAi => create_openai_provider(config),
    }
}

fn create_groq_provider(config: &LlmConfig) -> Result<Arc<dyn LlmProvider>, LlmError> {
    let provider = OpenAiCompatProvider::new(
        "groq",
        openai_compat::GROQ_BASE_URL,
        config.api_key.clone(),
        &config.model,
    )?;
    tracing::info!("Using Groq (model: {})", config.model);
    Ok(Arc::new(provider))
}

fn create_anthropic_provider(config: &LlmConfig) -> Result<Arc<dyn LlmProvider>, LlmError> {
    use rig::providers::anthropic;

    let client: rig::client::Client<anthropic::client::AnthropicExt> =
        anthropic::Client::new(config.api_key.expose_secret()).map_err(|e| {
            LlmError::RequestFailed {
                provider: "anthropic".to_string(),
                reason: format!("Failed to create Anthropic client: {}", e),
            }
        })?;

    let model = client.completion_model(&config.model);
    tracing::info!("Using Anthropic (model: {})", config.model);
    Ok(Arc::new(RigAdapter::new(model, &config.model)))
}

fn create_openai_provider(config: &LlmConfig) -> Result<Arc<dyn LlmProvider>, LlmError> {
    use rig::providers::openai;

    let client: rig::client::Client<openai::client::OpenAIResponsesExt> =
        openai::Client::new(config.api_key.expose_secret()).map_err(|e| {
            LlmError::RequestFailed {
                provider: "openai".to_string(),
                reason: format!("Failed to create OpenAI client: {}", e),
            }
        })?;

    let model = client.completion_model(&config.model);
    tracing::info!("Using OpenAI (model: {})", config.model);
    Ok(Arc::new(RigAdapter::new(model, &config.model)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_groq_provider() {
        let config = LlmConfig {
            backend: LlmBackend::Groq,
            api_key: secrecy::SecretString::from("gsk-test"),
            model: "llama-3.3-70b-versatile".to_string(),
        };
        let provider = create_provider(&config);
        assert!(provider.is_ok());
        assert_eq!(provider.unwrap().model_name(), "llama-3.3-70b-versatile");
    }

    #[test]
    fn test_create_provider_missing_key_still_constructs() {
        // rig-core clients accept any string as API key at construction time.
        // The actual auth failure happens when making a request.
        let config = LlmConfig {
            backend: LlmBackend::Anthropic,
            api_key: secrecy::SecretString::from("test-key"),
            model: "claude-3-5-sonnet-latest".to_string(),
        };
        let provider = create_provider(&config);
        assert!(provider.is_ok());
        assert_eq!(provider.unwrap().model_name(), "claude-3-5-sonnet-latest");
    }

    #[test]
    fn test_create_openai_provider() {
        let config = LlmConfig {
            backend: LlmBackend::OpenAi,
            api_key: secrecy::SecretString::from("sk-test"),
            model: "gpt-4o".to_string(),
        };
        let provider = create_provider(&config);
        assert!(provider.is_ok());
        assert_eq!(provider.unwrap().model_name(), "gpt-4o");
    }

    #[test]
    fn backend_parsing_and_defaults() {
        assert_eq!("GROQ".parse::<LlmBackend>().unwrap(), LlmBackend::Groq);
        assert_eq!("openai".parse::<LlmBackend>().unwrap(), LlmBackend::OpenAi);
        assert!("mistral".parse::<LlmBackend>().is_err());
        assert_eq!(LlmBackend::default(), LlmBackend::Groq);
        assert_eq!(LlmBackend::Groq.api_key_var(), "GROQ_API_KEY");
        assert_eq!(LlmBackend::Groq.default_model(), "llama-3.3-70b-versatile");
    }
}
