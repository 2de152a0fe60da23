//! Configuration types.
//!
//! Read once from the environment at startup and passed by reference into
//! the orchestrator. Nothing here is mutated after construction.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use secrecy::SecretString;
use serde::Serialize;

use crate::error::ConfigError;
use crate::llm::{LlmBackend, LlmConfig};
use crate::mail::MailSelection;

/// Default number of emails processed per run.
pub const DEFAULT_MAX_EMAILS: usize = 10;

/// Upper bound for `max_emails` (one Gmail list page).
pub const MAX_EMAILS_LIMIT: usize = 500;

/// Reply tone.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Tone {
    #[default]
    Professional,
    Casual,
    Formal,
}

impl Tone {
    /// Style descriptor handed to the drafting prompt.
    pub fn descriptor(self) -> &'static str {
        match self {
            Self::Professional => "professional, clear, and concise",
            Self::Casual => "friendly, warm, and conversational",
            Self::Formal => "formal, polished, and respectful",
        }
    }
}

impl FromStr for Tone {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "professional" => Ok(Self::Professional),
            "casual" => Ok(Self::Casual),
            "formal" => Ok(Self::Formal),
            other => Err(format!(
                "unknown tone '{other}' (expected professional, casual or formal)"
            )),
        }
    }
}

impl fmt::Display for Tone {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Professional => "professional",
            Self::Casual => "casual",
            Self::Formal => "formal",
        };
        f.write_str(s)
    }
}

/// How the run reports its results on stdout.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ReportFormat {
    /// Human-readable transcript plus digest block.
    #[default]
    Text,
    /// A single pretty-printed JSON `RunReport`.
    Json,
}

impl FromStr for ReportFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "text" => Ok(Self::Text),
            "json" => Ok(Self::Json),
            other => Err(format!("unknown report format '{other}' (expected text or json)")),
        }
    }
}

/// Pipeline configuration: identity, tone and batch size.
#[derive(Debug, Clone)]
pub struct AssistConfig {
    /// Maximum number of messages requested from the mail provider.
    pub max_emails: usize,
    /// Tone used for drafted replies.
    pub tone: Tone,
    /// Name used to sign replies.
    pub user_name: String,
    /// The user's own address.
    pub user_email: String,
    /// Which messages are listed.
    pub selection: MailSelection,
}

impl AssistConfig {
    /// Build a config with defaults for everything but identity.
    pub fn new(user_name: impl Into<String>, user_email: impl Into<String>) -> Self {
        Self {
            max_emails: DEFAULT_MAX_EMAILS,
            tone: Tone::default(),
            user_name: user_name.into(),
            user_email: user_email.into(),
            selection: MailSelection::default(),
        }
    }

    pub fn with_max_emails(mut self, max_emails: usize) -> Self {
        self.max_emails = max_emails;
        self
    }

    pub fn with_tone(mut self, tone: Tone) -> Self {
        self.tone = tone;
        self
    }

    pub fn with_selection(mut self, selection: MailSelection) -> Self {
        self.selection = selection;
        self
    }

    /// Build config from environment variables and validate it.
    pub fn from_env() -> Result<Self, ConfigError> {
        let user_name = required_var(
            &["ASSIST_USER_NAME", "YOUR_NAME"],
            "Set it to the name used to sign drafted replies.",
        )?;
        let user_email = required_var(
            &["ASSIST_USER_EMAIL", "YOUR_EMAIL"],
            "Set it to the address of the mailbox being processed.",
        )?;

        let tone = match optional_var(&["ASSIST_TONE", "EMAIL_TONE"]) {
            Some((key, value)) => value
                .parse()
                .map_err(|message| ConfigError::InvalidValue { key, message })?,
            None => Tone::default(),
        };

        let max_emails = match optional_var(&["ASSIST_MAX_EMAILS", "MAX_EMAILS_TO_PROCESS"]) {
            Some((key, value)) => {
                value
                    .trim()
                    .parse::<usize>()
                    .map_err(|e| ConfigError::InvalidValue {
                        key,
                        message: format!("'{value}' is not a positive integer: {e}"),
                    })?
            }
            None => DEFAULT_MAX_EMAILS,
        };

        let selection = match optional_var(&["ASSIST_MAIL_SELECTION"]) {
            Some((key, value)) => value
                .parse()
                .map_err(|message| ConfigError::InvalidValue { key, message })?,
            None => MailSelection::default(),
        };

        let config = Self {
            max_emails,
            tone,
            user_name,
            user_email,
            selection,
        };
        config.validate()?;
        Ok(config)
    }

    /// Check identity fields and the batch size.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.user_name.trim().is_empty() {
            return Err(ConfigError::InvalidValue {
                key: "ASSIST_USER_NAME".into(),
                message: "must not be empty".into(),
            });
        }
        if !self.user_email.contains('@') {
            return Err(ConfigError::InvalidValue {
                key: "ASSIST_USER_EMAIL".into(),
                message: format!("'{}' is not an email address", self.user_email),
            });
        }
        if self.max_emails == 0 || self.max_emails > MAX_EMAILS_LIMIT {
            return Err(ConfigError::InvalidValue {
                key: "ASSIST_MAX_EMAILS".into(),
                message: format!(
                    "must be between 1 and {MAX_EMAILS_LIMIT}, got {}",
                    self.max_emails
                ),
            });
        }
        Ok(())
    }
}

/// Everything the binary needs besides the pipeline config.
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    pub llm: LlmConfig,
    /// Path of the stored OAuth token.
    pub token_file: PathBuf,
    /// Bearer token that bypasses the token file.
    pub access_token: Option<SecretString>,
    pub report: ReportFormat,
}

impl RuntimeConfig {
    /// Build runtime config from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        let backend = match optional_var(&["ASSIST_LLM_BACKEND"]) {
            Some((key, value)) => value
                .parse::<LlmBackend>()
                .map_err(|message| ConfigError::InvalidValue { key, message })?,
            None => LlmBackend::default(),
        };

        let key_var = backend.api_key_var();
        let api_key = required_var(
            &[key_var],
            &format!("Export the API key for the {backend} backend."),
        )?;

        let model = std::env::var("ASSIST_MODEL")
            .ok()
            .filter(|m| !m.trim().is_empty())
            .unwrap_or_else(|| backend.default_model().to_string());

        let token_file = std::env::var("GMAIL_TOKEN_FILE")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("token.json"));

        let access_token = std::env::var("GMAIL_ACCESS_TOKEN")
            .ok()
            .filter(|t| !t.trim().is_empty())
            .map(SecretString::from);

        let report = match optional_var(&["ASSIST_REPORT"]) {
            Some((key, value)) => value
                .parse()
                .map_err(|message| ConfigError::InvalidValue { key, message })?,
            None => ReportFormat::default(),
        };

        Ok(Self {
            llm: LlmConfig {
                backend,
                api_key: SecretString::from(api_key),
                model,
            },
            token_file,
            access_token,
            report,
        })
    }
}

/// First non-empty value among `keys`, with the key it came from.
fn optional_var(keys: &[&str]) -> Option<(String, String)> {
    keys.iter().find_map(|key| {
        std::env::var(key)
            .ok()
            .filter(|v| !v.trim().is_empty())
            .map(|v| ((*key).to_string(), v))
    })
}

fn required_var(keys: &[&str], hint: &str) -> Result<String, ConfigError> {
    optional_var(keys)
        .map(|(_, v)| v.trim().to_string())
        .ok_or_else(|| ConfigError::MissingRequired {
            key: keys.join(" or "),
            hint: hint.to_string(),
        })
}
