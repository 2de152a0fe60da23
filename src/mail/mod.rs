//! Mail provider capability: list unread, fetch content, save drafts.
//!
//! The pipeline only sees the `MailClient` trait. `GmailClient` is the one
//! concrete implementation; its token handling lives in `auth`.
//!
//! **No send path exists.** Drafts are saved to the provider for the user to
//! review and send by hand.

pub mod auth;
pub mod gmail;
pub mod message;

pub use gmail::GmailClient;

use std::str::FromStr;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::MailError;

/// Provider-assigned draft identifier.
pub type DraftId = String;

/// Reference returned by listing: enough to fetch the full message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageRef {
    pub id: String,
    pub thread_id: String,
}

impl MessageRef {
    pub fn new(id: impl Into<String>, thread_id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            thread_id: thread_id.into(),
        }
    }
}

/// A fetched email. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmailContent {
    pub id: String,
    pub thread_id: String,
    /// Raw From header, e.g. `Jane Doe <jane@example.com>`.
    pub sender: String,
    /// Bare address extracted from `sender`; replies go here.
    pub sender_email: String,
    pub subject: String,
    /// Cleaned plain-text body.
    pub body_text: String,
    /// Date header as sent, may be empty.
    pub received_at: String,
    /// Message-ID header without angle brackets. Drafts reference it.
    #[serde(default)]
    pub message_id: Option<String>,
}

/// Which messages `list_unread` returns.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MailSelection {
    /// Unread messages in the inbox.
    #[default]
    Unread,
    /// Most recent inbox messages regardless of read state.
    Latest,
}

impl FromStr for MailSelection {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "unread" => Ok(Self::Unread),
            "latest" => Ok(Self::Latest),
            other => Err(format!("unknown mail selection '{other}' (expected unread or latest)")),
        }
    }
}

/// Mail provider capability used by the orchestrator.
#[async_trait]
pub trait MailClient: Send + Sync {
    /// Up to `max_count` message references, in provider order.
    async fn list_unread(&self, max_count: usize) -> Result<Vec<MessageRef>, MailError>;

    /// Full content of one message.
    async fn fetch_body(&self, reference: &MessageRef) -> Result<EmailContent, MailError>;

    /// Create a draft in `thread_id`, as a reply to `in_reply_to` when the
    /// original's Message-ID is known. Never sends it.
    async fn save_draft(
        &self,
        thread_id: &str,
        in_reply_to: Option<&str>,
        to: &str,
        subject: &str,
        body: &str,
    ) -> Result<DraftId, MailError>;
}

/// Subject for a reply: `Re: ` is prefixed once.
pub fn reply_subject(subject: &str) -> String {
    let trimmed = subject.trim();
    let already_reply = trimmed
        .get(..3)
        .is_some_and(|prefix| prefix.eq_ignore_ascii_case("re:"));
    if already_reply {
        trimmed.to_string()
    } else {
        format!("Re: {trimmed}")
    }
}
