//! Gmail REST client: list, fetch raw, create draft.
//!
//! Read and compose scopes only. Messages are fetched in `raw` format and
//! parsed locally with mail-parser; drafts are built with lettre and uploaded
//! as base64url RFC 822.

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::{URL_SAFE, URL_SAFE_NO_PAD};
use reqwest::StatusCode;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use tracing::{debug, info};

use crate::error::MailError;
use crate::mail::auth::resolve_access_token;
use crate::mail::message::{build_draft_message, parse_raw_message};
use crate::mail::{DraftId, EmailContent, MailClient, MailSelection, MessageRef};

const GMAIL_API_BASE: &str = "https://gmail.googleapis.com/gmail/v1/users/me";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Gmail API client bound to one authenticated mailbox.
pub struct GmailClient {
    http: reqwest::Client,
    token: SecretString,
    base_url: String,
    /// `Name <address>` used as the draft's From header.
    from_address: String,
    selection: MailSelection,
}

impl GmailClient {
    /// Build a client around an already-resolved access token.
    pub fn new(
        http: reqwest::Client,
        token: SecretString,
        from_address: impl Into<String>,
        selection: MailSelection,
    ) -> Self {
        Self {
            http,
            token,
            base_url: GMAIL_API_BASE.to_string(),
            from_address: from_address.into(),
            selection,
        }
    }

    /// Resolve credentials and confirm they work against the profile endpoint.
    ///
    /// Any failure here is `AuthenticationFailed`; nothing has been processed
    /// yet, so the run aborts.
    pub async fn connect(
        token_file: &Path,
        override_token: Option<SecretString>,
        from_address: impl Into<String>,
        selection: MailSelection,
    ) -> Result<Self, MailError> {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| MailError::AuthenticationFailed {
                reason: format!("Failed to create HTTP client: {e}"),
            })?;

        let token = resolve_access_token(&http, token_file, override_token).await?;
        let client = Self::new(http, token, from_address, selection);
        client.verify().await?;
        Ok(client)
    }

    async fn verify(&self) -> Result<(), MailError> {
        let response = self
            .http
            .get(format!("{}/profile", self.base_url))
            .bearer_auth(self.token.expose_secret())
            .send()
            .await
            .map_err(|e| MailError::AuthenticationFailed {
                reason: format!("profile request failed: {e}"),
            })?;

        if !response.status().is_success() {
            return Err(MailError::AuthenticationFailed {
                reason: format!("Gmail rejected credentials (HTTP {})", response.status()),
            });
        }

        let profile: Profile = response
            .json()
            .await
            .map_err(|e| MailError::AuthenticationFailed {
                reason: format!("malformed profile response: {e}"),
            })?;
        info!(mailbox = %profile.email_address, "Authenticated with Gmail");
        Ok(())
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Profile {
    email_address: String,
}

#[derive(Debug, Default, Deserialize)]
struct ListResponse {
    #[serde(default)]
    messages: Vec<ListedMessage>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListedMessage {
    id: String,
    thread_id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawMessage {
    id: String,
    thread_id: String,
    #[serde(default)]
    snippet: String,
    raw: String,
}

#[derive(Debug, Deserialize)]
struct DraftResponse {
    id: String,
}

/// Query parameters for the list call.
fn list_query(selection: MailSelection, max_count: usize) -> Vec<(&'static str, String)> {
    let mut query = vec![("labelIds", "INBOX".to_string())];
    if selection == MailSelection::Unread {
        query.push(("labelIds", "UNREAD".to_string()));
    }
    query.push(("maxResults", max_count.to_string()));
    query
}

/// Decode Gmail's base64url payload, padded or not.
fn decode_raw(raw: &str) -> Result<Vec<u8>, base64::DecodeError> {
    URL_SAFE_NO_PAD.decode(raw.trim().trim_end_matches('='))
}

/// JSON body for `drafts.create`.
fn draft_request(thread_id: &str, raw: &[u8]) -> serde_json::Value {
    serde_json::json!({
        "message": {
            "raw": URL_SAFE.encode(raw),
            "threadId": thread_id,
        }
    })
}

/// Short text for a failed response.
async fn describe_failure(response: reqwest::Response) -> String {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    let preview: String = body.chars().take(200).collect();
    match status {
        StatusCode::NOT_FOUND => "message no longer exists".to_string(),
        StatusCode::FORBIDDEN => format!("access denied: {preview}"),
        StatusCode::UNAUTHORIZED => "access token rejected".to_string(),
        _ => format!("HTTP {status}: {preview}"),
    }
}

#[async_trait]
impl MailClient for GmailClient {
    async fn list_unread(&self, max_count: usize) -> Result<Vec<MessageRef>, MailError> {
        let response = self
            .http
            .get(format!("{}/messages", self.base_url))
            .bearer_auth(self.token.expose_secret())
            .query(&list_query(self.selection, max_count))
            .send()
            .await
            .map_err(|e| MailError::ListFailed {
                reason: e.to_string(),
            })?;

        if !response.status().is_success() {
            return Err(MailError::ListFailed {
                reason: describe_failure(response).await,
            });
        }

        let listed: ListResponse = response.json().await.map_err(|e| MailError::ListFailed {
            reason: format!("malformed list response: {e}"),
        })?;

        let refs: Vec<MessageRef> = listed
            .messages
            .into_iter()
            .take(max_count)
            .map(|m| MessageRef::new(m.id, m.thread_id))
            .collect();
        debug!(count = refs.len(), "Listed messages");
        Ok(refs)
    }

    async fn fetch_body(&self, reference: &MessageRef) -> Result<EmailContent, MailError> {
        let fetch_failed = |reason: String| MailError::FetchFailed {
            id: reference.id.clone(),
            reason,
        };

        let response = self
            .http
            .get(format!("{}/messages/{}", self.base_url, reference.id))
            .bearer_auth(self.token.expose_secret())
            .query(&[("format", "raw")])
            .send()
            .await
            .map_err(|e| fetch_failed(e.to_string()))?;

        if !response.status().is_success() {
            return Err(fetch_failed(describe_failure(response).await));
        }

        let message: RawMessage = response
            .json()
            .await
            .map_err(|e| fetch_failed(format!("malformed message response: {e}")))?;

        let bytes = decode_raw(&message.raw)
            .map_err(|e| fetch_failed(format!("invalid base64 payload: {e}")))?;

        parse_raw_message(&message.id, &message.thread_id, &bytes, &message.snippet)
            .ok_or_else(|| fetch_failed("unparseable RFC 822 message".to_string()))
    }

    async fn save_draft(
        &self,
        thread_id: &str,
        in_reply_to: Option<&str>,
        to: &str,
        subject: &str,
        body: &str,
    ) -> Result<DraftId, MailError> {
        let save_failed = |reason: String| MailError::DraftSaveFailed {
            thread_id: thread_id.to_string(),
            reason,
        };

        let raw = build_draft_message(&self.from_address, to, in_reply_to, subject, body)
            .map_err(save_failed)?;

        let response = self
            .http
            .post(format!("{}/drafts", self.base_url))
            .bearer_auth(self.token.expose_secret())
            .json(&draft_request(thread_id, &raw))
            .send()
            .await
            .map_err(|e| save_failed(e.to_string()))?;

        if !response.status().is_success() {
            return Err(save_failed(describe_failure(response).await));
        }

        let draft: DraftResponse = response
            .json()
            .await
            .map_err(|e| save_failed(format!("malformed draft response: {e}")))?;
        debug!(draft_id = %draft.id, thread_id, "Draft created");
        Ok(draft.id)
    }
}
