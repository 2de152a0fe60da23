//! Gmail OAuth token loading and refresh.
//!
//! Reads the token file written by Google's installed-app flow and trades
//! its refresh token for a fresh access token when needed. The interactive
//! consent flow itself is not handled here; the token file must exist.

use std::path::Path;

use chrono::{DateTime, NaiveDateTime, Utc};
use secrecy::SecretString;
use serde::Deserialize;
use tracing::{debug, info};

use crate::error::MailError;

const GOOGLE_TOKEN_URL: &str = "https://oauth2.googleapis.com/token";

/// Seconds before expiry at which a stored token is treated as stale.
const EXPIRY_MARGIN_SECS: i64 = 60;

/// Stored OAuth token (`token.json`).
#[derive(Debug, Clone, Deserialize)]
pub struct TokenFile {
    #[serde(default, alias = "access_token")]
    pub token: Option<String>,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub token_uri: Option<String>,
    #[serde(default)]
    pub client_id: Option<String>,
    #[serde(default)]
    pub client_secret: Option<String>,
    #[serde(default)]
    pub expiry: Option<String>,
}

impl TokenFile {
    /// Read and parse a token file.
    pub fn load(path: &Path) -> Result<Self, MailError> {
        let raw = std::fs::read_to_string(path).map_err(|e| MailError::AuthenticationFailed {
            reason: format!(
                "cannot read token file {}: {e}. Complete the Gmail OAuth setup first",
                path.display()
            ),
        })?;
        Self::parse(&raw)
    }

    pub fn parse(raw: &str) -> Result<Self, MailError> {
        serde_json::from_str(raw).map_err(|e| MailError::AuthenticationFailed {
            reason: format!("malformed token file: {e}"),
        })
    }

    /// Parsed expiry, accepting RFC 3339 or naive UTC timestamps.
    pub fn expiry_time(&self) -> Option<DateTime<Utc>> {
        let raw = self.expiry.as_deref()?.trim();
        if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
            return Some(dt.with_timezone(&Utc));
        }
        NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
            .ok()
            .map(|n| n.and_utc())
    }

    /// The stored access token, if present and not about to expire.
    ///
    /// A token without a recorded expiry is only trusted when there is no
    /// refresh token to fall back on.
    pub fn usable_access_token(&self, now: DateTime<Utc>) -> Option<&str> {
        let token = self.token.as_deref().filter(|t| !t.is_empty())?;
        match self.expiry_time() {
            Some(expiry) => ((expiry - now).num_seconds() > EXPIRY_MARGIN_SECS).then_some(token),
            None if self.refresh_token.is_none() => Some(token),
            None => None,
        }
    }

    fn can_refresh(&self) -> bool {
        self.refresh_token.is_some() && self.client_id.is_some()
    }
}

#[derive(Debug, Deserialize)]
struct RefreshResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct ErrorResponse {
    error: String,
    #[serde(default)]
    error_description: Option<String>,
}

/// Produce a bearer token for the Gmail API.
///
/// `override_token` wins when set. Otherwise the token file is loaded and,
/// if its access token is stale, refreshed.
pub async fn resolve_access_token(
    http: &reqwest::Client,
    token_file: &Path,
    override_token: Option<SecretString>,
) -> Result<SecretString, MailError> {
    if let Some(token) = override_token {
        debug!("Using access token from environment");
        return Ok(token);
    }

    let stored = TokenFile::load(token_file)?;

    if let Some(token) = stored.usable_access_token(Utc::now()) {
        debug!(path = %token_file.display(), "Stored access token still valid");
        return Ok(SecretString::from(token.to_string()));
    }

    if stored.can_refresh() {
        return refresh_access_token(http, &stored).await;
    }

    Err(MailError::AuthenticationFailed {
        reason: format!(
            "token in {} is expired or missing and has no refresh token",
            token_file.display()
        ),
    })
}

async fn refresh_access_token(
    http: &reqwest::Client,
    stored: &TokenFile,
) -> Result<SecretString, MailError> {
    let client_id = stored.client_id.as_deref().unwrap_or_default();
    let refresh_token = stored.refresh_token.as_deref().unwrap_or_default();
    let token_uri = stored.token_uri.as_deref().unwrap_or(GOOGLE_TOKEN_URL);

    let mut params = vec![
        ("client_id", client_id),
        ("refresh_token", refresh_token),
        ("grant_type", "refresh_token"),
    ];
    if let Some(secret) = stored.client_secret.as_deref() {
        params.push(("client_secret", secret));
    }

    let response = http
        .post(token_uri)
        .form(&params)
        .send()
        .await
        .map_err(|e| MailError::AuthenticationFailed {
            reason: format!("token refresh request failed: {e}"),
        })?;

    if !response.status().is_success() {
        let status = response.status();
        let error: ErrorResponse = response.json().await.unwrap_or(ErrorResponse {
            error: "unknown_error".to_string(),
            error_description: None,
        });
        return Err(MailError::AuthenticationFailed {
            reason: format!(
                "token refresh rejected (HTTP {status}): {}{}",
                error.error,
                error
                    .error_description
                    .map(|d| format!(" ({d})"))
                    .unwrap_or_default()
            ),
        });
    }

    let refreshed: RefreshResponse =
        response
            .json()
            .await
            .map_err(|e| MailError::AuthenticationFailed {
                reason: format!("malformed token refresh response: {e}"),
            })?;

    info!(
        expires_in = refreshed.expires_in.unwrap_or_default(),
        "Refreshed Gmail access token"
    );
    Ok(SecretString::from(refreshed.access_token))
}
