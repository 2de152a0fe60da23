//! Summarizer: one model call per email, parsed into an `EmailSummary`.
//!
//! The model is asked for labelled lines (`SUMMARY:`, `URGENCY:` ...). The
//! parser is deliberately forgiving: unknown lines are ignored, missing
//! labels take safe defaults, and it never fails. Only the model call itself
//! can fail.

use std::sync::Arc;

use chrono::{Local, NaiveDate};
use tracing::{debug, info, warn};

use crate::error::PipelineError;
use crate::llm::provider::{ChatMessage, CompletionRequest, FinishReason, LlmProvider};
use crate::mail::EmailContent;
use crate::pipeline::types::{EmailSummary, Urgency};

/// Body characters sent to the model.
const BODY_PREVIEW_CHARS: usize = 3000;

const SUMMARY_TEMPERATURE: f32 = 0.2;

const SUMMARY_MAX_TOKENS: u32 = 1024;

/// Produces structured summaries from email content.
pub struct Summarizer {
    llm: Arc<dyn LlmProvider>,
}

impl Summarizer {
    pub fn new(llm: Arc<dyn LlmProvider>) -> Self {
        Self { llm }
    }

    /// Summarize one email and decide whether it needs a reply.
    pub async fn summarize(&self, email: &EmailContent) -> Result<EmailSummary, PipelineError> {
        let today = Local::now().date_naive();
        let request = CompletionRequest::new(vec![
            ChatMessage::system(build_summary_system_prompt()),
            ChatMessage::user(build_summary_user_prompt(email, today)),
        ])
        .with_temperature(SUMMARY_TEMPERATURE)
        .with_max_tokens(SUMMARY_MAX_TOKENS);

        let response = self.llm.complete(request).await.map_err(|e| {
            PipelineError::SummarizationFailed {
                id: email.id.clone(),
                reason: e.to_string(),
            }
        })?;

        if response.finish_reason == FinishReason::Length {
            warn!(id = %email.id, "Summary hit the token limit, parsing what arrived");
        }

        let summary = parse_summary(&response.content);
        if summary.summary_text.is_empty() {
            debug!(raw_response = %response.content, "No SUMMARY line in model output");
        }

        info!(
            id = %email.id,
            urgency = %summary.urgency,
            reply_needed = summary.reply_needed,
            action_required = summary.action_required,
            "Email summarized"
        );
        Ok(summary)
    }
}

fn build_summary_system_prompt() -> String {
    "You are an expert executive assistant triaging an inbox. \
Read each email carefully and decide what the sender wants and whether the \
recipient needs to write back. Newsletters, receipts, automated \
notifications and FYI messages do not need a reply. Direct questions, \
requests and anything awaiting a decision do.

Respond with exactly these labelled lines and nothing else:
SUMMARY: <2-3 sentence summary>
SENDER_INTENT: <what the sender wants, one line>
KEY_POINTS: <key points separated by semicolons>
ACTION_REQUIRED: <YES or NO>
URGENCY: <LOW, MEDIUM or HIGH>
REPLY_NEEDED: <YES or NO>
REPLY_REASON: <why a reply is or is not needed>"
        .to_string()
}

fn build_summary_user_prompt(email: &EmailContent, today: NaiveDate) -> String {
    let body: String = email.body_text.chars().take(BODY_PREVIEW_CHARS).collect();
    let received = if email.received_at.is_empty() {
        "unknown"
    } else {
        email.received_at.as_str()
    };

    format!(
        "Analyze this email.\n\n\
TODAY'S DATE: {today}\n\
FROM: {sender}\n\
SUBJECT: {subject}\n\
DATE RECEIVED: {received}\n\
BODY:\n{body}",
        today = today.format("%Y-%m-%d"),
        sender = email.sender,
        subject = email.subject,
    )
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Field {
    Summary,
    SenderIntent,
    KeyPoints,
    ActionRequired,
    Urgency,
    ReplyNeeded,
    ReplyReason,
}

impl Field {
    fn from_label(label: &str) -> Option<Self> {
        let normalized = label.trim().to_uppercase().replace([' ', '-'], "_");
        match normalized.as_str() {
            "SUMMARY" => Some(Self::Summary),
            "SENDER_INTENT" | "INTENT" => Some(Self::SenderIntent),
            "KEY_POINTS" => Some(Self::KeyPoints),
            "ACTION_REQUIRED" => Some(Self::ActionRequired),
            "URGENCY" => Some(Self::Urgency),
            "REPLY_NEEDED" | "NEEDS_REPLY" => Some(Self::ReplyNeeded),
            "REPLY_REASON" => Some(Self::ReplyReason),
            _ => None,
        }
    }
}

/// Leading list/heading decoration, and whether it included a bullet.
fn strip_decoration(line: &str) -> (&str, bool) {
    let trimmed = line.trim_start();
    let bulleted = trimmed.starts_with(['-', '•']) || trimmed.starts_with("* ");
    let content = trimmed.trim_start_matches(|c: char| {
        matches!(c, '-' | '*' | '•' | '#' | '>') || c.is_whitespace()
    });
    (content, bulleted)
}

/// Split `LABEL: value` when the label is one we know.
fn split_label(content: &str) -> Option<(Field, &str)> {
    let (label, value) = content.split_once(':')?;
    let label = label.trim_end_matches('*');
    if label.is_empty()
        || label.len() > 24
        || !label
            .chars()
            .all(|c| c.is_ascii_alphabetic() || matches!(c, ' ' | '_' | '-'))
    {
        return None;
    }
    let field = Field::from_label(label)?;
    Some((field, clean_value(value)))
}

/// `SOME_LABEL: ...` shape, for labels we don't know.
fn looks_like_label(content: &str) -> bool {
    let Some((label, _)) = content.split_once(':') else {
        return false;
    };
    let label = label.trim_matches('*').trim();
    label.len() >= 2
        && label.len() <= 32
        && label.starts_with(|c: char| c.is_ascii_uppercase())
        && label
            .chars()
            .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit() || c == '_')
}

fn clean_value(value: &str) -> &str {
    value.trim_matches(|c: char| c == '*' || c == '`' || c.is_whitespace())
}

/// yes/no/true/false/y/n, first word only.
fn parse_flag(value: &str) -> Option<bool> {
    let word = value
        .split_whitespace()
        .next()?
        .trim_matches(|c: char| !c.is_alphanumeric())
        .to_lowercase();
    match word.as_str() {
        "yes" | "y" | "true" => Some(true),
        "no" | "n" | "false" => Some(false),
        _ => None,
    }
}

fn split_points(value: &str) -> Vec<String> {
    let separator = if value.contains(';') { ';' } else { ',' };
    value
        .split(separator)
        .map(|p| clean_value(p).to_string())
        .filter(|p| !p.is_empty())
        .collect()
}

/// Parse labelled model output into a summary.
///
/// Never fails: missing or unreadable fields keep their defaults
/// (`action_required = false`, `urgency = Low`, `reply_needed = false`).
pub fn parse_summary(raw: &str) -> EmailSummary {
    let mut summary = EmailSummary::default();
    let mut current: Option<Field> = None;

    for line in raw.lines() {
        if line.trim().is_empty() || line.trim_start().starts_with("```") {
            continue;
        }
        let (content, bulleted) = strip_decoration(line);

        if let Some((field, value)) = split_label(content) {
            current = Some(field);
            match field {
                Field::Summary => summary.summary_text = value.to_string(),
                Field::SenderIntent => summary.sender_intent = value.to_string(),
                Field::KeyPoints => summary.key_points = split_points(value),
                Field::ActionRequired => {
                    summary.action_required = parse_flag(value).unwrap_or(false);
                }
                Field::Urgency => summary.urgency = value.parse::<Urgency>().unwrap_or_default(),
                Field::ReplyNeeded => summary.reply_needed = parse_flag(value).unwrap_or(false),
                Field::ReplyReason => summary.reply_reason = value.to_string(),
            }
            continue;
        }

        if looks_like_label(content) {
            current = None;
            continue;
        }

        let text = clean_value(content);
        match current {
            Some(Field::Summary) => {
                if !summary.summary_text.is_empty() {
                    summary.summary_text.push(' ');
                }
                summary.summary_text.push_str(text);
            }
            Some(Field::KeyPoints) if bulleted && !text.is_empty() => {
                summary.key_points.push(text.to_string());
            }
            Some(Field::ReplyReason) => {
                if !summary.reply_reason.is_empty() {
                    summary.reply_reason.push(' ');
                }
                summary.reply_reason.push_str(text);
            }
            _ => {}
        }
    }

    if !summary.reply_needed {
        summary.reply_reason.clear();
    }
    summary
}
