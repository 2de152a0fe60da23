//! Reply drafter. Writes the body of a reply for the user to review.

use std::sync::Arc;

use tracing::{debug, info};

use crate::config::Tone;
use crate::error::PipelineError;
use crate::llm::provider::{ChatMessage, CompletionRequest, LlmProvider};
use crate::mail::EmailContent;
use crate::pipeline::types::EmailSummary;

const DRAFT_TEMPERATURE: f32 = 0.2;

const DRAFT_MAX_TOKENS: u32 = 1024;

/// Drafts reply bodies. Only called for emails whose summary needs a reply.
pub struct ReplyDrafter {
    llm: Arc<dyn LlmProvider>,
}

impl ReplyDrafter {
    pub fn new(llm: Arc<dyn LlmProvider>) -> Self {
        Self { llm }
    }

    /// Draft a reply body in `tone`, signed as `user_name`.
    ///
    /// Returns the trimmed completion. An empty completion is an error: there
    /// is nothing worth saving.
    pub async fn draft_reply(
        &self,
        email: &EmailContent,
        summary: &EmailSummary,
        tone: Tone,
        user_name: &str,
        user_email: &str,
    ) -> Result<String, PipelineError> {
        let request = CompletionRequest::new(vec![
            ChatMessage::system(build_draft_system_prompt(tone, user_name, user_email)),
            ChatMessage::user(build_draft_user_prompt(email, summary, user_name)),
        ])
        .with_temperature(DRAFT_TEMPERATURE)
        .with_max_tokens(DRAFT_MAX_TOKENS);

        let response = self.llm.complete(request).await.map_err(|e| {
            PipelineError::DraftGenerationFailed {
                id: email.id.clone(),
                reason: e.to_string(),
            }
        })?;

        let body = response.content.trim().to_string();
        if body.is_empty() {
            return Err(PipelineError::DraftGenerationFailed {
                id: email.id.clone(),
                reason: "model returned an empty draft".to_string(),
            });
        }

        debug!(id = %email.id, chars = body.len(), "Draft body generated");
        info!(id = %email.id, tone = %tone, "Reply drafted");
        Ok(body)
    }
}

fn build_draft_system_prompt(tone: Tone, user_name: &str, user_email: &str) -> String {
    format!(
        "You are drafting email replies on behalf of {user_name} <{user_email}>.\n\
Tone: {tone}.\n\
Never invent facts, dates or commitments. Use [DATE], [TIME] or [DETAIL] \
where specific information is needed.\n\
Write only the email body. No subject line.",
        tone = tone.descriptor(),
    )
}

fn build_draft_user_prompt(email: &EmailContent, summary: &EmailSummary, user_name: &str) -> String {
    let mut analysis = format!(
        "SUMMARY: {}\nURGENCY: {}\nREPLY_REASON: {}",
        summary.summary_text, summary.urgency, summary.reply_reason
    );
    if !summary.sender_intent.is_empty() {
        analysis.push_str(&format!("\nSENDER_INTENT: {}", summary.sender_intent));
    }
    if !summary.key_points.is_empty() {
        analysis.push_str(&format!("\nKEY_POINTS: {}", summary.key_points.join("; ")));
    }

    format!(
        "Draft a reply to this email.\n\n\
FROM: {sender}\n\
SUBJECT: {subject}\n\n\
ANALYSIS:\n{analysis}\n\n\
INSTRUCTIONS:\n\
- Address the sender's request directly\n\
- Keep it under 200 words\n\
- Use [DATE], [TIME], [DETAIL] as placeholders where needed\n\
- Sign off as: {user_name}\n\n\
Write the email body:",
        sender = email.sender,
        subject = email.subject,
    )
}
