//! Orchestrator: runs the batch. List, then per email fetch → summarize →
//! draft → save, then fold the outcomes into a digest.
//!
//! **Core invariant: nothing is ever sent.** Replies end as drafts in the
//! user's mailbox.
//!
//! Emails are processed strictly one after another. A failure on one email is
//! recorded on its outcome and the batch moves on; only a failed listing (or
//! invalid config) aborts the run.

use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::config::AssistConfig;
use crate::error::{PipelineError, Result};
use crate::llm::{LlmProvider, MeteredProvider};
use crate::mail::{EmailContent, MailClient, MessageRef, reply_subject};
use crate::pipeline::drafter::ReplyDrafter;
use crate::pipeline::summarizer::Summarizer;
use crate::pipeline::types::{
    Digest, DraftResult, EmailSummary, ProcessingOutcome, ReplyOutcome, RunReport,
};
use crate::report;

/// Drives one run over the mailbox.
pub struct Orchestrator {
    mail: Arc<dyn MailClient>,
    summarizer: Summarizer,
    drafter: ReplyDrafter,
    metering: Option<Arc<MeteredProvider>>,
    transcript: bool,
}

impl Orchestrator {
    /// Summarizer and drafter share `llm`.
    pub fn new(mail: Arc<dyn MailClient>, llm: Arc<dyn LlmProvider>) -> Self {
        Self {
            mail,
            summarizer: Summarizer::new(Arc::clone(&llm)),
            drafter: ReplyDrafter::new(llm),
            metering: None,
            transcript: false,
        }
    }

    /// Like `new`, and the run report carries the metered token usage.
    pub fn metered(mail: Arc<dyn MailClient>, llm: Arc<MeteredProvider>) -> Self {
        let shared: Arc<dyn LlmProvider> = llm.clone();
        let mut orchestrator = Self::new(mail, shared);
        orchestrator.metering = Some(llm);
        orchestrator
    }

    /// Print the human-readable transcript and digest to stdout.
    pub fn with_transcript(mut self, enabled: bool) -> Self {
        self.transcript = enabled;
        self
    }

    /// Process up to `config.max_emails` emails.
    ///
    /// Returns an error only when config is invalid or the listing fails.
    /// Per-email failures are in the report's outcomes.
    pub async fn run(&self, config: &AssistConfig) -> Result<RunReport> {
        config.validate()?;
        let run_id = Uuid::new_v4();
        let started_at = Utc::now();

        info!(
            %run_id,
            max_emails = config.max_emails,
            tone = %config.tone,
            "Starting inbox run"
        );

        let references = self.mail.list_unread(config.max_emails).await.map_err(|e| {
            error!(%run_id, error = %e, "Listing messages failed, aborting run");
            e
        })?;
        let total = references.len();
        info!(%run_id, count = total, "Messages to process");

        if self.transcript {
            println!("{}", report::render_run_header(total));
        }

        let mut outcomes = Vec::with_capacity(total);
        for (index, reference) in references.into_iter().enumerate() {
            let outcome = self.process_one(reference, config).await;
            if self.transcript {
                println!("{}", report::render_outcome(index + 1, total, &outcome));
            }
            outcomes.push(outcome);
        }

        let digest = Digest::from_outcomes(&outcomes);
        info!(
            %run_id,
            total_processed = digest.total_processed,
            drafts_saved = digest.drafts_saved,
            no_reply_needed = digest.no_reply_needed,
            failed = digest.failed,
            "Run complete"
        );

        let run_report = RunReport {
            run_id,
            started_at,
            finished_at: Utc::now(),
            digest,
            outcomes,
            usage: self.metering.as_ref().map(|m| m.snapshot()),
        };

        if self.transcript {
            println!("{}", report::render_digest(&run_report));
        }
        Ok(run_report)
    }

    /// Run one email through every stage. Never fails: errors land on the
    /// outcome.
    async fn process_one(&self, reference: MessageRef, config: &AssistConfig) -> ProcessingOutcome {
        debug!(id = %reference.id, thread_id = %reference.thread_id, "Fetching message");

        let email = match self.mail.fetch_body(&reference).await {
            Ok(email) => email,
            Err(e) => {
                let err = PipelineError::FetchFailed {
                    id: reference.id.clone(),
                    reason: e.reason().to_string(),
                };
                return failed(reference, None, None, err);
            }
        };

        info!(
            id = %email.id,
            sender = %email.sender,
            subject = %email.subject,
            "Processing email"
        );

        let summary = match self.summarizer.summarize(&email).await {
            Ok(summary) => summary,
            Err(err) => return failed(reference, Some(email), None, err),
        };

        if !summary.reply_needed {
            debug!(id = %email.id, "No reply needed");
            return ProcessingOutcome {
                reference,
                email: Some(email),
                summary: Some(summary),
                result: Ok(ReplyOutcome::Skipped),
            };
        }

        match self.draft_and_save(&email, &summary, config).await {
            Ok(draft) => ProcessingOutcome {
                reference,
                email: Some(email),
                summary: Some(summary),
                result: Ok(ReplyOutcome::Drafted(draft)),
            },
            Err(err) => failed(reference, Some(email), Some(summary), err),
        }
    }

    async fn draft_and_save(
        &self,
        email: &EmailContent,
        summary: &EmailSummary,
        config: &AssistConfig,
    ) -> std::result::Result<DraftResult, PipelineError> {
        let body = self
            .drafter
            .draft_reply(email, summary, config.tone, &config.user_name, &config.user_email)
            .await?;

        let subject = reply_subject(&email.subject);
        let draft_id = self
            .mail
            .save_draft(
                &email.thread_id,
                email.message_id.as_deref(),
                &email.sender_email,
                &subject,
                &body,
            )
            .await
            .map_err(|e| PipelineError::DraftSaveFailed {
                id: email.id.clone(),
                reason: e.reason().to_string(),
            })?;

        info!(
            id = %email.id,
            draft_id = %draft_id,
            to = %email.sender_email,
            "Draft saved (not sent)"
        );

        Ok(DraftResult {
            draft_id,
            to: email.sender_email.clone(),
            subject,
            body,
        })
    }
}

fn failed(
    reference: MessageRef,
    email: Option<EmailContent>,
    summary: Option<EmailSummary>,
    err: PipelineError,
) -> ProcessingOutcome {
    warn!(
        id = %reference.id,
        stage = err.stage(),
        error = %err,
        "Email failed, continuing with the batch"
    );
    ProcessingOutcome {
        reference,
        email,
        summary,
        result: Err(err),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::Mutex;

    use async_trait::async_trait;
    use rust_decimal::Decimal;

    use crate::error::{Error, LlmError, MailError};
    use crate::llm::provider::{CompletionRequest, CompletionResponse, FinishReason};
    use crate::mail::DraftId;

    // ── Mock mail ───────────────────────────────────────────────

    #[derive(Default)]
    struct MockMail {
        messages: Vec<EmailContent>,
        broken_fetch: HashSet<String>,
        broken_save: bool,
        list_fails: bool,
        fetches: Mutex<Vec<String>>,
        saved: Mutex<Vec<(String, Option<String>, String, String, String)>>,
    }

    impl MockMail {
        fn with(messages: Vec<EmailContent>) -> Self {
            Self {
                messages,
                ..Self::default()
            }
        }
    }

    #[async_trait]
    impl MailClient for MockMail {
        async fn list_unread(
            &self,
            max_count: usize,
        ) -> std::result::Result<Vec<MessageRef>, MailError> {
            if self.list_fails {
                return Err(MailError::ListFailed {
                    reason: "503 backend error".into(),
                });
            }
            Ok(self
                .messages
                .iter()
                .take(max_count)
                .map(|m| MessageRef::new(&m.id, &m.thread_id))
                .collect())
        }

        async fn fetch_body(
            &self,
            reference: &MessageRef,
        ) -> std::result::Result<EmailContent, MailError> {
            self.fetches.lock().unwrap().push(reference.id.clone());
            if self.broken_fetch.contains(&reference.id) {
                return Err(MailError::FetchFailed {
                    id: reference.id.clone(),
                    reason: "message no longer exists".into(),
                });
            }
            self.messages
                .iter()
                .find(|m| m.id == reference.id)
                .cloned()
                .ok_or_else(|| MailError::FetchFailed {
                    id: reference.id.clone(),
                    reason: "unknown id".into(),
                })
        }

        async fn save_draft(
            &self,
            thread_id: &str,
            in_reply_to: Option<&str>,
            to: &str,
            subject: &str,
            body: &str,
        ) -> std::result::Result<DraftId, MailError> {
            if self.broken_save {
                return Err(MailError::DraftSaveFailed {
                    thread_id: thread_id.into(),
                    reason: "quota exceeded".into(),
                });
            }
            let mut saved = self.saved.lock().unwrap();
            saved.push((
                thread_id.into(),
                in_reply_to.map(str::to_string),
                to.into(),
                subject.into(),
                body.into(),
            ));
            Ok(format!("draft-{}", saved.len()))
        }
    }

    // ── Mock LLM ────────────────────────────────────────────────

    /// Answers the summarizer by subject (subjects containing "?" need a
    /// reply) and counts drafting calls.
    #[derive(Default)]
    struct MockLlm {
        summarize_calls: Mutex<usize>,
        draft_calls: Mutex<usize>,
        fail_summaries_for: Option<String>,
        fail_drafts_for: Option<String>,
    }

    #[async_trait]
    impl LlmProvider for MockLlm {
        fn model_name(&self) -> &str {
            "mock"
        }

        fn cost_per_token(&self) -> (Decimal, Decimal) {
            (Decimal::ZERO, Decimal::ZERO)
        }

        async fn complete(
            &self,
            request: CompletionRequest,
        ) -> std::result::Result<CompletionResponse, LlmError> {
            let system = request.system_prompt().unwrap_or_default();
            let user = request
                .messages
                .last()
                .map(|m| m.content.clone())
                .unwrap_or_default();

            let content = if system.contains("drafting email replies") {
                *self.draft_calls.lock().unwrap() += 1;
                if let Some(marker) = &self.fail_drafts_for
                    && user.contains(marker.as_str())
                {
                    return Ok(CompletionResponse {
                        content: "  \n".to_string(),
                        input_tokens: 100,
                        output_tokens: 0,
                        finish_reason: FinishReason::Stop,
                    });
                }
                "Thanks for reaching out. I'll get back to you by [DATE].\n\nAda".to_string()
            } else {
                *self.summarize_calls.lock().unwrap() += 1;
                if let Some(marker) = &self.fail_summaries_for
                    && user.contains(marker.as_str())
                {
                    return Err(LlmError::RequestFailed {
                        provider: "mock".into(),
                        reason: "timeout".into(),
                    });
                }
                let subject_line = user
                    .lines()
                    .find(|l| l.starts_with("SUBJECT:"))
                    .unwrap_or_default();
                if subject_line.contains('?') {
                    "SUMMARY: Asks a question.\nURGENCY: MEDIUM\nREPLY_NEEDED: YES\nREPLY_REASON: Direct question".to_string()
                } else {
                    "SUMMARY: Newsletter.\nURGENCY: LOW\nREPLY_NEEDED: NO\nREPLY_REASON: Automated".to_string()
                }
            };

            Ok(CompletionResponse {
                content,
                input_tokens: 100,
                output_tokens: 20,
                finish_reason: FinishReason::Stop,
            })
        }
    }

    fn email(id: &str, subject: &str) -> EmailContent {
        EmailContent {
            id: id.into(),
            thread_id: format!("thread-{id}"),
            sender: format!("Sender {id} <{id}@example.com>"),
            sender_email: format!("{id}@example.com"),
            subject: subject.into(),
            body_text: "body".into(),
            received_at: String::new(),
            message_id: Some(format!("{id}@mail.example.com")),
        }
    }

    fn config() -> AssistConfig {
        AssistConfig::new("Ada", "ada@example.com")
    }

    fn three_emails() -> Vec<EmailContent> {
        vec![
            email("m1", "Lunch on Friday?"),
            email("m2", "Weekly digest"),
            email("m3", "Can you review the doc?"),
        ]
    }

    // ── Tests ───────────────────────────────────────────────────

    #[tokio::test]
    async fn empty_batch_yields_zero_digest() {
        let mail = Arc::new(MockMail::default());
        let llm = Arc::new(MockLlm::default());
        let orchestrator = Orchestrator::new(mail.clone(), llm.clone());

        let report = orchestrator.run(&config()).await.unwrap();
        assert_eq!(report.digest, Digest::default());
        assert!(report.outcomes.is_empty());
        assert!(mail.fetches.lock().unwrap().is_empty());
        assert!(mail.saved.lock().unwrap().is_empty());
        assert_eq!(*llm.summarize_calls.lock().unwrap(), 0);
    }

    #[tokio::test]
    async fn end_to_end_three_emails() {
        let mail = Arc::new(MockMail::with(three_emails()));
        let llm = Arc::new(MockLlm::default());
        let orchestrator = Orchestrator::new(mail.clone(), llm.clone());

        let report = orchestrator.run(&config()).await.unwrap();
        assert_eq!(
            report.digest,
            Digest {
                total_processed: 3,
                drafts_saved: 2,
                no_reply_needed: 1,
                failed: 0,
            }
        );
        assert_eq!(
            report.digest.drafts_saved + report.digest.no_reply_needed,
            report.digest.total_processed
        );

        let saved = mail.saved.lock().unwrap();
        assert_eq!(saved.len(), 2);
        assert_eq!(saved[0].0, "thread-m1");
        assert_eq!(saved[0].1.as_deref(), Some("m1@mail.example.com"));
        assert_eq!(saved[0].2, "m1@example.com");
        assert_eq!(saved[0].3, "Re: Lunch on Friday?");
        assert!(saved[0].4.contains("[DATE]"));

        let draft = report.outcomes[0].draft().unwrap();
        assert_eq!(draft.draft_id, "draft-1");
        assert_eq!(report.outcomes[1].result, Ok(ReplyOutcome::Skipped));
    }

    #[tokio::test]
    async fn drafter_never_called_when_no_reply_needed() {
        let mail = Arc::new(MockMail::with(vec![
            email("a", "Receipt"),
            email("b", "Newsletter"),
        ]));
        let llm = Arc::new(MockLlm::default());
        let orchestrator = Orchestrator::new(mail.clone(), llm.clone());

        let report = orchestrator.run(&config()).await.unwrap();
        assert_eq!(report.digest.no_reply_needed, 2);
        assert_eq!(*llm.summarize_calls.lock().unwrap(), 2);
        assert_eq!(*llm.draft_calls.lock().unwrap(), 0);
        assert!(mail.saved.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn fetch_failure_does_not_stop_the_batch() {
        let mut mock = MockMail::with(three_emails());
        mock.broken_fetch.insert("m2".into());
        let mail = Arc::new(mock);
        let orchestrator = Orchestrator::new(mail.clone(), Arc::new(MockLlm::default()));

        let report = orchestrator.run(&config()).await.unwrap();
        assert_eq!(report.outcomes.len(), 3);
        assert_eq!(*mail.fetches.lock().unwrap(), vec!["m1", "m2", "m3"]);

        let second = &report.outcomes[1];
        assert!(second.email.is_none());
        assert!(matches!(
            second.result,
            Err(PipelineError::FetchFailed { ref id, ref reason })
                if id == "m2" && reason == "message no longer exists"
        ));
        assert!(report.outcomes[0].is_drafted());
        assert!(report.outcomes[2].is_drafted());
        assert_eq!(report.digest.failed, 1);
        assert_eq!(report.digest.drafts_saved, 2);
    }

    #[tokio::test]
    async fn summarization_failure_keeps_email() {
        let mail = Arc::new(MockMail::with(three_emails()));
        let llm = Arc::new(MockLlm {
            fail_summaries_for: Some("Weekly digest".into()),
            ..MockLlm::default()
        });
        let orchestrator = Orchestrator::new(mail.clone(), llm);

        let report = orchestrator.run(&config()).await.unwrap();
        let second = &report.outcomes[1];
        assert!(second.email.is_some());
        assert!(second.summary.is_none());
        assert_eq!(second.result.as_ref().unwrap_err().stage(), "summarize");
        assert_eq!(report.digest.failed, 1);
        assert_eq!(report.digest.no_reply_needed, 0);
    }

    #[tokio::test]
    async fn save_failure_keeps_summary() {
        let mut mock = MockMail::with(vec![email("q", "Are you free?")]);
        mock.broken_save = true;
        let orchestrator = Orchestrator::new(Arc::new(mock), Arc::new(MockLlm::default()));

        let report = orchestrator.run(&config()).await.unwrap();
        let outcome = &report.outcomes[0];
        assert!(outcome.summary.as_ref().unwrap().reply_needed);
        assert!(matches!(
            outcome.result,
            Err(PipelineError::DraftSaveFailed { ref reason, .. }) if reason == "quota exceeded"
        ));
        assert_eq!(report.digest.drafts_saved, 0);
        assert_eq!(report.digest.failed, 1);
    }

    #[tokio::test]
    async fn draft_failure_does_not_stop_the_batch() {
        let mail = Arc::new(MockMail::with(three_emails()));
        let llm = Arc::new(MockLlm {
            fail_drafts_for: Some("Lunch on Friday?".into()),
            ..MockLlm::default()
        });
        let orchestrator = Orchestrator::new(mail.clone(), llm.clone());

        let report = orchestrator.run(&config()).await.unwrap();
        let first = &report.outcomes[0];
        assert!(first.summary.as_ref().unwrap().reply_needed);
        assert!(matches!(
            first.result,
            Err(PipelineError::DraftGenerationFailed { ref id, .. }) if id == "m1"
        ));
        assert!(report.outcomes[2].is_drafted());
        assert_eq!(*llm.draft_calls.lock().unwrap(), 2);

        let saved = mail.saved.lock().unwrap();
        assert_eq!(saved.len(), 1);
        assert_eq!(saved[0].0, "thread-m3");
        assert_eq!(
            report.digest,
            Digest {
                total_processed: 3,
                drafts_saved: 1,
                no_reply_needed: 1,
                failed: 1,
            }
        );
    }

    #[tokio::test]
    async fn list_failure_aborts_the_run() {
        let mock = MockMail {
            list_fails: true,
            ..MockMail::default()
        };
        let orchestrator = Orchestrator::new(Arc::new(mock), Arc::new(MockLlm::default()));

        let err = orchestrator.run(&config()).await.unwrap_err();
        assert!(matches!(err, Error::Mail(MailError::ListFailed { .. })));
    }

    #[tokio::test]
    async fn invalid_config_aborts_before_listing() {
        let mail = Arc::new(MockMail::with(three_emails()));
        let orchestrator = Orchestrator::new(mail.clone(), Arc::new(MockLlm::default()));

        let err = orchestrator
            .run(&config().with_max_emails(0))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Config(_)));
        assert!(mail.fetches.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn max_emails_caps_the_batch() {
        let mail = Arc::new(MockMail::with(three_emails()));
        let orchestrator = Orchestrator::new(mail.clone(), Arc::new(MockLlm::default()));

        let report = orchestrator
            .run(&config().with_max_emails(2))
            .await
            .unwrap();
        assert_eq!(report.digest.total_processed, 2);
    }

    #[tokio::test]
    async fn metered_run_reports_usage() {
        let mail = Arc::new(MockMail::with(three_emails()));
        let metered = Arc::new(MeteredProvider::new(Arc::new(MockLlm::default())));
        let orchestrator = Orchestrator::metered(mail, metered);

        let report = orchestrator.run(&config()).await.unwrap();
        let usage = report.usage.unwrap();
        // three summaries + two drafts
        assert_eq!(usage.requests, 5);
        assert_eq!(usage.input_tokens, 500);
        assert_eq!(usage.model, "mock");
    }
}
