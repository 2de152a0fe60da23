//! Shared types for the email pipeline.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Serialize, Serializer};
use uuid::Uuid;

use crate::error::PipelineError;
use crate::llm::UsageReport;
use crate::mail::{DraftId, EmailContent, MessageRef};

// ── Summary ─────────────────────────────────────────────────────────

/// How soon the sender needs attention.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Urgency {
    #[default]
    Low,
    Medium,
    High,
}

impl FromStr for Urgency {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let word = s
            .split_whitespace()
            .map(|w| w.trim_matches(|c: char| !c.is_alphanumeric()))
            .find(|w| !w.is_empty())
            .unwrap_or_default()
            .to_lowercase();
        match word.as_str() {
            "low" => Ok(Self::Low),
            "medium" | "med" | "moderate" => Ok(Self::Medium),
            "high" | "urgent" | "critical" => Ok(Self::High),
            other => Err(format!("unknown urgency '{other}'")),
        }
    }
}

impl fmt::Display for Urgency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Low => "LOW",
            Self::Medium => "MEDIUM",
            Self::High => "HIGH",
        };
        f.write_str(s)
    }
}

/// Structured analysis of one email.
///
/// `reply_reason` is only meaningful when `reply_needed` is true; the
/// summarizer clears it otherwise.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct EmailSummary {
    pub summary_text: String,
    pub action_required: bool,
    pub urgency: Urgency,
    pub reply_needed: bool,
    pub reply_reason: String,
    /// What the sender wants, in one line.
    pub sender_intent: String,
    pub key_points: Vec<String>,
}

// ── Reply outcome ───────────────────────────────────────────────────

/// A reply that was drafted and saved. Never sent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DraftResult {
    pub draft_id: DraftId,
    pub to: String,
    pub subject: String,
    pub body: String,
}

/// What happened on the reply side of one email.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ReplyOutcome {
    /// Reply needed; draft saved.
    Drafted(DraftResult),
    /// Summary said no reply is needed.
    Skipped,
}

impl ReplyOutcome {
    /// Short label for logging.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Drafted(_) => "drafted",
            Self::Skipped => "skipped",
        }
    }
}

// ── Per-email outcome ───────────────────────────────────────────────

/// Everything known about one email after the pipeline ran on it.
///
/// On failure `email` and `summary` hold whatever was obtained before the
/// failing stage.
#[derive(Debug, Clone, Serialize)]
pub struct ProcessingOutcome {
    pub reference: MessageRef,
    pub email: Option<EmailContent>,
    pub summary: Option<EmailSummary>,
    #[serde(serialize_with = "serialize_result")]
    pub result: Result<ReplyOutcome, PipelineError>,
}

impl ProcessingOutcome {
    pub fn is_drafted(&self) -> bool {
        matches!(self.result, Ok(ReplyOutcome::Drafted(_)))
    }

    pub fn is_failed(&self) -> bool {
        self.result.is_err()
    }

    /// Summary present and it said no reply is needed.
    pub fn is_no_reply_needed(&self) -> bool {
        self.summary.as_ref().is_some_and(|s| !s.reply_needed)
    }

    pub fn draft(&self) -> Option<&DraftResult> {
        match &self.result {
            Ok(ReplyOutcome::Drafted(draft)) => Some(draft),
            _ => None,
        }
    }
}

fn serialize_result<S: Serializer>(
    result: &Result<ReplyOutcome, PipelineError>,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    #[derive(Serialize)]
    #[serde(tag = "status", rename_all = "snake_case")]
    enum Wire<'a> {
        Drafted(&'a DraftResult),
        Skipped,
        Failed { stage: &'static str, error: String },
    }

    let wire = match result {
        Ok(ReplyOutcome::Drafted(draft)) => Wire::Drafted(draft),
        Ok(ReplyOutcome::Skipped) => Wire::Skipped,
        Err(e) => Wire::Failed {
            stage: e.stage(),
            error: e.to_string(),
        },
    };
    wire.serialize(serializer)
}

// ── Digest ──────────────────────────────────────────────────────────

/// End-of-run counts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Digest {
    pub total_processed: usize,
    pub drafts_saved: usize,
    pub no_reply_needed: usize,
    pub failed: usize,
}

impl Digest {
    /// Fold a batch of outcomes into counts.
    pub fn from_outcomes(outcomes: &[ProcessingOutcome]) -> Self {
        outcomes.iter().fold(Self::default(), |mut digest, outcome| {
            digest.total_processed += 1;
            if outcome.is_drafted() {
                digest.drafts_saved += 1;
            }
            if outcome.is_no_reply_needed() {
                digest.no_reply_needed += 1;
            }
            if outcome.is_failed() {
                digest.failed += 1;
            }
            digest
        })
    }
}

/// Serializable summary of one run.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub digest: Digest,
    pub outcomes: Vec<ProcessingOutcome>,
    /// Present when the model provider was metered.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub usage: Option<UsageReport>,
}
