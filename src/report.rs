//! Console presentation of a run: per-email transcript, digest block and
//! the JSON run report.

use std::fmt::Write;

use crate::pipeline::{Digest, ProcessingOutcome, ReplyOutcome, RunReport};

const RULE_WIDTH: usize = 55;

fn rule(ch: char) -> String {
    std::iter::repeat_n(ch, RULE_WIDTH).collect()
}

/// Banner printed before the first email.
pub fn render_run_header(total: usize) -> String {
    match total {
        0 => "No emails to process.".to_string(),
        1 => "Processing 1 email.".to_string(),
        n => format!("Processing {n} emails."),
    }
}

/// Transcript block for one email.
pub fn render_outcome(index: usize, total: usize, outcome: &ProcessingOutcome) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "{}", rule('-'));
    let _ = writeln!(out, "Email {index}/{total}");

    match &outcome.email {
        Some(email) => {
            let _ = writeln!(out, "  From    : {}", email.sender);
            let _ = writeln!(out, "  Subject : {}", email.subject);
        }
        None => {
            let _ = writeln!(out, "  Message : {}", outcome.reference.id);
        }
    }

    if let Some(summary) = &outcome.summary {
        let _ = writeln!(out, "  Summary : {}", summary.summary_text);
        if !summary.sender_intent.is_empty() {
            let _ = writeln!(out, "  Intent  : {}", summary.sender_intent);
        }
        for point in &summary.key_points {
            let _ = writeln!(out, "    - {point}");
        }
        let _ = writeln!(
            out,
            "  Urgency : {}   Action required: {}   Reply needed: {}",
            summary.urgency,
            yes_no(summary.action_required),
            yes_no(summary.reply_needed)
        );
        if summary.reply_needed && !summary.reply_reason.is_empty() {
            let _ = writeln!(out, "  Reason  : {}", summary.reply_reason);
        }
    }

    match &outcome.result {
        Ok(ReplyOutcome::Drafted(draft)) => {
            let _ = writeln!(out, "  Draft saved ({}) to {}", draft.draft_id, draft.to);
            let _ = writeln!(out, "  Subject : {}", draft.subject);
            for line in draft.body.lines() {
                let _ = writeln!(out, "    | {line}");
            }
            let _ = write!(out, "  Not sent. Review and send it from your drafts.");
        }
        Ok(ReplyOutcome::Skipped) => {
            let _ = write!(out, "  No reply needed.");
        }
        Err(e) => {
            let _ = write!(out, "  FAILED at {}: {e}", e.stage());
        }
    }
    out
}

/// The end-of-run digest block, with a one-line breakdown per email.
pub fn render_digest(report: &RunReport) -> String {
    let Digest {
        total_processed,
        drafts_saved,
        no_reply_needed,
        failed,
    } = report.digest;

    let mut out = String::new();
    let _ = writeln!(out, "{}", rule('='));
    let _ = writeln!(out, "DIGEST");
    let _ = writeln!(out, "{}", rule('='));
    let _ = writeln!(out, "  Emails processed : {total_processed}");
    let _ = writeln!(out, "  Drafts saved     : {drafts_saved}");
    let _ = writeln!(out, "  No reply needed  : {no_reply_needed}");
    if failed > 0 {
        let _ = writeln!(out, "  Failed           : {failed}");
    }

    if !report.outcomes.is_empty() {
        let _ = writeln!(out);
        for (i, outcome) in report.outcomes.iter().enumerate() {
            let status = match &outcome.result {
                Ok(ReplyOutcome::Drafted(_)) => "draft saved".to_string(),
                Ok(ReplyOutcome::Skipped) => "no reply needed".to_string(),
                Err(e) => format!("failed ({})", e.stage()),
            };
            let subject = outcome
                .email
                .as_ref()
                .map(|e| e.subject.as_str())
                .unwrap_or(outcome.reference.id.as_str());
            let _ = writeln!(out, "  [{}] {status}: {subject}", i + 1);
        }
    }

    if let Some(usage) = &report.usage {
        let _ = writeln!(out);
        let _ = writeln!(
            out,
            "  Model {}: {} requests, {} in / {} out tokens, ~${} USD",
            usage.model,
            usage.requests,
            usage.input_tokens,
            usage.output_tokens,
            usage.estimated_cost_usd.round_dp(4)
        );
    }

    let _ = write!(out, "{}", rule('='));
    out
}

/// Pretty JSON form of the run report.
pub fn render_json(report: &RunReport) -> Result<String, serde_json::Error> {
    serde_json::to_string_pretty(report)
}

fn yes_no(flag: bool) -> &'static str {
    if flag { "YES" } else { "NO" }
}
