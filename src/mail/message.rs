//! Message parsing and construction: RFC 822 in, RFC 822 out.
//!
//! Pure functions, no network: parsing a raw message into `EmailContent`,
//! cleaning bodies for the summarizer, and building the raw draft bytes.

use std::sync::LazyLock;

use lettre::Message;
use lettre::message::Mailbox;
use lettre::message::header::ContentType;
use mail_parser::MessageParser;
use regex::Regex;

use crate::mail::EmailContent;

static ANGLE_ADDRESS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<([^<>\s]+@[^<>\s]+)>").expect("valid regex"));

static BLANK_RUNS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\n{3,}").expect("valid regex"));

/// Lines that start a forwarded chain, signature or client footer.
const CUT_MARKERS: &[&str] = &[
    "-----Original Message-----",
    "________________________________",
    "Sent from my iPhone",
    "Sent from my Galaxy",
    "Get Outlook for",
];

/// Strip quoted text from an email body.
///
/// Removes:
/// - Lines starting with `>` (quoted reply lines)
/// - Everything after an "On ... wrote:" attribution line
/// - Everything after an "--- Original Message ---" separator
pub fn strip_quoted_text(body: &str) -> String {
    let mut result = Vec::new();

    for line in body.lines() {
        let trimmed = line.trim();

        if trimmed.starts_with('>') {
            continue;
        }

        // "On Mon, Jan 1, 2026 at 10:00 AM Alice <alice@ex.com> wrote:"
        if trimmed.starts_with("On ") && trimmed.ends_with("wrote:") {
            break;
        }

        if trimmed.starts_with("---") && trimmed.contains("Original Message") {
            break;
        }

        result.push(line);
    }

    while result.last().is_some_and(|l| l.trim().is_empty()) {
        result.pop();
    }

    result.join("\n")
}

/// Reduce a body to the part worth summarizing.
///
/// Normalizes line endings, drops quoted history, cuts at footer markers and
/// collapses runs of blank lines.
pub fn clean_body(body: &str) -> String {
    let normalized = body.replace("\r\n", "\n");
    let mut text = strip_quoted_text(&normalized);

    for marker in CUT_MARKERS {
        if let Some(pos) = find_line_start(&text, marker) {
            text.truncate(pos);
        }
    }

    // A bare "From:" line opens a forwarded header block.
    if let Some(pos) = find_line_start(&text, "From:")
        && pos > 0
    {
        text.truncate(pos);
    }

    BLANK_RUNS.replace_all(&text, "\n\n").trim().to_string()
}

/// Byte offset of the first line that starts with `marker`.
fn find_line_start(text: &str, marker: &str) -> Option<usize> {
    let mut offset = 0;
    for line in text.split_inclusive('\n') {
        if line.trim_start().starts_with(marker) {
            return Some(offset);
        }
        offset += line.len();
    }
    None
}

/// Bare address from a From header like `John Doe <john@example.com>`.
pub fn extract_sender_email(from_header: &str) -> String {
    ANGLE_ADDRESS
        .captures(from_header)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
        .unwrap_or_else(|| from_header.trim().to_string())
}

/// Strip HTML tags from content (basic).
pub fn strip_html(html: &str) -> String {
    let mut result = String::new();
    let mut in_tag = false;
    for ch in html.chars() {
        match ch {
            '<' => in_tag = true,
            '>' => in_tag = false,
            _ if !in_tag => result.push(ch),
            _ => {}
        }
    }
    result.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Parse a raw RFC 822 message into `EmailContent`.
///
/// `snippet` is the provider's preview, used when the body is empty after
/// cleaning. Returns `None` when the bytes are not a parseable message.
pub fn parse_raw_message(
    id: &str,
    thread_id: &str,
    raw: &[u8],
    snippet: &str,
) -> Option<EmailContent> {
    let parsed = MessageParser::default().parse(raw)?;

    let sender = parsed
        .from()
        .and_then(|addr| addr.first())
        .map(|a| match (a.name(), a.address()) {
            (Some(name), Some(address)) => format!("{name} <{address}>"),
            (None, Some(address)) => address.to_string(),
            (Some(name), None) => name.to_string(),
            (None, None) => "Unknown".to_string(),
        })
        .unwrap_or_else(|| "Unknown".to_string());

    let subject = parsed
        .subject()
        .filter(|s| !s.trim().is_empty())
        .unwrap_or("(No Subject)")
        .to_string();

    let received_at = parsed.date().map(|d| d.to_rfc3339()).unwrap_or_default();

    let raw_body = if let Some(text) = parsed.body_text(0) {
        text.to_string()
    } else if let Some(html) = parsed.body_html(0) {
        strip_html(html.as_ref())
    } else {
        String::new()
    };

    let mut body_text = clean_body(&raw_body);
    if body_text.is_empty() {
        body_text = snippet.trim().to_string();
    }

    Some(EmailContent {
        id: id.to_string(),
        thread_id: thread_id.to_string(),
        sender_email: extract_sender_email(&sender),
        sender,
        subject,
        body_text,
        received_at,
        message_id: parsed.message_id().map(str::to_string),
    })
}

/// Build the raw text/plain RFC 822 bytes for a draft.
///
/// With `in_reply_to`, the draft carries `In-Reply-To` and `References` so
/// Gmail files it under the original's thread.
pub fn build_draft_message(
    from: &str,
    to: &str,
    in_reply_to: Option<&str>,
    subject: &str,
    body: &str,
) -> Result<Vec<u8>, String> {
    let from: Mailbox = from
        .parse()
        .map_err(|e| format!("Invalid from address '{from}': {e}"))?;
    let to: Mailbox = to
        .parse()
        .map_err(|e| format!("Invalid to address '{to}': {e}"))?;

    let mut builder = Message::builder().from(from).to(to);
    if let Some(id) = in_reply_to.map(str::trim).filter(|id| !id.is_empty()) {
        let id = format!("<{}>", id.trim_start_matches('<').trim_end_matches('>'));
        builder = builder.in_reply_to(id.clone()).references(id);
    }

    let message = builder
        .subject(subject)
        .header(ContentType::TEXT_PLAIN)
        .body(body.to_string())
        .map_err(|e| format!("Failed to build draft: {e}"))?;

    Ok(message.formatted())
}

#[cfg(test)]
mod tests {
    use super::*;

    // ── strip_quoted_text tests ─────────────────────────────────

    #[test]
    fn strip_basic_quoted_lines() {
        let body = "Hello!\n\n> This is quoted\n> Another quoted line\nThanks";
        assert_eq!(strip_quoted_text(body), "Hello!\n\nThanks");
    }

    #[test]
    fn strip_on_wrote_attribution() {
        let body = "Sounds good!\n\nOn Mon, Jan 1, 2026 at 10:00 AM Alice <alice@ex.com> wrote:\n> Original message";
        assert_eq!(strip_quoted_text(body), "Sounds good!");
    }

    #[test]
    fn strip_original_message_separator() {
        let body = "My reply\n\n--- Original Message ---\nOld stuff here";
        assert_eq!(strip_quoted_text(body), "My reply");
    }

    #[test]
    fn strip_no_quotes() {
        let body = "Just a normal message\nWith multiple lines";
        assert_eq!(strip_quoted_text(body), body);
    }

    // ── clean_body tests ────────────────────────────────────────

    #[test]
    fn clean_collapses_blank_runs() {
        let body = "First\n\n\n\n\nSecond";
        assert_eq!(clean_body(body), "First\n\nSecond");
    }

    #[test]
    fn clean_cuts_mobile_footer() {
        let body = "Can you send the deck?\n\nSent from my iPhone";
        assert_eq!(clean_body(body), "Can you send the deck?");
    }

    #[test]
    fn clean_cuts_outlook_chain() {
        let body = "Approved.\r\n\r\n-----Original Message-----\r\nFrom: Bob\r\nPlease approve";
        assert_eq!(clean_body(body), "Approved.");
    }

    #[test]
    fn clean_cuts_forwarded_header_block() {
        let body = "FYI below.\n\nFrom: Carol <carol@ex.com>\nSent: Monday\nOld content";
        assert_eq!(clean_body(body), "FYI below.");
    }

    #[test]
    fn clean_keeps_leading_from_line() {
        let body = "From: the desk of the CEO\nAll hands at 3pm.";
        assert_eq!(clean_body(body), body);
    }

    // ── address tests ───────────────────────────────────────────

    #[test]
    fn sender_email_from_angle_brackets() {
        assert_eq!(
            extract_sender_email("John Doe <john@example.com>"),
            "john@example.com"
        );
        assert_eq!(
            extract_sender_email("\"Doe, John\" <john.doe@example.co.uk>"),
            "john.doe@example.co.uk"
        );
    }

    #[test]
    fn sender_email_bare_address() {
        assert_eq!(extract_sender_email("  jane@example.com "), "jane@example.com");
    }

    #[test]
    fn strip_html_removes_tags() {
        assert_eq!(strip_html("<p>Hello <b>there</b></p>"), "Hello there");
    }

    // ── parse_raw_message tests ─────────────────────────────────

    #[test]
    fn parse_plain_message() {
        let raw = b"From: Alice Example <alice@example.com>\r\n\
To: me@example.com\r\n\
Subject: Meeting on Thursday\r\n\
Date: Mon, 13 Oct 2025 09:30:00 +0000\r\n\
Content-Type: text/plain; charset=utf-8\r\n\
\r\n\
Can we meet Thursday at 2pm?\r\n\
\r\n\
> earlier quoted text\r\n";

        let email = parse_raw_message("m1", "t1", raw, "snippet").unwrap();
        assert_eq!(email.id, "m1");
        assert_eq!(email.thread_id, "t1");
        assert_eq!(email.sender, "Alice Example <alice@example.com>");
        assert_eq!(email.sender_email, "alice@example.com");
        assert_eq!(email.subject, "Meeting on Thursday");
        assert_eq!(email.body_text, "Can we meet Thursday at 2pm?");
        assert!(email.received_at.starts_with("2025-10-13"));
    }

    #[test]
    fn parse_missing_subject_and_empty_body_uses_defaults() {
        let raw = b"From: bob@example.com\r\n\
Content-Type: text/plain\r\n\
\r\n\
\r\n";
        let email = parse_raw_message("m2", "t2", raw, "preview text").unwrap();
        assert_eq!(email.subject, "(No Subject)");
        assert_eq!(email.sender, "bob@example.com");
        assert_eq!(email.body_text, "preview text");
    }

    // ── build_draft_message tests ───────────────────────────────

    #[test]
    fn draft_message_has_headers_and_body() {
        let raw = build_draft_message(
            "Ada Lovelace <ada@example.com>",
            "alice@example.com",
            None,
            "Re: Meeting on Thursday",
            "Thursday works.\n\nAda",
        )
        .unwrap();
        let text = String::from_utf8(raw).unwrap();
        assert!(text.contains("To: alice@example.com"));
        assert!(text.contains("Subject: Re: Meeting on Thursday"));
        assert!(text.contains("Content-Type: text/plain"));
        assert!(text.contains("Thursday works."));
        assert!(!text.contains("In-Reply-To"));
    }

    #[test]
    fn draft_message_references_original() {
        let raw = build_draft_message(
            "ada@example.com",
            "alice@example.com",
            Some("CAF=abc123@mail.example.com"),
            "Re: Budget",
            "Approved.",
        )
        .unwrap();
        let text = String::from_utf8(raw).unwrap();
        assert!(text.contains("In-Reply-To: <CAF=abc123@mail.example.com>"));
        assert!(text.contains("References: <CAF=abc123@mail.example.com>"));
    }

    #[test]
    fn parse_keeps_message_id() {
        let raw = "From: Alice <alice@example.com>\r\n\
Message-ID: <CAF=abc123@mail.example.com>\r\n\
Subject: Budget\r\n\r\nPlease approve.\r\n";
        let email = parse_raw_message("m1", "t1", raw.as_bytes(), "").unwrap();
        assert_eq!(email.message_id.as_deref(), Some("CAF=abc123@mail.example.com"));
    }

    #[test]
    fn draft_message_rejects_bad_recipient() {
        let err = build_draft_message("ada@example.com", "not an address", None, "Re: x", "body")
            .unwrap_err();
        assert!(err.contains("Invalid to address"));
    }
}
