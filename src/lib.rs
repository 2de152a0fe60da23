//! Inbox Assist: summarize unread email and leave reply drafts for review.
//!
//! Nothing is ever sent. Every reply ends up as a draft in the user's own
//! mailbox.

pub mod config;
pub mod error;
pub mod llm;
pub mod mail;
pub mod pipeline;
pub mod report;
