//! Email pipeline: summarize, decide, draft, save.

pub mod drafter;
pub mod orchestrator;
pub mod summarizer;
pub mod types;

pub use drafter::ReplyDrafter;
pub use orchestrator::Orchestrator;
pub use summarizer::{Summarizer, parse_summary};
pub use types::{
    Digest, DraftResult, EmailSummary, ProcessingOutcome, ReplyOutcome, RunReport, Urgency,
};
