//! Activity log for one turn
//!
//! Every `LogActivity` action emitted by the workflow and negotiation state
//! machines is written through `tracing::info!` and kept here, so the turn
//! trace shows how the turn moved through its steps. [`ActivityLog::to_markdown`]
//! renders the human-readable form printed by `counsel history`.

use chrono::{DateTime, Utc};
use counsel_core::WorkflowStep;
use serde::{Deserialize, Serialize};
use std::fmt::Write as _;
use tracing::info;

/// Maximum characters of a message shown in the markdown preview
const ACTIVITY_PREVIEW_CHARS: usize = 500;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivityEntry {
    pub at: DateTime<Utc>,
    /// Step the turn was in after the transition that logged this
    pub step: WorkflowStep,
    pub message: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivityLog {
    entries: Vec<ActivityEntry>,
}

impl ActivityLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, step: WorkflowStep, message: impl Into<String>) {
        let message = message.into();
        info!(step = %step, "{}", message);
        self.entries.push(ActivityEntry {
            at: Utc::now(),
            step,
            message,
        });
    }

    pub fn entries(&self) -> &[ActivityEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn to_markdown(&self) -> String {
        let mut out = String::new();
        for entry in &self.entries {
            let message: String = entry.message.chars().take(ACTIVITY_PREVIEW_CHARS).collect();
            let ellipsis = if entry.message.chars().count() > ACTIVITY_PREVIEW_CHARS {
                "..."
            } else {
                ""
            };
            let _ = writeln!(
                out,
                "- `{}` **{}** {}{}",
                entry.at.format("%H:%M:%S"),
                entry.step,
                message,
                ellipsis
            );
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_keeps_order_and_step() {
        let mut log = ActivityLog::new();
        log.record(WorkflowStep::Planning, "Planning turn");
        log.record(WorkflowStep::Executing, "Executing 2 planned executors");

        assert_eq!(log.len(), 2);
        assert_eq!(log.entries()[1].step, WorkflowStep::Executing);

        let markdown = log.to_markdown();
        assert!(markdown.contains("**planning** Planning turn"));
        assert!(markdown.contains("**executing** Executing 2"));
    }

    #[test]
    fn test_markdown_truncates_long_messages() {
        let mut log = ActivityLog::new();
        log.record(WorkflowStep::Failed, "x".repeat(ACTIVITY_PREVIEW_CHARS + 10));
        let markdown = log.to_markdown();
        assert!(markdown.trim_end().ends_with("..."));
    }
}
