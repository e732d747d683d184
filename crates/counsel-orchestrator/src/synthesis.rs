//! Final answer synthesis
//!
//! The synthesizer turns a finished blackboard into the student-facing
//! answer. Failure is fatal for the turn: no partial answer is ever
//! fabricated from raw executor output.

use async_trait::async_trait;
use counsel_agent::TextGenerator;
use counsel_core::{Blackboard, CounselError, Result};
use std::fmt::Write as _;
use std::sync::Arc;
use tracing::instrument;

#[async_trait]
pub trait Synthesizer: Send + Sync {
    async fn synthesize(&self, board: &Blackboard) -> Result<String>;
}

/// Synthesizer backed by the coordinator model
pub struct LlmSynthesizer {
    generator: Arc<dyn TextGenerator>,
    history_window: usize,
}

impl LlmSynthesizer {
    pub fn new(generator: Arc<dyn TextGenerator>) -> Self {
        Self {
            generator,
            history_window: 10,
        }
    }

    pub fn with_history_window(mut self, window: usize) -> Self {
        self.history_window = window;
        self
    }
}

#[async_trait]
impl Synthesizer for LlmSynthesizer {
    #[instrument(skip_all, fields(outputs = board.outputs().len(), conflicts = board.conflicts().len()))]
    async fn synthesize(&self, board: &Blackboard) -> Result<String> {
        let prompt = render_synthesis_prompt(board, self.history_window);
        let answer = self
            .generator
            .complete(&prompt)
            .await
            .map_err(|e| match e {
                CounselError::Cancelled => CounselError::Cancelled,
                other => CounselError::Synthesis(other.to_string()),
            })?;

        let answer = answer.trim();
        if answer.is_empty() {
            return Err(CounselError::Synthesis("empty answer".to_string()));
        }
        Ok(answer.to_string())
    }
}

/// Prompt with every finding, failure and conflict of the turn
pub fn render_synthesis_prompt(board: &Blackboard, history_window: usize) -> String {
    let mut prompt = String::from(
        "You are an academic advisor. Combine the specialist findings below into one \
         clear, actionable answer for the student.\n\n",
    );

    let _ = writeln!(prompt, "STUDENT QUESTION:\n\"{}\"\n", board.query());
    if let Some(goal) = board.goal() {
        let _ = writeln!(prompt, "GOAL: {}\n", goal);
    }

    let history = board.history();
    if !history.is_empty() && history_window > 0 {
        prompt.push_str("RECENT CONVERSATION:\n");
        for message in &history[history.len().saturating_sub(history_window)..] {
            let _ = writeln!(prompt, "{}: {}", message.role, message.content);
        }
        prompt.push('\n');
    }

    let used = board.executors_used();
    if used.is_empty() {
        prompt.push_str("No specialist was consulted; answer from general advising knowledge.\n\n");
    } else {
        prompt.push_str("SPECIALIST FINDINGS:\n");
        for id in &used {
            if let Some(output) = board.output(id) {
                let _ = writeln!(
                    prompt,
                    "- {} (confidence {:.2}): {}",
                    id, output.confidence, output.answer
                );
                if !output.cited_policies.is_empty() {
                    let cited: Vec<&str> =
                        output.cited_policies.iter().map(String::as_str).collect();
                    let _ = writeln!(prompt, "  cited: {}", cited.join(", "));
                }
            }
        }
        prompt.push('\n');
    }

    let failed = board.failed_executors();
    if !failed.is_empty() {
        let names: Vec<&str> = failed.iter().map(|id| id.as_str()).collect();
        let _ = writeln!(
            prompt,
            "UNAVAILABLE SPECIALISTS: {}\nTheir input is missing; say so and lower your confidence accordingly.\n",
            names.join(", ")
        );
    }

    if !board.plan_options().is_empty() {
        prompt.push_str("PLAN OPTIONS:\n");
        for (i, option) in board.plan_options().iter().enumerate() {
            let _ = writeln!(prompt, "{}. {}", i + 1, option.summary());
        }
        prompt.push('\n');
    }

    if !board.conflicts().is_empty() {
        prompt.push_str("OUTSTANDING ISSUES (mention each one):\n");
        for conflict in board.conflicts() {
            let _ = writeln!(prompt, "- {}: {}", conflict.conflict_type, conflict.description);
            for option in &conflict.options {
                let _ = writeln!(prompt, "    {}: {}", option.label, option.summary);
            }
        }
        prompt.push('\n');
    }

    prompt.push_str("Respond in plain prose, citing policies where relevant.\n");
    prompt
}
