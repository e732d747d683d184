//! LLM-backed task executor
//!
//! One generic executor covers every advising role: its catalog entry
//! supplies the role description and the blackboard snapshot supplies the
//! query, profile, other executors' findings and any negotiation feedback.

use crate::capability::Capability;
use crate::executor::TaskExecutor;
use crate::extract::extract_json;
use crate::generator::TextGenerator;
use async_trait::async_trait;
use counsel_core::{
    clamp_confidence, Blackboard, Constraint, ConstraintSource, ExecutorFailure, ExecutorId,
    ExecutorOutput, PlanOption, Risk, Severity,
};
use serde::Deserialize;
use std::sync::Arc;
use tracing::instrument;

/// Confidence given to a reply that could not be decoded as JSON
pub const UNSTRUCTURED_CONFIDENCE: f64 = 0.7;

const DEFAULT_CONFIDENCE: f64 = 0.8;

/// Executor that delegates to a text generator
pub struct PromptedExecutor {
    id: ExecutorId,
    capability: &'static Capability,
    generator: Arc<dyn TextGenerator>,
}

impl PromptedExecutor {
    pub fn new(capability: &'static Capability, generator: Arc<dyn TextGenerator>) -> Self {
        Self {
            id: capability.executor_id(),
            capability,
            generator,
        }
    }

    fn build_prompt(&self, snapshot: &Blackboard) -> String {
        let mut prompt = format!(
            "You are the {} in a multi-agent academic advising system.\n\n{}\n",
            self.capability.name,
            self.capability.describe()
        );

        prompt.push_str("\nSTUDENT PROFILE:\n");
        if snapshot.profile().is_empty() {
            prompt.push_str("(no profile information)\n");
        } else {
            let profile = serde_json::to_string_pretty(snapshot.profile()).unwrap_or_default();
            prompt.push_str(&profile);
            prompt.push('\n');
        }

        if let Some(goal) = snapshot.goal() {
            prompt.push_str(&format!("\nCOORDINATOR GOAL: {}\n", goal));
        }
        prompt.push_str(&format!("\nSTUDENT QUERY:\n\"{}\"\n", snapshot.query()));

        let mut findings: Vec<_> = snapshot
            .outputs()
            .values()
            .filter(|o| o.executor_id != self.id)
            .collect();
        findings.sort_by(|a, b| a.executor_id.cmp(&b.executor_id));
        if !findings.is_empty() {
            prompt.push_str("\nFINDINGS FROM OTHER AGENTS:\n");
            for output in findings {
                prompt.push_str(&format!(
                    "- {} (confidence {:.2}): {}\n",
                    output.executor_id, output.confidence, output.answer
                ));
            }
        }

        if !self.capability.proposes_plans && !snapshot.plan_options().is_empty() {
            prompt.push_str("\nPROPOSED PLANS TO REVIEW:\n");
            for (i, option) in snapshot.plan_options().iter().enumerate() {
                prompt.push_str(&format!("{}. {}\n", i + 1, option.summary()));
            }
            prompt.push_str(
                "Flag every policy violation as a hard constraint and every serious risk \
                 with severity \"high\".\n",
            );
        }

        if !snapshot.feedback().is_empty() {
            prompt.push_str(&format!(
                "\nREVISION ROUND {}: your previous proposal was critiqued:\n",
                snapshot.iteration()
            ));
            for item in snapshot.feedback() {
                prompt.push_str(&format!("- {}\n", item));
            }
            prompt.push_str("Revise your plan options to address these objections.\n");
        }

        prompt.push_str(RESPONSE_FORMAT);
        if self.capability.proposes_plans {
            prompt.push_str(PLAN_FORMAT);
        }
        prompt
    }

    fn decode(&self, text: &str) -> ExecutorOutput {
        match extract_json::<ExecutorReply>(text) {
            Ok(reply) => reply.into_output(self.id.clone()),
            Err(e) => {
                tracing::warn!(
                    "Executor {} returned unstructured output, using plain text: {}",
                    self.id,
                    e
                );
                ExecutorOutput::new(self.id.clone(), text.trim(), UNSTRUCTURED_CONFIDENCE)
            }
        }
    }
}

#[async_trait]
impl TaskExecutor for PromptedExecutor {
    fn id(&self) -> &ExecutorId {
        &self.id
    }

    #[instrument(skip(self, snapshot), fields(executor = %self.id, iteration = snapshot.iteration()))]
    async fn execute(&self, snapshot: &Blackboard) -> Result<ExecutorOutput, ExecutorFailure> {
        let prompt = self.build_prompt(snapshot);
        let text = self
            .generator
            .complete(&prompt)
            .await
            .map_err(|e| ExecutorFailure::new(self.id.clone(), e.to_string()))?;
        Ok(self.decode(&text))
    }
}

const RESPONSE_FORMAT: &str = r#"
RESPOND IN JSON FORMAT:
{
    "answer": "Your answer for the student",
    "confidence": 0.0-1.0,
    "relevant_policies": ["Policy or document cited"],
    "risks": [{"type": "overload_risk", "severity": "high|medium|low", "description": "..."}],
    "constraints": [{"type": "policy|student|finance", "description": "...", "hard": true}]
}
"#;

const PLAN_FORMAT: &str = r#"
Also include "plan_options": [{"semesters": [{"term": "Fall 2025", "courses": ["15-112"], "units": 45}], "confidence": 0.0-1.0, "justification": "...", "policy_citations": ["..."]}]
"#;

#[derive(Debug, Deserialize)]
struct ExecutorReply {
    #[serde(default)]
    answer: String,
    #[serde(default)]
    confidence: Option<f64>,
    #[serde(default, alias = "relevant_policies")]
    cited_policies: Vec<String>,
    #[serde(default)]
    risks: Vec<RiskReply>,
    #[serde(default)]
    constraints: Vec<ConstraintReply>,
    #[serde(default)]
    plan_options: Option<Vec<PlanOption>>,
}

#[derive(Debug, Deserialize)]
struct RiskReply {
    #[serde(default, alias = "type")]
    kind: String,
    #[serde(default)]
    severity: String,
    #[serde(default)]
    description: String,
    #[serde(default)]
    citation: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ConstraintReply {
    #[serde(default, alias = "type")]
    source: String,
    #[serde(default)]
    description: String,
    #[serde(default)]
    hard: bool,
    #[serde(default)]
    citation: Option<String>,
}

impl ExecutorReply {
    fn into_output(self, id: ExecutorId) -> ExecutorOutput {
        let mut output = ExecutorOutput::new(
            id.clone(),
            self.answer,
            clamp_confidence(self.confidence.unwrap_or(DEFAULT_CONFIDENCE)),
        );
        output.cited_policies = self.cited_policies.into_iter().collect();

        for risk in self.risks {
            let severity = risk.severity.parse::<Severity>().unwrap_or_else(|e| {
                tracing::warn!("Executor {}: {}, treating as medium", id, e);
                Severity::Medium
            });
            output.risks.push(Risk {
                kind: risk.kind,
                severity,
                description: risk.description,
                citation: risk.citation,
            });
        }

        for constraint in self.constraints {
            let source = constraint.source.parse::<ConstraintSource>().unwrap_or_else(|e| {
                tracing::warn!("Executor {}: {}, treating as policy", id, e);
                ConstraintSource::Policy
            });
            output.constraints.push(Constraint {
                source,
                description: constraint.description,
                hard: constraint.hard,
                citation: constraint.citation,
            });
        }

        output.plan_options = self.plan_options;
        output
    }
}
