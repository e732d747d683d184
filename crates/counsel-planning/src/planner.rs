//! Workflow planners
//!
//! [`LlmPlanner`] asks the coordinator model for a plan. A generator error
//! is a planner failure (fatal for the turn); an unreadable reply is not, it
//! degrades to [`WorkflowPlan::fallback`].

use crate::plan::{PlanRationale, WorkflowPlan};
use crate::prompt::render_planner_prompt;
use async_trait::async_trait;
use counsel_agent::{extract_json, TextGenerator};
use counsel_core::{
    ClarificationQuestion, CounselError, ExecutorId, HistoryMessage, Profile, Result,
};
use serde::Deserialize;
use std::sync::Arc;
use tracing::instrument;

/// Decides the goal and executor order for a turn
#[async_trait]
pub trait WorkflowPlanner: Send + Sync {
    /// Plan a turn
    ///
    /// The orchestrator sanitizes the returned plan against its registry, so
    /// unknown or repeated ids are dropped rather than executed.
    async fn plan(
        &self,
        query: &str,
        profile: &Profile,
        history: &[HistoryMessage],
    ) -> Result<WorkflowPlan>;
}

/// Planner backed by a text generator
pub struct LlmPlanner {
    generator: Arc<dyn TextGenerator>,
    executors: Vec<ExecutorId>,
    history_window: usize,
}

impl LlmPlanner {
    /// `executors` are the registry ids the planner may name
    pub fn new(generator: Arc<dyn TextGenerator>, executors: Vec<ExecutorId>) -> Self {
        Self {
            generator,
            executors,
            history_window: 10,
        }
    }

    pub fn with_history_window(mut self, window: usize) -> Self {
        self.history_window = window;
        self
    }

    fn is_known(&self, id: &ExecutorId) -> bool {
        self.executors.contains(id)
    }

    fn interpret(&self, text: &str, profile: &Profile) -> WorkflowPlan {
        let reply = match extract_json::<PlannerReply>(text) {
            Ok(reply) => reply,
            Err(e) => {
                tracing::warn!("Planner reply unusable, using fallback plan: {}", e);
                return WorkflowPlan::fallback(|id| self.is_known(id));
            }
        };

        let workflow = reply.workflow_plan;
        let goal = Some(workflow.goal.trim().to_string()).filter(|g| !g.is_empty());

        let clarification = if reply.needs_clarification {
            reply
                .clarification_questions
                .into_iter()
                .map(QuestionReply::into_question)
                .filter(|q| !q.question.trim().is_empty())
                .collect()
        } else {
            Vec::new()
        };

        let rationale = PlanRationale {
            student_goal: reply.understanding.student_goal,
            underlying_concern: reply.understanding.underlying_concern,
            reasoning: workflow.reasoning,
            expected_challenges: workflow.expected_challenges,
            success_criteria: workflow.success_criteria,
            confidence: reply.confidence,
        };

        WorkflowPlan {
            goal,
            order: workflow.execution_order,
            stages: workflow.parallel_stages,
            clarification,
            rationale: Some(rationale),
        }
        .sanitize(|id| self.is_known(id))
        .suppress_answered(profile)
    }
}

#[async_trait]
impl WorkflowPlanner for LlmPlanner {
    #[instrument(skip_all, fields(history = history.len()))]
    async fn plan(
        &self,
        query: &str,
        profile: &Profile,
        history: &[HistoryMessage],
    ) -> Result<WorkflowPlan> {
        let prompt = render_planner_prompt(
            query,
            profile,
            history,
            self.history_window,
            &self.executors,
        );

        let text = self
            .generator
            .complete(&prompt)
            .await
            .map_err(|e| match e {
                CounselError::Cancelled => CounselError::Cancelled,
                other => CounselError::Planner(other.to_string()),
            })?;

        let plan = self.interpret(&text, profile);
        tracing::info!(
            "Planned goal {:?} with executors [{}]{}",
            plan.goal,
            plan.order
                .iter()
                .map(|id| id.as_str())
                .collect::<Vec<_>>()
                .join(", "),
            if plan.needs_clarification() {
                " (clarification requested)"
            } else {
                ""
            }
        );
        Ok(plan)
    }
}

#[derive(Debug, Default, Deserialize)]
struct PlannerReply {
    #[serde(default)]
    understanding: UnderstandingReply,
    #[serde(default)]
    workflow_plan: WorkflowReply,
    #[serde(default)]
    confidence: Option<f64>,
    #[serde(default)]
    needs_clarification: bool,
    #[serde(default)]
    clarification_questions: Vec<QuestionReply>,
}

#[derive(Debug, Default, Deserialize)]
struct UnderstandingReply {
    #[serde(default)]
    student_goal: String,
    #[serde(default)]
    underlying_concern: String,
}

#[derive(Debug, Default, Deserialize)]
struct WorkflowReply {
    #[serde(default)]
    goal: String,
    #[serde(default)]
    reasoning: String,
    #[serde(default)]
    execution_order: Vec<ExecutorId>,
    #[serde(default)]
    parallel_stages: Vec<Vec<ExecutorId>>,
    #[serde(default)]
    expected_challenges: Vec<String>,
    #[serde(default)]
    success_criteria: String,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum QuestionReply {
    Plain(String),
    Structured(ClarificationQuestion),
}

impl QuestionReply {
    fn into_question(self) -> ClarificationQuestion {
        match self {
            Self::Plain(text) => ClarificationQuestion::new(text),
            Self::Structured(question) => question,
        }
    }
}
