//! The planner's output contract

use counsel_core::{ClarificationQuestion, ExecutorId, Profile};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Goal used when the planner's reply cannot be understood
pub const FALLBACK_GOAL: &str = "Answer the student's query";

/// Observability side-channel attached to a plan
///
/// Never consulted by control flow.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PlanRationale {
    #[serde(default)]
    pub student_goal: String,
    #[serde(default)]
    pub underlying_concern: String,
    #[serde(default)]
    pub reasoning: String,
    #[serde(default)]
    pub expected_challenges: Vec<String>,
    #[serde(default)]
    pub success_criteria: String,
    #[serde(default)]
    pub confidence: Option<f64>,
}

/// Goal, executor order and optional clarification request for one turn
///
/// After [`WorkflowPlan::sanitize`]: `order` is duplicate-free and holds only
/// known ids, and `stages` partitions `order` into consecutive groups that
/// may run concurrently.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WorkflowPlan {
    pub goal: Option<String>,
    pub order: Vec<ExecutorId>,
    #[serde(default)]
    pub stages: Vec<Vec<ExecutorId>>,
    #[serde(default)]
    pub clarification: Vec<ClarificationQuestion>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rationale: Option<PlanRationale>,
}

impl WorkflowPlan {
    /// One executor per stage, in the given order
    pub fn sequential(goal: impl Into<String>, order: Vec<ExecutorId>) -> Self {
        let stages = order.iter().map(|id| vec![id.clone()]).collect();
        Self {
            goal: Some(goal.into()),
            order,
            stages,
            ..Default::default()
        }
    }

    /// Answer directly, without any executor
    pub fn direct(goal: impl Into<String>) -> Self {
        Self::sequential(goal, Vec::new())
    }

    /// Safe default used when the planner reply is unusable
    pub fn fallback(known: impl Fn(&ExecutorId) -> bool) -> Self {
        let requirements = ExecutorId::from(counsel_agent::capability::PROGRAMS_REQUIREMENTS);
        let order = if known(&requirements) {
            vec![requirements]
        } else {
            Vec::new()
        };
        Self::sequential(FALLBACK_GOAL, order)
    }

    pub fn with_clarification(mut self, questions: Vec<ClarificationQuestion>) -> Self {
        self.clarification = questions;
        self
    }

    pub fn needs_clarification(&self) -> bool {
        !self.clarification.is_empty()
    }

    /// Enforce the order contract and rebuild `stages`
    ///
    /// Unknown ids are dropped with a warning and repeats keep their first
    /// position. The current `stages` are read as a parallelism hint: only
    /// runs of consecutive ids that share a hinted group are merged, so
    /// the planned order is never reshuffled.
    pub fn sanitize(mut self, known: impl Fn(&ExecutorId) -> bool) -> Self {
        let mut seen = HashSet::new();
        let order: Vec<ExecutorId> = self
            .order
            .into_iter()
            .filter(|id| {
                if !known(id) {
                    tracing::warn!("Planner named unknown executor '{}', dropping it", id);
                    return false;
                }
                if !seen.insert(id.clone()) {
                    tracing::debug!("Planner repeated executor '{}', keeping first", id);
                    return false;
                }
                true
            })
            .collect();

        let group_of = |id: &ExecutorId| self.stages.iter().position(|g| g.contains(id));

        let mut stages: Vec<Vec<ExecutorId>> = Vec::new();
        let mut current_group = None;
        for id in &order {
            let group = group_of(id);
            match stages.last_mut() {
                Some(stage) if group.is_some() && group == current_group => {
                    stage.push(id.clone())
                }
                _ => stages.push(vec![id.clone()]),
            }
            current_group = group;
        }

        self.order = order;
        self.stages = stages;
        self
    }

    /// Drop questions whose topic the profile already answers
    pub fn suppress_answered(mut self, profile: &Profile) -> Self {
        self.clarification.retain(|q| match &q.topic {
            Some(topic) if profile_has(profile, topic) => {
                tracing::debug!("Skipping clarification on '{}': already in profile", topic);
                false
            }
            _ => true,
        });
        self
    }
}

fn profile_has(profile: &Profile, key: &str) -> bool {
    match profile.get(key) {
        None | Some(serde_json::Value::Null) => false,
        Some(serde_json::Value::String(s)) => !s.trim().is_empty(),
        Some(serde_json::Value::Array(a)) => !a.is_empty(),
        Some(_) => true,
    }
}
