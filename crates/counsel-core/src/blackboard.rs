//! The shared state record for one user turn
//!
//! The blackboard is append-mostly: constraints and risks only grow, plan
//! options and conflicts are replaced wholesale, and an executor's output is
//! overwritten only when negotiation re-invokes it. Executors and the
//! conflict detector receive `&Blackboard`; every mutation below is reserved
//! for the orchestrator that owns the turn.

use crate::error::{CounselError, ExecutorFailure, Result};
use crate::types::{
    ClarificationAnswer, Conflict, Constraint, ExecutorId, ExecutorOutput, HistoryMessage,
    PlanOption, Risk, WorkflowStep,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Free-form requester context (major, completed courses, GPA, ...)
pub type Profile = serde_json::Map<String, serde_json::Value>;

/// A failed executor invocation as recorded on the blackboard
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailureRecord {
    pub executor_id: ExecutorId,
    pub cause: String,
    pub timed_out: bool,
}

impl From<&ExecutorFailure> for FailureRecord {
    fn from(failure: &ExecutorFailure) -> Self {
        Self {
            executor_id: failure.executor_id.clone(),
            cause: failure.cause.to_string(),
            timed_out: failure.is_timeout(),
        }
    }
}

/// Shared state for a single turn
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Blackboard {
    query: String,
    goal: Option<String>,
    profile: Profile,
    history: Vec<HistoryMessage>,
    outputs: HashMap<ExecutorId, ExecutorOutput>,
    failures: Vec<FailureRecord>,
    constraints: Vec<Constraint>,
    risks: Vec<Risk>,
    plan_options: Vec<PlanOption>,
    #[serde(deserialize_with = "crate::types::deserialize_conflicts")]
    conflicts: Vec<Conflict>,
    open_questions: Vec<String>,
    active_executors: Vec<ExecutorId>,
    step: WorkflowStep,
    iteration: u32,
    feedback: Vec<String>,
}

impl Blackboard {
    pub fn new(query: impl Into<String>, profile: Profile, history: Vec<HistoryMessage>) -> Self {
        Self {
            query: query.into(),
            profile,
            history,
            ..Default::default()
        }
    }

    pub fn query(&self) -> &str {
        &self.query
    }

    pub fn goal(&self) -> Option<&str> {
        self.goal.as_deref()
    }

    pub fn profile(&self) -> &Profile {
        &self.profile
    }

    pub fn history(&self) -> &[HistoryMessage] {
        &self.history
    }

    pub fn outputs(&self) -> &HashMap<ExecutorId, ExecutorOutput> {
        &self.outputs
    }

    pub fn output(&self, id: &ExecutorId) -> Option<&ExecutorOutput> {
        self.outputs.get(id)
    }

    pub fn failures(&self) -> &[FailureRecord] {
        &self.failures
    }

    pub fn constraints(&self) -> &[Constraint] {
        &self.constraints
    }

    pub fn risks(&self) -> &[Risk] {
        &self.risks
    }

    pub fn plan_options(&self) -> &[PlanOption] {
        &self.plan_options
    }

    pub fn conflicts(&self) -> &[Conflict] {
        &self.conflicts
    }

    pub fn open_questions(&self) -> &[String] {
        &self.open_questions
    }

    pub fn active_executors(&self) -> &[ExecutorId] {
        &self.active_executors
    }

    pub fn step(&self) -> WorkflowStep {
        self.step
    }

    pub fn iteration(&self) -> u32 {
        self.iteration
    }

    /// Critique handed to the proposer on a negotiation retry
    pub fn feedback(&self) -> &[String] {
        &self.feedback
    }

    /// Whether `id` failed at least once this turn
    pub fn has_failed(&self, id: &ExecutorId) -> bool {
        self.failures.iter().any(|f| &f.executor_id == id)
    }

    /// Planned executors that have neither produced output nor failed
    pub fn pending_executors(&self) -> Vec<ExecutorId> {
        self.active_executors
            .iter()
            .filter(|id| !self.outputs.contains_key(id) && !self.has_failed(id))
            .cloned()
            .collect()
    }

    /// Every planned executor has either an output or a failure record
    pub fn all_accounted_for(&self) -> bool {
        self.pending_executors().is_empty()
    }

    /// Planned executors with output, in planned order
    pub fn executors_used(&self) -> Vec<ExecutorId> {
        self.active_executors
            .iter()
            .filter(|id| self.outputs.contains_key(id))
            .cloned()
            .collect()
    }

    /// Executors whose latest invocation failed, in planned order
    pub fn failed_executors(&self) -> Vec<ExecutorId> {
        let mut failed: Vec<ExecutorId> = Vec::new();
        for record in &self.failures {
            if !self.outputs.contains_key(&record.executor_id)
                && !failed.contains(&record.executor_id)
            {
                failed.push(record.executor_id.clone());
            }
        }
        failed
    }

    // ------------------------------------------------------------------
    // Orchestrator-only mutation
    // ------------------------------------------------------------------

    /// Store the planner's goal and executor order
    ///
    /// The plan is fixed once any executor has run.
    pub fn set_plan(&mut self, goal: Option<String>, order: Vec<ExecutorId>) -> Result<()> {
        if !self.outputs.is_empty() || !self.failures.is_empty() {
            return Err(CounselError::ProtocolViolation(
                "execution order cannot change after executors have run".to_string(),
            ));
        }
        self.goal = goal;
        self.active_executors = order;
        Ok(())
    }

    /// Store an executor result and accumulate its constraints and risks
    ///
    /// Returns the output it replaced, if the executor had run before.
    pub fn record_output(&mut self, output: ExecutorOutput) -> Option<ExecutorOutput> {
        self.constraints.extend(output.constraints.iter().cloned());
        self.risks.extend(output.risks.iter().cloned());
        self.outputs.insert(output.executor_id.clone(), output)
    }

    /// Replace the candidate plans with the proposer's latest set
    pub fn replace_plan_options(&mut self, options: Vec<PlanOption>) {
        self.plan_options = options;
    }

    pub fn record_failure(&mut self, failure: &ExecutorFailure) {
        self.failures.push(FailureRecord::from(failure));
    }

    pub fn replace_conflicts(&mut self, conflicts: Vec<Conflict>) {
        self.conflicts = conflicts;
    }

    pub fn push_open_question(&mut self, question: impl Into<String>) {
        self.open_questions.push(question.into());
    }

    pub fn set_feedback(&mut self, feedback: Vec<String>) {
        self.feedback = feedback;
    }

    pub fn set_step(&mut self, step: WorkflowStep) {
        self.step = step;
    }

    pub fn set_iteration(&mut self, iteration: u32) {
        self.iteration = iteration;
    }

    /// Fold clarification answers into the turn context
    ///
    /// Each exchange is appended to the history; answers to questions with a
    /// topic also fill that profile key.
    pub fn apply_clarification(&mut self, answers: &[ClarificationAnswer]) {
        for answer in answers {
            self.history
                .push(HistoryMessage::assistant(answer.question.question.clone()));
            self.history.push(HistoryMessage::user(answer.answer.clone()));
            if let Some(topic) = &answer.question.topic {
                self.profile.insert(
                    topic.clone(),
                    serde_json::Value::String(answer.answer.clone()),
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ClarificationQuestion, ConstraintSource, SemesterPlan, Severity};

    fn id(s: &str) -> ExecutorId {
        ExecutorId::from(s)
    }

    fn board_with_plan(order: &[&str]) -> Blackboard {
        let mut board = Blackboard::new("Can I add a CS minor?", Profile::new(), Vec::new());
        board
            .set_plan(
                Some("add_minor".to_string()),
                order.iter().map(|s| id(s)).collect(),
            )
            .unwrap();
        board
    }

    #[test]
    fn test_record_output_appends_constraints_and_risks() {
        let mut board = board_with_plan(&["policy_compliance"]);
        let first = ExecutorOutput::new(id("policy_compliance"), "ok", 0.9)
            .with_constraint(Constraint::hard(ConstraintSource::Policy, "max 54 units"))
            .with_risk(Risk::new("overload_risk", Severity::High, "60 units"));
        let second = ExecutorOutput::new(id("policy_compliance"), "revised", 0.9)
            .with_risk(Risk::new("overload_risk", Severity::Low, "51 units"));

        assert!(board.record_output(first).is_none());
        let replaced = board.record_output(second);

        assert_eq!(replaced.map(|o| o.answer), Some("ok".to_string()));
        assert_eq!(board.outputs().len(), 1);
        assert_eq!(board.constraints().len(), 1);
        assert_eq!(board.risks().len(), 2);
    }

    #[test]
    fn test_plan_is_fixed_once_execution_starts() {
        let mut board = board_with_plan(&["a"]);
        board.record_output(ExecutorOutput::new(id("a"), "x", 0.5));
        let result = board.set_plan(None, vec![id("b")]);
        assert!(matches!(result, Err(CounselError::ProtocolViolation(_))));
        assert_eq!(board.active_executors(), &[id("a")]);
    }

    #[test]
    fn test_pending_and_failed_executors() {
        let mut board = board_with_plan(&["a", "b", "c"]);
        board.record_output(ExecutorOutput::new(id("b"), "x", 0.5));
        board.record_failure(&ExecutorFailure::timeout(id("a"), 180));

        assert_eq!(board.pending_executors(), vec![id("c")]);
        assert!(!board.all_accounted_for());
        assert_eq!(board.executors_used(), vec![id("b")]);
        assert_eq!(board.failed_executors(), vec![id("a")]);
        assert!(board.failures()[0].timed_out);
    }

    #[test]
    fn test_replace_plan_options() {
        let mut board = board_with_plan(&["academic_planning"]);
        let plan = |term: &str| PlanOption::new(vec![SemesterPlan::new(term, vec![])], "p");
        board.replace_plan_options(vec![plan("Fall"), plan("Spring")]);
        board.replace_plan_options(vec![plan("Summer")]);
        assert_eq!(board.plan_options().len(), 1);
        assert_eq!(board.plan_options()[0].semesters()[0].term, "Summer");
    }

    #[test]
    fn test_apply_clarification_fills_profile_and_history() {
        let mut board = Blackboard::new("Do I need 15-112?", Profile::new(), Vec::new());
        let answers = vec![ClarificationAnswer {
            question: ClarificationQuestion::new("What is your major?").with_topic("major"),
            answer: "Information Systems".to_string(),
        }];
        board.apply_clarification(&answers);

        assert_eq!(board.history().len(), 2);
        assert_eq!(board.history()[1], HistoryMessage::user("Information Systems"));
        assert_eq!(
            board.profile().get("major"),
            Some(&serde_json::Value::String("Information Systems".to_string()))
        );
    }

    #[test]
    fn test_snapshot_serializes() {
        let board = board_with_plan(&["a"]);
        let json = serde_json::to_value(&board).unwrap();
        assert_eq!(json["step"], "initial");
        assert_eq!(json["active_executors"][0], "a");
    }
}
