//! Core type definitions for Counsel orchestration

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Identifier of a registered task executor (e.g. `policy_compliance`)
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ExecutorId(String);

impl ExecutorId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ExecutorId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for ExecutorId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for ExecutorId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Where a constraint originates
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConstraintSource {
    #[default]
    Policy,
    Student,
    Finance,
}

impl std::fmt::Display for ConstraintSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Policy => write!(f, "policy"),
            Self::Student => write!(f, "student"),
            Self::Finance => write!(f, "finance"),
        }
    }
}

impl std::str::FromStr for ConstraintSource {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "policy" => Ok(Self::Policy),
            "student" => Ok(Self::Student),
            "finance" | "financial" => Ok(Self::Finance),
            _ => Err(format!("Invalid constraint source: {}", s)),
        }
    }
}

/// Risk severity
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    High,
    #[default]
    Medium,
    Low,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::High => write!(f, "high"),
            Self::Medium => write!(f, "medium"),
            Self::Low => write!(f, "low"),
        }
    }
}

impl std::str::FromStr for Severity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "high" | "critical" => Ok(Self::High),
            "medium" | "moderate" => Ok(Self::Medium),
            "low" => Ok(Self::Low),
            _ => Err(format!("Invalid severity: {}", s)),
        }
    }
}

/// A constraint contributed by an executor
///
/// Only `hard` constraints can produce a hard-violation conflict.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Constraint {
    pub source: ConstraintSource,
    pub description: String,
    pub hard: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub citation: Option<String>,
}

impl Constraint {
    pub fn hard(source: ConstraintSource, description: impl Into<String>) -> Self {
        Self {
            source,
            description: description.into(),
            hard: true,
            citation: None,
        }
    }

    pub fn soft(source: ConstraintSource, description: impl Into<String>) -> Self {
        Self {
            source,
            description: description.into(),
            hard: false,
            citation: None,
        }
    }

    pub fn with_citation(mut self, citation: impl Into<String>) -> Self {
        self.citation = Some(citation.into());
        self
    }
}

/// A risk identified by an executor (e.g. `overload_risk`)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Risk {
    pub kind: String,
    pub severity: Severity,
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub citation: Option<String>,
}

impl Risk {
    pub fn new(kind: impl Into<String>, severity: Severity, description: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            severity,
            description: description.into(),
            citation: None,
        }
    }

    pub fn with_citation(mut self, citation: impl Into<String>) -> Self {
        self.citation = Some(citation.into());
        self
    }

    pub fn is_high(&self) -> bool {
        self.severity == Severity::High
    }
}

/// Courses planned for one term
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SemesterPlan {
    pub term: String,
    pub courses: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub units: Option<u32>,
}

impl SemesterPlan {
    pub fn new(term: impl Into<String>, courses: Vec<String>) -> Self {
        Self {
            term: term.into(),
            courses,
            units: None,
        }
    }

    pub fn with_units(mut self, units: u32) -> Self {
        self.units = Some(units);
        self
    }
}

/// A candidate multi-semester plan
///
/// `courses` is always the union of every semester's courses; it is derived
/// on construction and on deserialization, never accepted from outside.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "PlanOptionWire")]
pub struct PlanOption {
    semesters: Vec<SemesterPlan>,
    courses: BTreeSet<String>,
    pub confidence: f64,
    pub justification: String,
    pub risks: Vec<Risk>,
    pub citations: Vec<String>,
}

#[derive(Deserialize)]
struct PlanOptionWire {
    #[serde(default)]
    semesters: Vec<SemesterPlan>,
    #[serde(default = "default_confidence")]
    confidence: f64,
    #[serde(default)]
    justification: String,
    #[serde(default)]
    risks: Vec<Risk>,
    #[serde(default, alias = "policy_citations")]
    citations: Vec<String>,
}

impl From<PlanOptionWire> for PlanOption {
    fn from(wire: PlanOptionWire) -> Self {
        let mut option = PlanOption::new(wire.semesters, wire.justification)
            .with_confidence(wire.confidence);
        option.risks = wire.risks;
        option.citations = wire.citations;
        option
    }
}

fn default_confidence() -> f64 {
    0.5
}

impl PlanOption {
    pub fn new(semesters: Vec<SemesterPlan>, justification: impl Into<String>) -> Self {
        let courses = semesters
            .iter()
            .flat_map(|s| s.courses.iter().cloned())
            .collect();
        Self {
            semesters,
            courses,
            confidence: default_confidence(),
            justification: justification.into(),
            risks: Vec::new(),
            citations: Vec::new(),
        }
    }

    pub fn with_confidence(mut self, confidence: f64) -> Self {
        self.confidence = clamp_confidence(confidence);
        self
    }

    pub fn with_risk(mut self, risk: Risk) -> Self {
        self.risks.push(risk);
        self
    }

    pub fn semesters(&self) -> &[SemesterPlan] {
        &self.semesters
    }

    pub fn courses(&self) -> &BTreeSet<String> {
        &self.courses
    }

    /// One-line description used when listing trade-off options
    pub fn summary(&self) -> String {
        let terms: Vec<String> = self
            .semesters
            .iter()
            .map(|s| format!("{}: {}", s.term, s.courses.join(", ")))
            .collect();
        let plan = if terms.is_empty() {
            "no semesters".to_string()
        } else {
            terms.join(" | ")
        };
        if self.justification.is_empty() {
            format!("{} (confidence {:.2})", plan, self.confidence)
        } else {
            format!(
                "{} (confidence {:.2}) - {}",
                plan, self.confidence, self.justification
            )
        }
    }
}

/// Clamp a confidence score into `[0, 1]`; NaN becomes 0
pub fn clamp_confidence(value: f64) -> f64 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 1.0)
    }
}

/// Structured result of one executor invocation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutorOutput {
    pub executor_id: ExecutorId,
    pub answer: String,
    pub confidence: f64,
    #[serde(default)]
    pub cited_policies: BTreeSet<String>,
    #[serde(default)]
    pub risks: Vec<Risk>,
    #[serde(default)]
    pub constraints: Vec<Constraint>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub plan_options: Option<Vec<PlanOption>>,
}

impl ExecutorOutput {
    pub fn new(executor_id: ExecutorId, answer: impl Into<String>, confidence: f64) -> Self {
        Self {
            executor_id,
            answer: answer.into(),
            confidence: clamp_confidence(confidence),
            cited_policies: BTreeSet::new(),
            risks: Vec::new(),
            constraints: Vec::new(),
            plan_options: None,
        }
    }

    pub fn with_policy(mut self, policy: impl Into<String>) -> Self {
        self.cited_policies.insert(policy.into());
        self
    }

    pub fn with_risk(mut self, risk: Risk) -> Self {
        self.risks.push(risk);
        self
    }

    pub fn with_constraint(mut self, constraint: Constraint) -> Self {
        self.constraints.push(constraint);
        self
    }

    pub fn with_plan_options(mut self, options: Vec<PlanOption>) -> Self {
        self.plan_options = Some(options);
        self
    }

    /// Whether this output proposes at least one plan
    pub fn has_plan_options(&self) -> bool {
        self.plan_options.as_ref().is_some_and(|p| !p.is_empty())
    }
}

/// Canonical conflict categories
///
/// This set is closed: negotiation switches on it and nothing else may be
/// introduced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConflictType {
    /// The plan breaks a hard constraint and cannot stand
    HardViolation,
    /// The plan is possible but risky
    HighRisk,
    /// Several valid options exist
    TradeOff,
}

impl ConflictType {
    /// Hard violations and high risks warrant negotiation; trade-offs are
    /// handed to synthesis as-is.
    pub fn is_blocking(&self) -> bool {
        matches!(self, Self::HardViolation | Self::HighRisk)
    }
}

impl std::fmt::Display for ConflictType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::HardViolation => write!(f, "HARD_VIOLATION"),
            Self::HighRisk => write!(f, "HIGH_RISK"),
            Self::TradeOff => write!(f, "TRADE_OFF"),
        }
    }
}

impl std::str::FromStr for ConflictType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace('-', "_").as_str() {
            "hard_violation" => Ok(Self::HardViolation),
            "high_risk" => Ok(Self::HighRisk),
            "trade_off" | "tradeoff" => Ok(Self::TradeOff),
            _ => Err(format!("Invalid conflict type: {}", s)),
        }
    }
}

/// One way of resolving a conflict
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolutionOption {
    pub label: String,
    pub summary: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub plan_index: Option<usize>,
}

/// A structured disagreement surfaced by the conflict detector
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Conflict {
    #[serde(rename = "type")]
    pub conflict_type: ConflictType,
    pub affected_executors: BTreeSet<ExecutorId>,
    pub description: String,
    #[serde(default)]
    pub options: Vec<ResolutionOption>,
}

impl Conflict {
    pub fn new(
        conflict_type: ConflictType,
        affected_executors: impl IntoIterator<Item = ExecutorId>,
        description: impl Into<String>,
    ) -> Self {
        Self {
            conflict_type,
            affected_executors: affected_executors.into_iter().collect(),
            description: description.into(),
            options: Vec::new(),
        }
    }

    pub fn with_options(mut self, options: Vec<ResolutionOption>) -> Self {
        self.options = options;
        self
    }
}

/// Deserialize a conflict list, dropping entries that do not parse
///
/// Stored traces may carry conflict kinds this build does not know.
pub fn deserialize_conflicts<'de, D>(deserializer: D) -> Result<Vec<Conflict>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let raw: Vec<serde_json::Value> = Vec::deserialize(deserializer)?;
    Ok(raw
        .into_iter()
        .filter_map(|value| match serde_json::from_value::<Conflict>(value) {
            Ok(conflict) => Some(conflict),
            Err(e) => {
                tracing::warn!("Dropping unrecognized conflict: {}", e);
                None
            }
        })
        .collect())
}

/// Workflow state of a turn
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowStep {
    #[default]
    Initial,
    Planning,
    AwaitingClarification,
    Executing,
    Negotiating,
    Synthesizing,
    Complete,
    /// Conflicts could not be settled; the user must advise
    Escalated,
    /// Fatal collaborator error or cancellation
    Failed,
}

impl WorkflowStep {
    /// Whether control returns to the caller in this state
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Complete | Self::Escalated | Self::Failed)
    }
}

impl std::fmt::Display for WorkflowStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Initial => "initial",
            Self::Planning => "planning",
            Self::AwaitingClarification => "awaiting_clarification",
            Self::Executing => "executing",
            Self::Negotiating => "negotiating",
            Self::Synthesizing => "synthesizing",
            Self::Complete => "complete",
            Self::Escalated => "escalated",
            Self::Failed => "failed",
        };
        write!(f, "{}", name)
    }
}

/// Speaker of a conversation message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::User => write!(f, "user"),
            Self::Assistant => write!(f, "assistant"),
        }
    }
}

/// A prior message in the conversation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryMessage {
    pub role: Role,
    pub content: String,
}

impl HistoryMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// A question the planner needs answered before it can route the query
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClarificationQuestion {
    pub question: String,
    #[serde(default)]
    pub why: String,
    /// Profile key this question fills in (e.g. `major`)
    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub topic: Option<String>,
    #[serde(default)]
    pub options: Vec<String>,
}

impl ClarificationQuestion {
    pub fn new(question: impl Into<String>) -> Self {
        Self {
            question: question.into(),
            why: String::new(),
            topic: None,
            options: Vec::new(),
        }
    }

    pub fn with_topic(mut self, topic: impl Into<String>) -> Self {
        self.topic = Some(topic.into());
        self
    }
}

/// The caller's answer to a clarification question
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClarificationAnswer {
    pub question: ClarificationQuestion,
    pub answer: String,
}

/// Caller-facing result of a finished turn
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TurnResult {
    pub answer: String,
    pub executors_used: Vec<ExecutorId>,
    #[serde(default, deserialize_with = "deserialize_conflicts")]
    pub conflicts: Vec<Conflict>,
    pub open_questions: Vec<String>,
    #[serde(default)]
    pub failed_executors: Vec<ExecutorId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub goal: Option<String>,
    pub step: WorkflowStep,
}

impl TurnResult {
    pub fn is_escalated(&self) -> bool {
        self.step == WorkflowStep::Escalated
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn semester(term: &str, courses: &[&str]) -> SemesterPlan {
        SemesterPlan::new(term, courses.iter().map(|c| c.to_string()).collect())
    }

    #[test]
    fn test_unknown_conflict_kind_is_dropped() {
        let result: TurnResult = serde_json::from_value(serde_json::json!({
            "answer": "a",
            "executors_used": [],
            "conflicts": [
                {"type": "HIGH_RISK", "affected_executors": ["policy_compliance"], "description": "x"},
                {"type": "SCHEDULE_CLASH", "affected_executors": [], "description": "y"}
            ],
            "open_questions": [],
            "step": "complete"
        }))
        .unwrap();
        assert_eq!(result.conflicts.len(), 1);
        assert_eq!(result.conflicts[0].conflict_type, ConflictType::HighRisk);
    }

    #[test]
    fn test_plan_option_courses_are_union_of_semesters() {
        let option = PlanOption::new(
            vec![
                semester("Fall", &["15-112", "21-120"]),
                semester("Spring", &["15-122", "21-120"]),
            ],
            "standard sequence",
        );
        let expected: BTreeSet<String> = ["15-112", "15-122", "21-120"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        assert_eq!(option.courses(), &expected);
    }

    #[test]
    fn test_plan_option_deserialization_recomputes_courses() {
        let json = r#"{
            "semesters": [{"term": "Fall", "courses": ["15-213"]}],
            "courses": ["99-999"],
            "confidence": 1.7,
            "justification": "fast track",
            "policy_citations": ["Overload policy"]
        }"#;
        let option: PlanOption = serde_json::from_str(json).unwrap();
        assert_eq!(option.courses().len(), 1);
        assert!(option.courses().contains("15-213"));
        assert_eq!(option.confidence, 1.0);
        assert_eq!(option.citations, vec!["Overload policy".to_string()]);
    }

    #[test]
    fn test_plan_option_summary() {
        let option = PlanOption::new(vec![semester("Fall", &["15-112"])], "light load")
            .with_confidence(0.8);
        assert_eq!(option.summary(), "Fall: 15-112 (confidence 0.80) - light load");
    }

    #[test]
    fn test_executor_output_confidence_is_clamped() {
        let output = ExecutorOutput::new(ExecutorId::from("a"), "answer", 3.0);
        assert_eq!(output.confidence, 1.0);
        let output = ExecutorOutput::new(ExecutorId::from("a"), "answer", f64::NAN);
        assert_eq!(output.confidence, 0.0);
    }

    #[test]
    fn test_has_plan_options() {
        let output = ExecutorOutput::new(ExecutorId::from("a"), "answer", 0.5);
        assert!(!output.has_plan_options());
        let output = output.clone().with_plan_options(Vec::new());
        assert!(!output.has_plan_options());
        let output = output.with_plan_options(vec![PlanOption::new(Vec::new(), "x")]);
        assert!(output.has_plan_options());
    }

    #[test]
    fn test_conflict_type_parsing_is_closed() {
        assert_eq!("hard_violation".parse::<ConflictType>(), Ok(ConflictType::HardViolation));
        assert_eq!("HIGH_RISK".parse::<ConflictType>(), Ok(ConflictType::HighRisk));
        assert_eq!("trade-off".parse::<ConflictType>(), Ok(ConflictType::TradeOff));
        assert!("soft_violation".parse::<ConflictType>().is_err());
    }

    #[test]
    fn test_conflict_type_serializes_screaming_case() {
        let conflict = Conflict::new(ConflictType::TradeOff, vec![ExecutorId::from("a")], "x");
        let json = serde_json::to_value(&conflict).unwrap();
        assert_eq!(json["type"], "TRADE_OFF");
        assert!(ConflictType::HighRisk.is_blocking());
        assert!(!ConflictType::TradeOff.is_blocking());
    }

    #[test]
    fn test_severity_from_str() {
        assert_eq!("HIGH".parse::<Severity>(), Ok(Severity::High));
        assert_eq!("moderate".parse::<Severity>(), Ok(Severity::Medium));
        assert!("extreme".parse::<Severity>().is_err());
    }

    #[test]
    fn test_terminal_steps() {
        assert!(WorkflowStep::Complete.is_terminal());
        assert!(WorkflowStep::Escalated.is_terminal());
        assert!(!WorkflowStep::Negotiating.is_terminal());
        assert_eq!(WorkflowStep::AwaitingClarification.to_string(), "awaiting_clarification");
    }
}
