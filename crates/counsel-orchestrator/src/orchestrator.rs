//! Turn orchestration
//!
//! [`Orchestrator::run_turn`] drives one advising turn through the
//! workflow state machine: it performs each [`Action`] the machine returns
//! and feeds the outcome back as the next [`Event`]. All blackboard writes
//! happen here; executors, the detector and the collaborators only ever see
//! `&Blackboard`.
//!
//! Failure semantics:
//! - executor failures and timeouts are recorded and the turn goes on
//! - planner and synthesis failures are fatal after at most one retry
//! - cancellation stops the turn without synthesis and returns
//!   [`CounselError::Cancelled`]

use crate::activity_logger::ActivityLog;
use crate::conflicts::{has_blocking, ConflictDetector};
use crate::harness::ExecutorHarness;
use crate::negotiation::{NegotiationAction, NegotiationEvent, NegotiationManager, NegotiationState};
use crate::roles::NegotiationRoles;
use crate::session::{ConversationLocks, MemorySessionStore, SessionStore, TurnRecord, TurnTrace};
use crate::state_machine::{transition, Action, Event};
use crate::synthesis::Synthesizer;
use counsel_agent::ExecutorRegistry;
use counsel_core::fail_open::fail_open;
use counsel_core::{
    Blackboard, ClarificationAnswer, ClarificationQuestion, ConflictType, CounselConfig,
    CounselError, ExecutorId, HistoryMessage, Profile, Result, TurnResult, WorkflowStep,
};
use counsel_planning::{PlanRationale, WorkflowPlan, WorkflowPlanner};
use std::collections::VecDeque;
use std::fmt::Write as _;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::OwnedMutexGuard;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument, warn};

/// Input for one turn
#[derive(Debug, Clone)]
pub struct TurnRequest {
    pub conversation_id: String,
    pub query: String,
    /// Merged over the stored profile, these keys win
    pub profile: Profile,
    /// Replaces the stored history when set
    pub history: Option<Vec<HistoryMessage>>,
}

impl TurnRequest {
    pub fn new(conversation_id: impl Into<String>, query: impl Into<String>) -> Self {
        Self {
            conversation_id: conversation_id.into(),
            query: query.into(),
            profile: Profile::new(),
            history: None,
        }
    }

    pub fn with_profile(mut self, profile: Profile) -> Self {
        self.profile = profile;
        self
    }

    pub fn with_history(mut self, history: Vec<HistoryMessage>) -> Self {
        self.history = Some(history);
        self
    }
}

/// How a turn ended
#[derive(Debug)]
pub enum TurnOutcome {
    /// Synthesized answer
    Complete(TurnResult),
    /// Negotiation could not settle; the result carries open questions
    Escalated(TurnResult),
    /// The planner needs answers before any executor runs
    NeedsClarification(PendingClarification),
}

impl TurnOutcome {
    pub fn result(&self) -> Option<&TurnResult> {
        match self {
            Self::Complete(result) | Self::Escalated(result) => Some(result),
            Self::NeedsClarification(_) => None,
        }
    }
}

/// A turn parked until the caller answers the planner's questions
///
/// Holds the conversation lock: no other turn of the same conversation can
/// start until this one is resumed or dropped.
pub struct PendingClarification {
    turn: Turn,
}

impl PendingClarification {
    pub fn conversation_id(&self) -> &str {
        &self.turn.conversation_id
    }

    pub fn query(&self) -> &str {
        self.turn.board.query()
    }

    pub fn questions(&self) -> &[ClarificationQuestion] {
        &self.turn.questions
    }

    /// Pair answers with the questions in order
    pub fn answer(&self, answers: Vec<String>) -> Vec<ClarificationAnswer> {
        self.turn
            .questions
            .iter()
            .cloned()
            .zip(answers)
            .map(|(question, answer)| ClarificationAnswer { question, answer })
            .collect()
    }
}

impl std::fmt::Debug for PendingClarification {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PendingClarification")
            .field("conversation_id", &self.turn.conversation_id)
            .field("questions", &self.turn.questions)
            .finish()
    }
}

/// Mutable state of the turn being driven
struct Turn {
    conversation_id: String,
    board: Blackboard,
    stages: Vec<Vec<ExecutorId>>,
    questions: Vec<ClarificationQuestion>,
    rationale: Option<PlanRationale>,
    activity: ActivityLog,
    /// Clarification rounds completed
    round: u32,
    answer: Option<String>,
    _guard: OwnedMutexGuard<()>,
}

impl Turn {
    fn new(conversation_id: String, board: Blackboard, guard: OwnedMutexGuard<()>) -> Self {
        Self {
            conversation_id,
            board,
            stages: Vec::new(),
            questions: Vec::new(),
            rationale: None,
            activity: ActivityLog::new(),
            round: 0,
            answer: None,
            _guard: guard,
        }
    }

    fn log(&mut self, message: impl Into<String>) {
        self.activity.record(self.board.step(), message);
    }
}

pub struct Orchestrator {
    harness: ExecutorHarness,
    planner: Arc<dyn WorkflowPlanner>,
    synthesizer: Arc<dyn Synthesizer>,
    negotiation: NegotiationManager,
    roles: NegotiationRoles,
    store: Arc<dyn SessionStore>,
    locks: ConversationLocks,
    collaborator_retries: u32,
    history_window: usize,
}

impl Orchestrator {
    pub fn new(
        config: &CounselConfig,
        registry: ExecutorRegistry,
        planner: Arc<dyn WorkflowPlanner>,
        synthesizer: Arc<dyn Synthesizer>,
    ) -> Self {
        Self {
            harness: ExecutorHarness::new(
                registry,
                config.executor_timeout(),
                config.execution.max_parallel,
            ),
            planner,
            synthesizer,
            negotiation: NegotiationManager::new(config.negotiation.max_iterations),
            roles: NegotiationRoles::default(),
            store: Arc::new(MemorySessionStore::new()),
            locks: ConversationLocks::new(),
            collaborator_retries: config.collaborator_retries(),
            history_window: config.session.history_window,
        }
    }

    pub fn with_session_store(mut self, store: Arc<dyn SessionStore>) -> Self {
        self.store = store;
        self
    }

    pub fn with_roles(mut self, roles: NegotiationRoles) -> Self {
        self.roles = roles;
        self
    }

    pub fn registry(&self) -> &ExecutorRegistry {
        self.harness.registry()
    }

    pub fn session_store(&self) -> &Arc<dyn SessionStore> {
        &self.store
    }

    /// Run one turn to completion, escalation or a clarification request
    #[instrument(skip_all, fields(conversation = %request.conversation_id))]
    pub async fn run_turn(
        &self,
        request: TurnRequest,
        cancel: &CancellationToken,
    ) -> Result<TurnOutcome> {
        let guard = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(CounselError::Cancelled),
            guard = self.locks.acquire(&request.conversation_id) => guard,
        };

        let TurnRequest {
            conversation_id,
            query,
            profile,
            history,
        } = request;

        let conversation = self.store.load(&conversation_id).await?;
        let mut merged = conversation.profile.clone();
        merged.extend(profile);
        let history =
            history.unwrap_or_else(|| conversation.recent_history(self.history_window));

        let board = Blackboard::new(query, merged, history);
        self.drive(Turn::new(conversation_id, board, guard), Event::Start, cancel)
            .await
    }

    /// Continue a parked turn with the caller's answers
    ///
    /// The planner runs again with the answers folded into profile and
    /// history; a second clarification request is ignored.
    #[instrument(skip_all, fields(conversation = %pending.turn.conversation_id))]
    pub async fn resume_turn(
        &self,
        pending: PendingClarification,
        answers: Vec<ClarificationAnswer>,
        cancel: &CancellationToken,
    ) -> Result<TurnOutcome> {
        let mut turn = pending.turn;
        turn.board.apply_clarification(&answers);
        turn.round += 1;
        turn.questions.clear();
        self.drive(turn, Event::ClarificationReceived, cancel).await
    }

    async fn drive(
        &self,
        mut turn: Turn,
        first: Event,
        cancel: &CancellationToken,
    ) -> Result<TurnOutcome> {
        let mut queue: VecDeque<Action> = self.advance(&mut turn, first)?.into();

        while let Some(action) = queue.pop_front() {
            let event = match action {
                Action::InvokePlanner => match self.plan(&mut turn, cancel).await {
                    Ok(event) => event,
                    Err(e) => return self.abort(&mut turn, e),
                },
                Action::AwaitClarification => {
                    return Ok(TurnOutcome::NeedsClarification(PendingClarification { turn }));
                }
                Action::RunExecutors => {
                    self.execute(&mut turn, cancel).await;
                    Event::ExecutionComplete {
                        negotiable: self.negotiable(&turn.board),
                    }
                }
                Action::Negotiate => {
                    if self.negotiate(&mut turn, cancel).await {
                        Event::NegotiationConverged
                    } else {
                        Event::NegotiationEscalated
                    }
                }
                Action::Synthesize => match self.synthesize(&turn.board, cancel).await {
                    Ok(answer) => {
                        turn.answer = Some(answer);
                        Event::Synthesized
                    }
                    Err(e) => return self.abort(&mut turn, e),
                },
                Action::ReturnAnswer => {
                    return Ok(TurnOutcome::Complete(self.finish(turn).await));
                }
                Action::ReturnOpenQuestions => {
                    return Ok(TurnOutcome::Escalated(self.finish(turn).await));
                }
                Action::LogActivity { .. } | Action::Reject { .. } => continue,
            };

            if cancel.is_cancelled() {
                return self.abort(&mut turn, CounselError::Cancelled);
            }
            queue.extend(self.advance(&mut turn, event)?);
        }

        Err(CounselError::InvalidTransition(format!(
            "turn stopped in {} without a result",
            turn.board.step()
        )))
    }

    /// Apply one event; log actions are consumed here
    fn advance(&self, turn: &mut Turn, event: Event) -> Result<Vec<Action>> {
        let (next, actions) = transition(turn.board.step(), event);
        turn.board.set_step(next);

        let mut work = Vec::with_capacity(actions.len());
        for action in actions {
            match action {
                Action::LogActivity { message } => turn.log(message),
                Action::Reject { reason } => {
                    warn!("Rejected transition: {}", reason);
                    turn.log(format!("Rejected: {}", reason));
                    return Err(CounselError::InvalidTransition(reason));
                }
                other => work.push(other),
            }
        }
        Ok(work)
    }

    /// Record a fatal error or cancellation on the state machine and return it
    fn abort(&self, turn: &mut Turn, error: CounselError) -> Result<TurnOutcome> {
        if !turn.board.step().is_terminal() {
            let event = match &error {
                CounselError::Cancelled => Event::Cancelled,
                other => Event::Fatal {
                    reason: other.to_string(),
                },
            };
            // Fatal and Cancelled are accepted from every active step
            let _ = self.advance(turn, event);
        }
        Err(error)
    }

    /// Await a fatal collaborator, retrying a retryable failure
    async fn call_collaborator<T, F, Fut>(
        &self,
        name: &str,
        cancel: &CancellationToken,
        mut call: F,
    ) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut attempt = 0;
        loop {
            let result = tokio::select! {
                biased;
                _ = cancel.cancelled() => Err(CounselError::Cancelled),
                result = call() => result,
            };
            match result {
                Err(e) if attempt < self.collaborator_retries && e.is_retryable() => {
                    attempt += 1;
                    warn!("{} failed, retrying ({}/{}): {}", name, attempt, self.collaborator_retries, e);
                }
                other => return other,
            }
        }
    }

    async fn plan(&self, turn: &mut Turn, cancel: &CancellationToken) -> Result<Event> {
        let board = &turn.board;
        let plan = self
            .call_collaborator("planner", cancel, || {
                self.planner
                    .plan(board.query(), board.profile(), board.history())
            })
            .await?
            .sanitize(|id| self.harness.registry().contains(id));

        let clarification = plan.needs_clarification();
        let WorkflowPlan {
            goal,
            order,
            stages,
            clarification: questions,
            rationale,
        } = plan;

        let executors = order.len();
        turn.stages = if stages.is_empty() {
            order.iter().map(|id| vec![id.clone()]).collect()
        } else {
            stages
        };
        turn.board.set_plan(goal, order)?;
        turn.questions = questions;
        if rationale.is_some() {
            turn.rationale = rationale;
        }

        debug!(
            "Planned {:?} in {} stages",
            turn.board.active_executors(),
            turn.stages.len()
        );
        Ok(Event::Planned {
            executors,
            clarification,
            round: turn.round,
        })
    }

    /// Run every planned stage in order, detecting conflicts after each
    async fn execute(&self, turn: &mut Turn, cancel: &CancellationToken) {
        let roles = self.roles.resolve(turn.board.active_executors());
        let detector = ConflictDetector::new(roles.clone());
        let stages = std::mem::take(&mut turn.stages);

        for stage in &stages {
            if cancel.is_cancelled() {
                break;
            }
            let results = self.harness.run_stage(stage, &turn.board, cancel).await;
            for (id, result) in results {
                match result {
                    Ok(output) => {
                        if roles.is_proposer(&id) && output.has_plan_options() {
                            let options = output.plan_options.clone().unwrap_or_default();
                            turn.board.replace_plan_options(options);
                        }
                        turn.board.record_output(output);
                    }
                    Err(failure) => turn.board.record_failure(&failure),
                }
            }
            let conflicts = detector.detect(&turn.board);
            turn.board.replace_conflicts(conflicts);
        }
        turn.stages = stages;

        let pending = turn.board.pending_executors();
        if !pending.is_empty() && !cancel.is_cancelled() {
            warn!("Executors never ran: {:?}", pending);
        }
    }

    /// Whether the blackboard warrants a proposal/critique exchange
    fn negotiable(&self, board: &Blackboard) -> bool {
        if !has_blocking(board.conflicts()) {
            return false;
        }
        let roles = self.roles.resolve(board.active_executors());
        // A hard violation escalates without a proposal; retries need one
        let negotiable = match roles.pair() {
            Some((proposer, critic)) => {
                board.output(critic).is_some()
                    && (board
                        .output(proposer)
                        .is_some_and(|output| output.has_plan_options())
                        || board
                            .conflicts()
                            .iter()
                            .any(|c| c.conflict_type == ConflictType::HardViolation))
            }
            None => false,
        };
        if !negotiable {
            debug!("Blocking conflicts without a proposal and critique, passing to synthesis");
        }
        negotiable
    }

    /// Drive the negotiation machine; true when it converged
    async fn negotiate(&self, turn: &mut Turn, cancel: &CancellationToken) -> bool {
        let roles = self.roles.resolve(turn.board.active_executors());
        let Some((proposer, critic)) = roles.pair().map(|(p, c)| (p.clone(), c.clone())) else {
            turn.log("Negotiation needs both a proposer and a critic");
            return false;
        };
        let detector = ConflictDetector::new(roles);

        let mut step = self.negotiation.start();
        let mut event = Some(NegotiationEvent::CritiqueEvaluated {
            conflicts: turn.board.conflicts().to_vec(),
        });

        loop {
            turn.board.set_iteration(step.iteration);
            for action in std::mem::take(&mut step.actions) {
                match action {
                    NegotiationAction::LogActivity { message } => turn.log(message),
                    NegotiationAction::AskUser { question } => turn.board.push_open_question(question),
                    NegotiationAction::InvokeProposer { feedback } => {
                        turn.board.set_feedback(feedback);
                        event = Some(self.repropose(turn, &proposer, cancel).await);
                    }
                    NegotiationAction::InvokeCritic => {
                        event = Some(self.recritique(turn, &critic, &detector, cancel).await);
                    }
                }
            }

            if step.state.is_terminal() {
                return step.state == NegotiationState::Converged;
            }

            let next = event.take().unwrap_or_else(|| NegotiationEvent::CritiqueFailed {
                reason: "no executor was invoked".to_string(),
            });
            step = self.negotiation.transition(step.state, step.iteration, next);
        }
    }

    async fn repropose(
        &self,
        turn: &mut Turn,
        proposer: &ExecutorId,
        cancel: &CancellationToken,
    ) -> NegotiationEvent {
        match self.harness.invoke(proposer, &turn.board, cancel).await {
            Ok(output) if output.has_plan_options() => {
                let options = output.plan_options.clone().unwrap_or_default();
                turn.board.replace_plan_options(options);
                turn.board.record_output(output);
                NegotiationEvent::ProposalReady
            }
            Ok(_) => NegotiationEvent::ProposalMissing {
                reason: format!("{} returned no plan options", proposer),
            },
            Err(failure) => {
                turn.board.record_failure(&failure);
                NegotiationEvent::ProposalMissing {
                    reason: failure.to_string(),
                }
            }
        }
    }

    async fn recritique(
        &self,
        turn: &mut Turn,
        critic: &ExecutorId,
        detector: &ConflictDetector,
        cancel: &CancellationToken,
    ) -> NegotiationEvent {
        match self.harness.invoke(critic, &turn.board, cancel).await {
            Ok(output) => {
                turn.board.record_output(output);
                let conflicts = detector.detect(&turn.board);
                turn.board.replace_conflicts(conflicts.clone());
                NegotiationEvent::CritiqueEvaluated { conflicts }
            }
            Err(failure) => {
                turn.board.record_failure(&failure);
                NegotiationEvent::CritiqueFailed {
                    reason: failure.to_string(),
                }
            }
        }
    }

    async fn synthesize(&self, board: &Blackboard, cancel: &CancellationToken) -> Result<String> {
        self.call_collaborator("synthesis", cancel, || self.synthesizer.synthesize(board))
            .await
    }

    /// Build the caller-facing result and persist the turn
    async fn finish(&self, turn: Turn) -> TurnResult {
        let Turn {
            conversation_id,
            board,
            rationale,
            activity,
            answer,
            _guard,
            ..
        } = turn;

        let answer = match board.step() {
            WorkflowStep::Escalated => escalation_notice(&board),
            _ => answer.unwrap_or_default(),
        };
        let result = TurnResult {
            answer,
            executors_used: board.executors_used(),
            conflicts: board.conflicts().to_vec(),
            open_questions: board.open_questions().to_vec(),
            failed_executors: board.failed_executors(),
            goal: board.goal().map(str::to_string),
            step: board.step(),
        };

        fail_open(
            "session::update_profile",
            self.store.update_profile(&conversation_id, board.profile()),
        )
        .await;
        let query = board.query().to_string();
        let record = TurnRecord::new(
            query,
            result.clone(),
            TurnTrace {
                blackboard: board,
                rationale,
                activity,
            },
        );
        fail_open(
            "session::append_turn",
            self.store.append_turn(&conversation_id, record),
        )
        .await;

        result
    }
}

/// Deterministic answer for an escalated turn
pub fn escalation_notice(board: &Blackboard) -> String {
    let mut notice =
        String::from("We could not settle on a plan without your input.\n\nOutstanding issues:\n");
    for conflict in board.conflicts().iter().filter(|c| c.conflict_type.is_blocking()) {
        let _ = writeln!(notice, "- {}: {}", conflict.conflict_type, conflict.description);
    }
    if !board.open_questions().is_empty() {
        notice.push_str("\nPlease let us know:\n");
        for question in board.open_questions() {
            let _ = writeln!(notice, "- {}", question);
        }
    }
    notice.trim_end().to_string()
}
