//! # counsel-orchestrator
//!
//! Runs advising turns over the shared blackboard.
//!
//! - [`Orchestrator`]: drives a turn through planning, execution,
//!   negotiation and synthesis
//! - [`transition`]: the pure workflow state machine it follows
//! - [`ConflictDetector`] and [`NegotiationManager`]: proposal/critique
//!   arbitration between executors
//! - [`ExecutorHarness`]: timeouts, cancellation and bounded parallel stages
//! - [`SessionStore`]: conversation profile, history and turn traces

mod activity_logger;
mod conflicts;
mod harness;
mod negotiation;
mod orchestrator;
mod roles;
mod session;
mod state_machine;
mod synthesis;

pub use activity_logger::{ActivityEntry, ActivityLog};
pub use conflicts::{has_blocking, ConflictDetector};
pub use harness::{ExecutorHarness, Invocation};
pub use negotiation::{
    NegotiationAction, NegotiationEvent, NegotiationManager, NegotiationState, NegotiationStep,
    BUDGET_EXHAUSTED_QUESTION,
};
pub use orchestrator::{
    escalation_notice, Orchestrator, PendingClarification, TurnOutcome, TurnRequest,
};
pub use roles::{NegotiationRoles, TurnRoles};
pub use session::{
    Conversation, ConversationLocks, JsonFileStore, MemorySessionStore, SessionStore, TurnRecord,
    TurnTrace,
};
pub use state_machine::{transition, Action, Event};
pub use synthesis::{render_synthesis_prompt, LlmSynthesizer, Synthesizer};
