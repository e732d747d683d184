//! Proposal + critique negotiation
//!
//! A pure state machine in the same shape as [`crate::state_machine`]. The
//! orchestrator starts it once the execution stage has produced a critique,
//! feeds it the detector's verdict after every critique, and performs the
//! returned actions. A hard violation escalates even when no proposal
//! exists yet; every other conflict needs one to revise.
//!
//! Termination: `iteration` only grows on the soft-retry path and retries
//! stop once it reaches `max_iterations`, so a turn sees at most
//! `max_iterations` re-proposals whatever the executors return.

use counsel_core::{Conflict, ConflictType};

/// Generic question used when the retry budget runs out
pub const BUDGET_EXHAUSTED_QUESTION: &str =
    "Conflicts remain between the proposed plan and university requirements. How would you like to proceed?";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NegotiationState {
    AwaitingProposal,
    AwaitingCritique,
    Converged,
    Escalated,
}

impl NegotiationState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Converged | Self::Escalated)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum NegotiationEvent {
    /// The proposer returned non-empty plan options
    ProposalReady,
    /// The proposer failed or returned no plan options
    ProposalMissing { reason: String },
    /// The critic ran and the detector produced these conflicts
    CritiqueEvaluated { conflicts: Vec<Conflict> },
    CritiqueFailed { reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NegotiationAction {
    /// Re-run the proposer with this critique as feedback
    InvokeProposer { feedback: Vec<String> },
    InvokeCritic,
    /// Add a question for the student
    AskUser { question: String },
    LogActivity { message: String },
}

/// Result of one negotiation transition
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NegotiationStep {
    pub state: NegotiationState,
    pub iteration: u32,
    pub actions: Vec<NegotiationAction>,
}

/// Owner of the negotiation budget
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NegotiationManager {
    max_iterations: u32,
}

impl Default for NegotiationManager {
    fn default() -> Self {
        Self::new(3)
    }
}

impl NegotiationManager {
    pub fn new(max_iterations: u32) -> Self {
        Self { max_iterations }
    }

    pub fn max_iterations(&self) -> u32 {
        self.max_iterations
    }

    /// Enter negotiation with the execution-stage critique
    pub fn start(&self) -> NegotiationStep {
        NegotiationStep {
            state: NegotiationState::AwaitingCritique,
            iteration: 0,
            actions: vec![log("Negotiating on the initial proposal")],
        }
    }

    pub fn transition(
        &self,
        state: NegotiationState,
        iteration: u32,
        event: NegotiationEvent,
    ) -> NegotiationStep {
        use NegotiationState::*;

        let step = |state, iteration, actions| NegotiationStep {
            state,
            iteration,
            actions,
        };

        match (state, event) {
            (AwaitingProposal, NegotiationEvent::ProposalReady) => step(
                AwaitingCritique,
                iteration,
                vec![
                    log(format!("Revised proposal received (round {})", iteration)),
                    NegotiationAction::InvokeCritic,
                ],
            ),

            (AwaitingProposal, NegotiationEvent::ProposalMissing { reason }) => step(
                Escalated,
                iteration,
                vec![
                    log(format!("Proposer produced no revision: {}", reason)),
                    NegotiationAction::AskUser {
                        question: "We could not produce a revised plan that addresses the \
                                   outstanding concerns. How would you like to proceed?"
                            .to_string(),
                    },
                ],
            ),

            (AwaitingCritique, NegotiationEvent::CritiqueEvaluated { conflicts }) => {
                self.evaluate(iteration, &conflicts)
            }

            (AwaitingCritique, NegotiationEvent::CritiqueFailed { reason }) => step(
                Escalated,
                iteration,
                vec![
                    log(format!("Critique failed: {}", reason)),
                    NegotiationAction::AskUser {
                        question: "We could not verify the proposed plan against university \
                                   policy. Please confirm with your advisor before proceeding."
                            .to_string(),
                    },
                ],
            ),

            (state, event) => step(
                Escalated,
                iteration,
                vec![
                    log(format!("Unexpected {:?} while {:?}", event, state)),
                    NegotiationAction::AskUser {
                        question: BUDGET_EXHAUSTED_QUESTION.to_string(),
                    },
                ],
            ),
        }
    }

    fn evaluate(&self, iteration: u32, conflicts: &[Conflict]) -> NegotiationStep {
        if conflicts.is_empty() {
            return NegotiationStep {
                state: NegotiationState::Converged,
                iteration,
                actions: vec![log(format!("Converged after {} re-proposals", iteration))],
            };
        }

        if iteration >= self.max_iterations {
            return NegotiationStep {
                state: NegotiationState::Escalated,
                iteration,
                actions: vec![
                    log(format!(
                        "Budget of {} re-proposals exhausted with {} conflicts",
                        self.max_iterations,
                        conflicts.len()
                    )),
                    NegotiationAction::AskUser {
                        question: BUDGET_EXHAUSTED_QUESTION.to_string(),
                    },
                ],
            };
        }

        let violations: Vec<&Conflict> = conflicts
            .iter()
            .filter(|c| c.conflict_type == ConflictType::HardViolation)
            .collect();
        if !violations.is_empty() {
            let mut actions = vec![log("Hard violation, escalating without retry")];
            actions.extend(violations.iter().map(|v| NegotiationAction::AskUser {
                question: format!(
                    "{}. This cannot be waived automatically; would you like to adjust the plan or request an exception?",
                    v.description
                ),
            }));
            return NegotiationStep {
                state: NegotiationState::Escalated,
                iteration,
                actions,
            };
        }

        let next = iteration + 1;
        NegotiationStep {
            state: NegotiationState::AwaitingProposal,
            iteration: next,
            actions: vec![
                log(format!("Requesting re-proposal {}/{}", next, self.max_iterations)),
                NegotiationAction::InvokeProposer {
                    feedback: conflicts
                        .iter()
                        .map(|c| format!("{}: {}", c.conflict_type, c.description))
                        .collect(),
                },
            ],
        }
    }
}

fn log(message: impl Into<String>) -> NegotiationAction {
    NegotiationAction::LogActivity {
        message: message.into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use counsel_core::ExecutorId;
    use NegotiationState::*;

    fn conflict(kind: ConflictType, description: &str) -> Conflict {
        Conflict::new(
            kind,
            [ExecutorId::from("academic_planning"), ExecutorId::from("policy_compliance")],
            description,
        )
    }

    fn evaluated(conflicts: Vec<Conflict>) -> NegotiationEvent {
        NegotiationEvent::CritiqueEvaluated { conflicts }
    }

    fn questions(step: &NegotiationStep) -> Vec<&str> {
        step.actions
            .iter()
            .filter_map(|a| match a {
                NegotiationAction::AskUser { question } => Some(question.as_str()),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_no_conflicts_converges() {
        let manager = NegotiationManager::default();
        let step = manager.transition(AwaitingCritique, 0, evaluated(vec![]));
        assert_eq!(step.state, Converged);
        assert_eq!(step.iteration, 0);
    }

    #[test]
    fn test_remaining_trade_off_requests_reproposal() {
        let manager = NegotiationManager::default();
        let step = manager.transition(
            AwaitingCritique,
            1,
            evaluated(vec![conflict(ConflictType::TradeOff, "2 plans")]),
        );
        assert_eq!(step.state, AwaitingProposal);
        assert_eq!(step.iteration, 2);
        assert!(step.actions.contains(&NegotiationAction::InvokeProposer {
            feedback: vec!["TRADE_OFF: 2 plans".to_string()]
        }));

        let step = manager.transition(
            AwaitingCritique,
            3,
            evaluated(vec![conflict(ConflictType::TradeOff, "2 plans")]),
        );
        assert_eq!(step.state, Escalated);
        assert_eq!(questions(&step), vec![BUDGET_EXHAUSTED_QUESTION]);
    }

    #[test]
    fn test_hard_violation_escalates_immediately() {
        let manager = NegotiationManager::default();
        let step = manager.transition(
            AwaitingCritique,
            0,
            evaluated(vec![conflict(ConflictType::HardViolation, "Exceeds 54 units")]),
        );
        assert_eq!(step.state, Escalated);
        assert_eq!(step.iteration, 0);
        assert!(questions(&step)[0].contains("Exceeds 54 units"));
        assert!(!step
            .actions
            .iter()
            .any(|a| matches!(a, NegotiationAction::InvokeProposer { .. })));
    }

    #[test]
    fn test_high_risk_requests_reproposal_with_feedback() {
        let manager = NegotiationManager::default();
        let step = manager.transition(
            AwaitingCritique,
            0,
            evaluated(vec![conflict(ConflictType::HighRisk, "overload")]),
        );
        assert_eq!(step.state, AwaitingProposal);
        assert_eq!(step.iteration, 1);
        assert!(step.actions.contains(&NegotiationAction::InvokeProposer {
            feedback: vec!["HIGH_RISK: overload".to_string()]
        }));

        let step = manager.transition(step.state, step.iteration, NegotiationEvent::ProposalReady);
        assert_eq!(step.state, AwaitingCritique);
        assert!(step.actions.contains(&NegotiationAction::InvokeCritic));
    }

    #[test]
    fn test_adversarial_critic_escalates_at_budget() {
        let manager = NegotiationManager::new(3);
        let mut step = manager.start();
        let mut proposals = 0;
        let mut transitions = 0;

        while !step.state.is_terminal() {
            transitions += 1;
            assert!(transitions < 100, "negotiation did not terminate");
            let event = match step.state {
                AwaitingCritique => evaluated(vec![conflict(ConflictType::HighRisk, "always")]),
                AwaitingProposal => {
                    proposals += 1;
                    NegotiationEvent::ProposalReady
                }
                _ => unreachable!(),
            };
            step = manager.transition(step.state, step.iteration, event);
        }

        assert_eq!(step.state, Escalated);
        assert_eq!(step.iteration, 3);
        assert_eq!(proposals, 3);
        assert_eq!(questions(&step), vec![BUDGET_EXHAUSTED_QUESTION]);
    }

    #[test]
    fn test_budget_check_precedes_hard_violation() {
        let manager = NegotiationManager::new(3);
        let step = manager.transition(
            AwaitingCritique,
            3,
            evaluated(vec![conflict(ConflictType::HardViolation, "x")]),
        );
        assert_eq!(questions(&step), vec![BUDGET_EXHAUSTED_QUESTION]);
    }

    #[test]
    fn test_zero_budget_never_retries() {
        let manager = NegotiationManager::new(0);
        let step = manager.transition(
            AwaitingCritique,
            0,
            evaluated(vec![conflict(ConflictType::HighRisk, "x")]),
        );
        assert_eq!(step.state, Escalated);
    }

    #[test]
    fn test_missing_proposal_or_critique_escalates() {
        let manager = NegotiationManager::default();
        let step = manager.transition(
            AwaitingProposal,
            1,
            NegotiationEvent::ProposalMissing {
                reason: "timed out".to_string(),
            },
        );
        assert_eq!(step.state, Escalated);
        assert_eq!(questions(&step).len(), 1);

        let step = manager.transition(
            AwaitingCritique,
            1,
            NegotiationEvent::CritiqueFailed {
                reason: "timed out".to_string(),
            },
        );
        assert_eq!(step.state, Escalated);
    }

    #[test]
    fn test_unexpected_event_escalates() {
        let manager = NegotiationManager::default();
        let step = manager.transition(Converged, 0, NegotiationEvent::ProposalReady);
        assert_eq!(step.state, Escalated);
    }
}
