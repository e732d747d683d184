//! Pure state machine for a single advising turn
//!
//! No I/O and no async: `transition(step, event) -> (step, actions)` is
//! deterministic. The orchestrator performs the returned actions and feeds
//! their outcome back in as the next event.
//!
//! - Invalid transitions go to `Failed` with an [`Action::Reject`] (never panic)
//! - At most one clarification round per turn is enforced here

use counsel_core::WorkflowStep;

/// Outcomes the orchestrator reports back
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    /// A new turn begins
    Start,
    /// The planner returned
    Planned {
        executors: usize,
        clarification: bool,
        /// Clarification rounds already completed this turn
        round: u32,
    },
    /// The caller answered the clarification questions
    ClarificationReceived,
    /// Every planned executor produced output or failed
    ExecutionComplete { negotiable: bool },
    NegotiationConverged,
    NegotiationEscalated,
    /// The synthesis collaborator produced the answer
    Synthesized,
    /// Planner or synthesis failed for good
    Fatal { reason: String },
    /// The caller cancelled the turn
    Cancelled,
}

/// Work for the orchestrator
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    InvokePlanner,
    AwaitClarification,
    RunExecutors,
    Negotiate,
    Synthesize,
    /// Return the synthesized answer to the caller
    ReturnAnswer,
    /// Return the open questions to the caller
    ReturnOpenQuestions,
    LogActivity { message: String },
    /// The event is not valid in the current step
    Reject { reason: String },
}

fn log(message: impl Into<String>) -> Action {
    Action::LogActivity {
        message: message.into(),
    }
}

/// Pure state transition function
pub fn transition(step: WorkflowStep, event: Event) -> (WorkflowStep, Vec<Action>) {
    use WorkflowStep::*;

    match (step, event) {
        (Initial, Event::Start) => (
            Planning,
            vec![log("Planning turn"), Action::InvokePlanner],
        ),

        (
            Planning,
            Event::Planned {
                executors,
                clarification,
                round,
            },
        ) => {
            if clarification && round == 0 {
                return (
                    AwaitingClarification,
                    vec![
                        log("Planner requested clarification"),
                        Action::AwaitClarification,
                    ],
                );
            }

            let mut actions = Vec::new();
            if clarification {
                actions.push(log("Ignoring repeated clarification request"));
            }
            if executors == 0 {
                actions.push(log("No executors planned, answering directly"));
                actions.push(Action::Synthesize);
                (Synthesizing, actions)
            } else {
                actions.push(log(format!("Executing {} planned executors", executors)));
                actions.push(Action::RunExecutors);
                (Executing, actions)
            }
        }

        (AwaitingClarification, Event::ClarificationReceived) => (
            Planning,
            vec![log("Re-planning with clarification"), Action::InvokePlanner],
        ),

        (Executing, Event::ExecutionComplete { negotiable }) => {
            if negotiable {
                (
                    Negotiating,
                    vec![log("Blocking conflicts found, negotiating"), Action::Negotiate],
                )
            } else {
                (
                    Synthesizing,
                    vec![log("Execution complete, synthesizing"), Action::Synthesize],
                )
            }
        }

        (Negotiating, Event::NegotiationConverged) => (
            Synthesizing,
            vec![log("Negotiation converged"), Action::Synthesize],
        ),

        (Negotiating, Event::NegotiationEscalated) => (
            Escalated,
            vec![
                log("Negotiation escalated to the student"),
                Action::ReturnOpenQuestions,
            ],
        ),

        (Synthesizing, Event::Synthesized) => {
            (Complete, vec![log("Turn complete"), Action::ReturnAnswer])
        }

        (step, Event::Fatal { reason }) if !step.is_terminal() => {
            (Failed, vec![log(format!("Turn failed in {}: {}", step, reason))])
        }

        (step, Event::Cancelled) if !step.is_terminal() => {
            (Failed, vec![log(format!("Turn cancelled in {}", step))])
        }

        (step, event) => (
            Failed,
            vec![Action::Reject {
                reason: format!("{} cannot handle {:?}", step, event),
            }],
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use WorkflowStep::*;

    fn planned(executors: usize, clarification: bool, round: u32) -> Event {
        Event::Planned {
            executors,
            clarification,
            round,
        }
    }

    fn work(actions: &[Action]) -> Vec<&Action> {
        actions
            .iter()
            .filter(|a| !matches!(a, Action::LogActivity { .. }))
            .collect()
    }

    #[test]
    fn test_happy_path_with_negotiation() {
        let (step, actions) = transition(Initial, Event::Start);
        assert_eq!(step, Planning);
        assert_eq!(work(&actions), vec![&Action::InvokePlanner]);

        let (step, actions) = transition(step, planned(2, false, 0));
        assert_eq!(step, Executing);
        assert_eq!(work(&actions), vec![&Action::RunExecutors]);

        let (step, actions) = transition(step, Event::ExecutionComplete { negotiable: true });
        assert_eq!(step, Negotiating);
        assert_eq!(work(&actions), vec![&Action::Negotiate]);

        let (step, _) = transition(step, Event::NegotiationConverged);
        assert_eq!(step, Synthesizing);

        let (step, actions) = transition(step, Event::Synthesized);
        assert_eq!(step, Complete);
        assert_eq!(work(&actions), vec![&Action::ReturnAnswer]);
    }

    #[test]
    fn test_empty_plan_skips_execution() {
        let (step, actions) = transition(Planning, planned(0, false, 0));
        assert_eq!(step, Synthesizing);
        assert_eq!(work(&actions), vec![&Action::Synthesize]);
    }

    #[test]
    fn test_non_negotiable_execution_goes_to_synthesis() {
        let (step, _) = transition(Executing, Event::ExecutionComplete { negotiable: false });
        assert_eq!(step, Synthesizing);
    }

    #[test]
    fn test_escalation_is_terminal() {
        let (step, actions) = transition(Negotiating, Event::NegotiationEscalated);
        assert_eq!(step, Escalated);
        assert_eq!(work(&actions), vec![&Action::ReturnOpenQuestions]);

        let (step, actions) = transition(step, Event::Synthesized);
        assert_eq!(step, Failed);
        assert!(matches!(actions[0], Action::Reject { .. }));
    }

    #[test]
    fn test_single_clarification_round() {
        let (step, actions) = transition(Planning, planned(0, true, 0));
        assert_eq!(step, AwaitingClarification);
        assert_eq!(work(&actions), vec![&Action::AwaitClarification]);

        let (step, _) = transition(step, Event::ClarificationReceived);
        assert_eq!(step, Planning);

        // second request is ignored and the returned order is used
        let (step, actions) = transition(step, planned(1, true, 1));
        assert_eq!(step, Executing);
        assert_eq!(work(&actions), vec![&Action::RunExecutors]);
    }

    #[test]
    fn test_fatal_and_cancel_from_active_steps() {
        for step in [Planning, Executing, Negotiating, Synthesizing, AwaitingClarification] {
            let (next, actions) = transition(
                step,
                Event::Fatal {
                    reason: "planner down".to_string(),
                },
            );
            assert_eq!(next, Failed);
            assert!(matches!(actions[0], Action::LogActivity { .. }));

            let (next, _) = transition(step, Event::Cancelled);
            assert_eq!(next, Failed);
        }
    }

    #[test]
    fn test_invalid_transitions_never_panic() {
        let cases = [
            (Initial, Event::Synthesized),
            (Planning, Event::Start),
            (Executing, Event::ClarificationReceived),
            (Complete, Event::Start),
            (Failed, Event::Cancelled),
            (Complete, Event::Fatal { reason: "late".to_string() }),
        ];
        for (step, event) in cases {
            let (next, actions) = transition(step, event);
            assert_eq!(next, Failed);
            assert!(matches!(actions.as_slice(), [Action::Reject { .. }]));
        }
    }
}
