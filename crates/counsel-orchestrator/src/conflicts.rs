//! Conflict detection over a blackboard snapshot
//!
//! `detect` is pure: the same blackboard always yields the same conflicts,
//! and only the three [`ConflictType`] categories are ever produced.
//! Rules, in order, each emitted at most once:
//!
//! 1. `HARD_VIOLATION` when a current output carries a hard constraint
//! 2. `HIGH_RISK` when a current output or plan option carries a high risk
//! 3. `TRADE_OFF` when more than one plan option is on the table

use crate::roles::TurnRoles;
use counsel_core::{Blackboard, Conflict, ConflictType, ExecutorOutput, ResolutionOption};

/// Stateless detector bound to a turn's proposer/critic attribution
#[derive(Debug, Clone)]
pub struct ConflictDetector {
    roles: TurnRoles,
}

impl ConflictDetector {
    pub fn new(roles: TurnRoles) -> Self {
        Self { roles }
    }

    pub fn detect(&self, board: &Blackboard) -> Vec<Conflict> {
        let outputs = sorted_outputs(board);
        let mut conflicts = Vec::new();

        let hard: Vec<String> = outputs
            .iter()
            .flat_map(|o| o.constraints.iter())
            .filter(|c| c.hard)
            .map(|c| match &c.citation {
                Some(citation) => format!("{} ({})", c.description, citation),
                None => c.description.clone(),
            })
            .collect();
        if !hard.is_empty() {
            conflicts.push(Conflict::new(
                ConflictType::HardViolation,
                self.roles.attribution(),
                format!("Hard constraint violated: {}", hard.join("; ")),
            ));
        }

        let high: Vec<String> = outputs
            .iter()
            .flat_map(|o| o.risks.iter())
            .chain(board.plan_options().iter().flat_map(|p| p.risks.iter()))
            .filter(|r| r.is_high())
            .map(|r| format!("{}: {}", r.kind, r.description))
            .collect();
        if !high.is_empty() {
            conflicts.push(Conflict::new(
                ConflictType::HighRisk,
                self.roles.attribution(),
                format!("High risk identified: {}", high.join("; ")),
            ));
        }

        let plans = board.plan_options();
        if plans.len() > 1 {
            let options = plans
                .iter()
                .enumerate()
                .map(|(i, plan)| ResolutionOption {
                    label: format!("Option {}", i + 1),
                    summary: plan.summary(),
                    plan_index: Some(i),
                })
                .collect();
            conflicts.push(
                Conflict::new(
                    ConflictType::TradeOff,
                    [self.roles.proposer_or_canonical()],
                    format!("{} viable plans; the student must choose", plans.len()),
                )
                .with_options(options),
            );
        }

        conflicts
    }
}

/// Whether any conflict warrants negotiation
pub fn has_blocking(conflicts: &[Conflict]) -> bool {
    conflicts.iter().any(|c| c.conflict_type.is_blocking())
}

fn sorted_outputs(board: &Blackboard) -> Vec<&ExecutorOutput> {
    let mut outputs: Vec<&ExecutorOutput> = board.outputs().values().collect();
    outputs.sort_by(|a, b| a.executor_id.cmp(&b.executor_id));
    outputs
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::roles::NegotiationRoles;
    use counsel_core::{
        Constraint, ConstraintSource, ExecutorId, PlanOption, Profile, Risk, SemesterPlan,
        Severity,
    };

    fn id(s: &str) -> ExecutorId {
        ExecutorId::from(s)
    }

    fn board(order: &[&str]) -> Blackboard {
        let mut board = Blackboard::new("Can I overload?", Profile::new(), Vec::new());
        board
            .set_plan(Some("overload".to_string()), order.iter().map(|s| id(s)).collect())
            .unwrap();
        board
    }

    fn detector(board: &Blackboard) -> ConflictDetector {
        ConflictDetector::new(NegotiationRoles::default().resolve(board.active_executors()))
    }

    fn plan(term: &str) -> PlanOption {
        PlanOption::new(vec![SemesterPlan::new(term, vec!["15-213".to_string()])], "x")
    }

    #[test]
    fn test_empty_board_has_no_conflicts() {
        let board = board(&[]);
        assert!(detector(&board).detect(&board).is_empty());
    }

    #[test]
    fn test_all_rules_fire_in_order() {
        let mut board = board(&["academic_planning", "policy_compliance"]);
        board.record_output(
            ExecutorOutput::new(id("policy_compliance"), "no", 0.9)
                .with_constraint(
                    Constraint::hard(ConstraintSource::Policy, "max 54 units")
                        .with_citation("Overload policy"),
                )
                .with_constraint(Constraint::hard(ConstraintSource::Policy, "GPA 3.0 required"))
                .with_constraint(Constraint::soft(ConstraintSource::Student, "prefers mornings"))
                .with_risk(Risk::new("overload_risk", Severity::High, "60 units")),
        );
        board.replace_plan_options(vec![plan("Fall"), plan("Spring")]);

        let conflicts = detector(&board).detect(&board);
        let types: Vec<_> = conflicts.iter().map(|c| c.conflict_type).collect();
        assert_eq!(
            types,
            vec![ConflictType::HardViolation, ConflictType::HighRisk, ConflictType::TradeOff]
        );

        let hard = &conflicts[0];
        assert!(hard.description.contains("max 54 units (Overload policy)"));
        assert!(hard.description.contains("GPA 3.0 required"));
        assert!(!hard.description.contains("mornings"));
        assert_eq!(
            hard.affected_executors.iter().cloned().collect::<Vec<_>>(),
            vec![id("academic_planning"), id("policy_compliance")]
        );

        let trade = &conflicts[2];
        assert_eq!(trade.options.len(), 2);
        assert_eq!(trade.options[1].plan_index, Some(1));
    }

    #[test]
    fn test_detection_is_idempotent() {
        let mut board = board(&["academic_planning", "policy_compliance", "course_scheduling"]);
        for (name, kind) in [("policy_compliance", "a"), ("course_scheduling", "b")] {
            board.record_output(
                ExecutorOutput::new(id(name), "r", 0.8)
                    .with_risk(Risk::new(kind, Severity::High, "risky")),
            );
        }
        let detector = detector(&board);
        assert_eq!(detector.detect(&board), detector.detect(&board));
    }

    #[test]
    fn test_two_plans_only_trade_off() {
        let mut board = board(&["academic_planning"]);
        board.record_output(
            ExecutorOutput::new(id("academic_planning"), "two routes", 0.8)
                .with_risk(Risk::new("workload", Severity::Medium, "heavy spring")),
        );
        board.replace_plan_options(vec![plan("Fall"), plan("Spring")]);

        let conflicts = detector(&board).detect(&board);
        assert_eq!(conflicts.len(), 1);
        assert_eq!(conflicts[0].conflict_type, ConflictType::TradeOff);
        assert!(!has_blocking(&conflicts));
    }

    #[test]
    fn test_high_risk_inside_plan_option() {
        let mut board = board(&["academic_planning"]);
        board.replace_plan_options(vec![
            plan("Fall").with_risk(Risk::new("overload_risk", Severity::High, "63 units"))
        ]);
        let conflicts = detector(&board).detect(&board);
        assert_eq!(conflicts.len(), 1);
        assert_eq!(conflicts[0].conflict_type, ConflictType::HighRisk);
        assert!(has_blocking(&conflicts));
    }

    #[test]
    fn test_replaced_output_no_longer_counts() {
        let mut board = board(&["academic_planning", "policy_compliance"]);
        board.record_output(
            ExecutorOutput::new(id("policy_compliance"), "no", 0.9)
                .with_constraint(Constraint::hard(ConstraintSource::Policy, "max 54 units")),
        );
        board.record_output(ExecutorOutput::new(id("policy_compliance"), "fine now", 0.9));

        assert_eq!(board.constraints().len(), 1);
        assert!(detector(&board).detect(&board).is_empty());
    }
}
