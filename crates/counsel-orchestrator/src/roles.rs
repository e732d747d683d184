//! Proposer and critic roles for a turn

use counsel_agent::capability::{CRITIC, PROPOSERS};
use counsel_core::ExecutorId;

/// Which executors may propose plans and which one critiques them
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NegotiationRoles {
    /// Candidate proposers in order of preference
    pub proposers: Vec<ExecutorId>,
    pub critic: ExecutorId,
}

impl Default for NegotiationRoles {
    fn default() -> Self {
        Self {
            proposers: PROPOSERS.iter().map(|p| ExecutorId::from(*p)).collect(),
            critic: ExecutorId::from(CRITIC),
        }
    }
}

/// Roles resolved against one turn's planned executors
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TurnRoles {
    pub proposer: Option<ExecutorId>,
    pub critic: Option<ExecutorId>,
    /// Used for conflict attribution when a role is not planned
    canonical_proposer: ExecutorId,
    canonical_critic: ExecutorId,
}

impl NegotiationRoles {
    /// Pick the first planned proposer and the critic if it is planned
    pub fn resolve(&self, active: &[ExecutorId]) -> TurnRoles {
        let proposer = self
            .proposers
            .iter()
            .find(|p| active.contains(p))
            .cloned();
        let critic = Some(self.critic.clone()).filter(|c| active.contains(c));
        TurnRoles {
            proposer,
            critic,
            canonical_proposer: self
                .proposers
                .first()
                .cloned()
                .unwrap_or_else(|| ExecutorId::from(PROPOSERS[0])),
            canonical_critic: self.critic.clone(),
        }
    }
}

impl TurnRoles {
    pub fn is_proposer(&self, id: &ExecutorId) -> bool {
        self.proposer.as_ref() == Some(id)
    }

    /// Both roles are planned for this turn
    pub fn pair(&self) -> Option<(&ExecutorId, &ExecutorId)> {
        match (&self.proposer, &self.critic) {
            (Some(p), Some(c)) if p != c => Some((p, c)),
            _ => None,
        }
    }

    /// Executors a proposal-vs-policy conflict is attributed to
    pub fn attribution(&self) -> [ExecutorId; 2] {
        [
            self.proposer
                .clone()
                .unwrap_or_else(|| self.canonical_proposer.clone()),
            self.critic
                .clone()
                .unwrap_or_else(|| self.canonical_critic.clone()),
        ]
    }

    pub fn proposer_or_canonical(&self) -> ExecutorId {
        self.attribution()[0].clone()
    }
}
