//! Task executor interface and the startup registry
//!
//! An executor reads a blackboard snapshot and returns exactly one
//! [`ExecutorOutput`] tagged with its own id, or an [`ExecutorFailure`].
//! It never mutates the blackboard; the orchestrator merges the result.

use async_trait::async_trait;
use counsel_core::{Blackboard, ExecutorFailure, ExecutorId, ExecutorOutput};
use std::collections::BTreeMap;
use std::sync::Arc;

/// A domain task handler (requirements, scheduling, policy, planning, ...)
#[async_trait]
pub trait TaskExecutor: Send + Sync {
    fn id(&self) -> &ExecutorId;

    /// Produce a result for the current turn
    ///
    /// `snapshot.feedback()` is non-empty when negotiation re-invokes a
    /// proposer with the critic's objections.
    async fn execute(&self, snapshot: &Blackboard) -> Result<ExecutorOutput, ExecutorFailure>;
}

/// Static `ExecutorId -> executor` map known at startup
#[derive(Clone, Default)]
pub struct ExecutorRegistry {
    executors: BTreeMap<ExecutorId, Arc<dyn TaskExecutor>>,
}

impl ExecutorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an executor, replacing any previous one with the same id
    pub fn register(mut self, executor: Arc<dyn TaskExecutor>) -> Self {
        let id = executor.id().clone();
        if self.executors.insert(id.clone(), executor).is_some() {
            tracing::warn!("Executor {} registered twice; keeping the later one", id);
        }
        self
    }

    pub fn get(&self, id: &ExecutorId) -> Option<Arc<dyn TaskExecutor>> {
        self.executors.get(id).cloned()
    }

    pub fn contains(&self, id: &ExecutorId) -> bool {
        self.executors.contains_key(id)
    }

    /// Registered ids in sorted order
    pub fn ids(&self) -> Vec<ExecutorId> {
        self.executors.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.executors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.executors.is_empty()
    }
}

impl std::fmt::Debug for ExecutorRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecutorRegistry")
            .field("executors", &self.executors.keys().collect::<Vec<_>>())
            .finish()
    }
}
