//! Executor invocation harness
//!
//! Wraps every executor call with the turn's timeout and cancellation token
//! and enforces the output contract. A timeout, a cancellation and an
//! unknown id all come back as an [`ExecutorFailure`], never as a panic or
//! a fatal error.

use counsel_agent::ExecutorRegistry;
use counsel_core::{Blackboard, ExecutorFailure, ExecutorId, ExecutorOutput};
use futures::stream::{self, StreamExt};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::instrument;

pub type Invocation = (ExecutorId, Result<ExecutorOutput, ExecutorFailure>);

#[derive(Debug, Clone)]
pub struct ExecutorHarness {
    registry: ExecutorRegistry,
    timeout: Duration,
    max_parallel: usize,
}

impl ExecutorHarness {
    pub fn new(registry: ExecutorRegistry, timeout: Duration, max_parallel: usize) -> Self {
        Self {
            registry,
            timeout,
            max_parallel: max_parallel.max(1),
        }
    }

    pub fn registry(&self) -> &ExecutorRegistry {
        &self.registry
    }

    /// Invoke one executor against a read-only snapshot
    #[instrument(skip(self, snapshot, cancel), fields(executor = %id))]
    pub async fn invoke(
        &self,
        id: &ExecutorId,
        snapshot: &Blackboard,
        cancel: &CancellationToken,
    ) -> Result<ExecutorOutput, ExecutorFailure> {
        let executor = self.registry.get(id).ok_or_else(|| {
            ExecutorFailure::new(id.clone(), format!("executor '{}' is not registered", id))
        })?;

        let started = std::time::Instant::now();
        let result = tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(ExecutorFailure::cancelled(id.clone())),
            outcome = tokio::time::timeout(self.timeout, executor.execute(snapshot)) => match outcome {
                Ok(result) => result,
                Err(_) => Err(ExecutorFailure::timeout(id.clone(), self.timeout.as_secs())),
            },
        };

        match result {
            Ok(mut output) => {
                if &output.executor_id != id {
                    tracing::warn!(
                        "Executor {} returned output tagged '{}', re-tagging",
                        id,
                        output.executor_id
                    );
                    output.executor_id = id.clone();
                }
                tracing::debug!(
                    "Executor {} finished in {:?} (confidence {:.2})",
                    id,
                    started.elapsed(),
                    output.confidence
                );
                Ok(output)
            }
            Err(mut failure) => {
                if &failure.executor_id != id {
                    failure.executor_id = id.clone();
                }
                tracing::warn!("{}", failure);
                Err(failure)
            }
        }
    }

    /// Run a stage of independent executors, at most `max_parallel` at once
    ///
    /// Results come back in the stage's listed order whatever order they
    /// finished in.
    pub async fn run_stage(
        &self,
        stage: &[ExecutorId],
        snapshot: &Blackboard,
        cancel: &CancellationToken,
    ) -> Vec<Invocation> {
        if let [only] = stage {
            return vec![(only.clone(), self.invoke(only, snapshot, cancel).await)];
        }

        let mut finished: Vec<(usize, Invocation)> = stream::iter(stage.iter().enumerate())
            .map(|(position, id)| async move {
                (position, (id.clone(), self.invoke(id, snapshot, cancel).await))
            })
            .buffer_unordered(self.max_parallel)
            .collect()
            .await;

        finished.sort_by_key(|(position, _)| *position);
        finished.into_iter().map(|(_, invocation)| invocation).collect()
    }
}
