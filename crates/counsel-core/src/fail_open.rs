//! Fail-open utilities for infrastructure work
//!
//! Persisting a finished turn or its trace must never turn a good answer
//! into an error. Wrap such calls here: failures are logged through
//! `tracing::warn!` and swallowed.
//!
//! Never wrap executor, planner or synthesis calls; those have their own
//! failure semantics in the orchestrator.

use std::future::Future;
use std::time::Duration;
use tracing::warn;

use crate::Result;

/// Await `operation`, logging and discarding any error
///
/// ```no_run
/// use counsel_core::fail_open::fail_open;
/// use counsel_core::Result;
///
/// async fn save_turn() -> Result<()> {
///     Ok(())
/// }
///
/// async fn example() {
///     let saved = fail_open("session::save_turn", save_turn()).await;
///     assert!(saved.is_some());
/// }
/// ```
pub async fn fail_open<T>(operation_name: &str, operation: impl Future<Output = Result<T>>) -> Option<T> {
    match operation.await {
        Ok(value) => Some(value),
        Err(e) => {
            warn!("{} failed (fail-open): {}", operation_name, e);
            None
        }
    }
}

/// Like [`fail_open`] but retries with a linearly growing delay
///
/// Attempt `n` waits `backoff * n` before the next one.
pub async fn fail_open_with_retries<F, Fut, T>(
    operation_name: &str,
    mut make_attempt: F,
    max_attempts: usize,
    backoff: Duration,
) -> Option<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    for attempt in 1..=max_attempts {
        match make_attempt().await {
            Ok(value) => return Some(value),
            Err(e) if attempt == max_attempts => {
                warn!(
                    "{} failed after {} attempts (fail-open): {}",
                    operation_name, max_attempts, e
                );
            }
            Err(e) => {
                warn!(
                    "{} failed (attempt {}/{}): {}",
                    operation_name, attempt, max_attempts, e
                );
                tokio::time::sleep(backoff * attempt as u32).await;
            }
        }
    }
    None
}
