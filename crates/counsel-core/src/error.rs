//! Unified error types for Counsel

use crate::types::ExecutorId;
use thiserror::Error;

/// Unified error type for all Counsel operations
#[derive(Error, Debug)]
pub enum CounselError {
    // Collaborator errors (fatal for the turn)
    #[error("Planner failed: {0}")]
    Planner(String),

    #[error("Synthesis failed: {0}")]
    Synthesis(String),

    // Executor errors (non-fatal, recorded on the blackboard)
    #[error(transparent)]
    Executor(#[from] ExecutorFailure),

    #[error("Unknown executor: {0}")]
    UnknownExecutor(String),

    // Contract errors
    #[error("Protocol violation: {0}")]
    ProtocolViolation(String),

    #[error("Invalid workflow transition: {0}")]
    InvalidTransition(String),

    // Text generation errors
    #[error("API error: {0}")]
    Api(String),

    #[error("API rate limit: {0}")]
    ApiLimit(String),

    #[error("Authentication error: {0}")]
    Auth(String),

    // Session errors
    #[error("Session store error: {0}")]
    Session(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Turn cancelled")]
    Cancelled,

    // I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    // Generic
    #[error("{0}")]
    Other(String),
}

impl CounselError {
    /// Whether a fatal collaborator call may be attempted again.
    ///
    /// Cancellation and contract violations are never retried.
    pub fn is_retryable(&self) -> bool {
        !matches!(
            self,
            CounselError::Cancelled
                | CounselError::ProtocolViolation(_)
                | CounselError::InvalidTransition(_)
                | CounselError::Auth(_)
                | CounselError::Config(_)
        )
    }
}

/// Result type alias using CounselError
pub type Result<T> = std::result::Result<T, CounselError>;

/// Why an executor did not produce a result
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureCause {
    /// The executor returned an error
    Error(String),
    /// The executor did not answer within the caller-imposed timeout
    Timeout { after_secs: u64 },
    /// The turn was cancelled while the executor was running
    Cancelled,
}

impl std::fmt::Display for FailureCause {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Error(msg) => write!(f, "{}", msg),
            Self::Timeout { after_secs } => write!(f, "timed out after {}s", after_secs),
            Self::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// Failure of a single task executor
///
/// Timeouts are reported through the same type so the orchestrator
/// handles both identically.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Executor {executor_id} failed: {cause}")]
pub struct ExecutorFailure {
    pub executor_id: ExecutorId,
    pub cause: FailureCause,
}

impl ExecutorFailure {
    pub fn new(executor_id: ExecutorId, message: impl Into<String>) -> Self {
        Self {
            executor_id,
            cause: FailureCause::Error(message.into()),
        }
    }

    pub fn timeout(executor_id: ExecutorId, after_secs: u64) -> Self {
        Self {
            executor_id,
            cause: FailureCause::Timeout { after_secs },
        }
    }

    pub fn cancelled(executor_id: ExecutorId) -> Self {
        Self {
            executor_id,
            cause: FailureCause::Cancelled,
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self.cause, FailureCause::Timeout { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_executor_failure_display() {
        let failure = ExecutorFailure::timeout(ExecutorId::from("policy_compliance"), 180);
        assert_eq!(
            failure.to_string(),
            "Executor policy_compliance failed: timed out after 180s"
        );
        assert!(failure.is_timeout());
    }

    #[test]
    fn test_executor_failure_converts_into_counsel_error() {
        let err: CounselError = ExecutorFailure::new(ExecutorId::from("x"), "boom").into();
        assert!(matches!(err, CounselError::Executor(_)));
        assert!(err.to_string().contains("boom"));
    }

    #[test]
    fn test_retryable_classification() {
        assert!(CounselError::Api("503".to_string()).is_retryable());
        assert!(CounselError::Planner("bad".to_string()).is_retryable());
        assert!(!CounselError::Cancelled.is_retryable());
        assert!(!CounselError::Auth("missing".to_string()).is_retryable());
    }
}
