//! Configuration management for Counsel
//!
//! Repository-level settings live in `.counsel/config.toml`: the negotiation
//! budget, executor timeouts, model selection and session storage.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::{CounselError, Result};

/// Fatal collaborator calls are never retried more than this many times
pub const MAX_COLLABORATOR_RETRIES: u32 = 1;

/// Repository-level Counsel configuration
///
/// Loaded from `.counsel/config.toml` in the working directory.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CounselConfig {
    /// Proposal + critique budget
    #[serde(default)]
    pub negotiation: NegotiationSettings,

    /// Executor invocation limits
    #[serde(default)]
    pub execution: ExecutionSettings,

    /// Model selection
    #[serde(default)]
    pub models: ModelSettings,

    /// Conversation persistence
    #[serde(default)]
    pub session: SessionSettings,
}

/// Negotiation loop settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NegotiationSettings {
    /// Re-proposal rounds before escalating to the user
    #[serde(default = "default_max_iterations")]
    pub max_iterations: u32,
}

/// Executor invocation settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionSettings {
    /// Per-executor timeout in seconds
    #[serde(default = "default_executor_timeout_secs")]
    pub executor_timeout_secs: u64,

    /// Upper bound on executors running at once inside a parallel stage
    #[serde(default = "default_max_parallel")]
    pub max_parallel: usize,

    /// Automatic retries for planner and synthesis calls (capped at 1)
    #[serde(default = "default_collaborator_retries")]
    pub collaborator_retries: u32,
}

/// Model configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelSettings {
    /// Model used for planning and synthesis
    #[serde(default = "default_coordinator_model")]
    pub coordinator: String,

    /// Model used by domain executors
    #[serde(default = "default_agent_model")]
    pub agent: String,

    /// Environment variable containing the API key
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,

    /// Maximum tokens per completion
    #[serde(default = "default_max_tokens")]
    pub max_tokens: usize,
}

/// Session store configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionSettings {
    /// Directory holding one JSON document per conversation
    #[serde(default = "default_session_dir")]
    pub dir: PathBuf,

    /// Prior messages loaded into each turn
    #[serde(default = "default_history_window")]
    pub history_window: usize,
}

// Default value providers
fn default_max_iterations() -> u32 {
    3
}

fn default_executor_timeout_secs() -> u64 {
    180
}

fn default_max_parallel() -> usize {
    4
}

fn default_collaborator_retries() -> u32 {
    1
}

fn default_coordinator_model() -> String {
    "claude-sonnet-4-5-20250929".to_string()
}

fn default_agent_model() -> String {
    "claude-haiku-4-5-20251001".to_string()
}

fn default_api_key_env() -> String {
    "ANTHROPIC_API_KEY".to_string()
}

fn default_max_tokens() -> usize {
    4096
}

fn default_session_dir() -> PathBuf {
    PathBuf::from(".counsel/sessions")
}

fn default_history_window() -> usize {
    10
}

impl CounselConfig {
    /// Load configuration from `.counsel/config.toml` or use defaults
    pub fn load_or_default(root: &Path) -> Result<Self> {
        let config_path = root.join(".counsel/config.toml");

        if config_path.exists() {
            let content = std::fs::read_to_string(&config_path)?;
            let config: Self = toml::from_str(&content).map_err(|e| {
                CounselError::Config(format!("Failed to parse {}: {}", config_path.display(), e))
            })?;
            config.validate()?;
            Ok(config)
        } else {
            Ok(Self::default())
        }
    }

    /// Write default configuration to `.counsel/config.toml`
    pub fn write_default(root: &Path) -> Result<PathBuf> {
        let config_dir = root.join(".counsel");
        std::fs::create_dir_all(&config_dir)?;

        let config_path = config_dir.join("config.toml");
        let content = toml::to_string_pretty(&Self::default())
            .map_err(|e| CounselError::Config(format!("Failed to serialize config: {}", e)))?;
        std::fs::write(&config_path, content)?;
        Ok(config_path)
    }

    /// Reject settings that would break termination or concurrency bounds
    pub fn validate(&self) -> Result<()> {
        if self.execution.executor_timeout_secs == 0 {
            return Err(CounselError::Config(
                "execution.executor_timeout_secs must be positive".to_string(),
            ));
        }
        if self.execution.max_parallel == 0 {
            return Err(CounselError::Config(
                "execution.max_parallel must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    pub fn executor_timeout(&self) -> Duration {
        Duration::from_secs(self.execution.executor_timeout_secs)
    }

    /// Retries for fatal collaborators, never more than one
    pub fn collaborator_retries(&self) -> u32 {
        self.execution
            .collaborator_retries
            .min(MAX_COLLABORATOR_RETRIES)
    }
}

impl Default for NegotiationSettings {
    fn default() -> Self {
        Self {
            max_iterations: default_max_iterations(),
        }
    }
}

impl Default for ExecutionSettings {
    fn default() -> Self {
        Self {
            executor_timeout_secs: default_executor_timeout_secs(),
            max_parallel: default_max_parallel(),
            collaborator_retries: default_collaborator_retries(),
        }
    }
}

impl Default for ModelSettings {
    fn default() -> Self {
        Self {
            coordinator: default_coordinator_model(),
            agent: default_agent_model(),
            api_key_env: default_api_key_env(),
            max_tokens: default_max_tokens(),
        }
    }
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            dir: default_session_dir(),
            history_window: default_history_window(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = CounselConfig::default();
        assert_eq!(config.negotiation.max_iterations, 3);
        assert_eq!(config.executor_timeout(), Duration::from_secs(180));
        assert_eq!(config.session.history_window, 10);
    }

    #[test]
    fn test_missing_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = CounselConfig::load_or_default(dir.path()).unwrap();
        assert_eq!(config.execution.max_parallel, 4);
    }

    #[test]
    fn test_write_then_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = CounselConfig::write_default(dir.path()).unwrap();
        assert!(path.ends_with(".counsel/config.toml"));

        let loaded = CounselConfig::load_or_default(dir.path()).unwrap();
        assert_eq!(loaded.models.api_key_env, "ANTHROPIC_API_KEY");
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join(".counsel")).unwrap();
        std::fs::write(
            dir.path().join(".counsel/config.toml"),
            "[negotiation]\nmax_iterations = 2\n\n[execution]\ncollaborator_retries = 5\n",
        )
        .unwrap();

        let config = CounselConfig::load_or_default(dir.path()).unwrap();
        assert_eq!(config.negotiation.max_iterations, 2);
        assert_eq!(config.execution.executor_timeout_secs, 180);
        assert_eq!(config.collaborator_retries(), 1);
    }

    #[test]
    fn test_invalid_values_rejected() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join(".counsel")).unwrap();
        std::fs::write(
            dir.path().join(".counsel/config.toml"),
            "[execution]\nmax_parallel = 0\n",
        )
        .unwrap();

        let result = CounselConfig::load_or_default(dir.path());
        assert!(matches!(result, Err(CounselError::Config(_))));
    }
}
