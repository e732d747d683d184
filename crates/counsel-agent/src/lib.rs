//! # counsel-agent
//!
//! Everything that talks to a language model on behalf of the orchestrator:
//!
//! - [`TextGenerator`], the single-shot completion seam, and
//!   [`AnthropicClient`], its HTTP implementation with retry and a per-client
//!   [`CircuitBreaker`]
//! - [`extract_json`], the typed decode step for model output
//! - [`TaskExecutor`] and the startup [`ExecutorRegistry`]
//! - the advising [`capability`] catalog and the generic [`PromptedExecutor`]

mod auth;
pub mod capability;
mod circuit_breaker;
mod client;
mod executor;
mod extract;
mod generator;
mod prompted;
mod types;

pub use auth::get_auth_token;
pub use capability::Capability;
pub use circuit_breaker::{CircuitBreaker, CircuitState};
pub use client::AnthropicClient;
pub use executor::{ExecutorRegistry, TaskExecutor};
pub use extract::extract_json;
pub use generator::TextGenerator;
pub use prompted::{PromptedExecutor, UNSTRUCTURED_CONFIDENCE};
pub use types::*;
