//! The text-generation seam
//!
//! Planner, prompted executors and synthesizer only need "prompt in, text
//! out". Tests substitute scripted generators here.

use async_trait::async_trait;
use counsel_core::Result;

/// Single-shot text completion
#[async_trait]
pub trait TextGenerator: Send + Sync {
    /// Complete `prompt` and return the raw response text
    async fn complete(&self, prompt: &str) -> Result<String>;
}
