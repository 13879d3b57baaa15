//! Agent interfaces for external inference capabilities.
//!
//! Each workflow stage is served by exactly one [`StageAgent`]. The
//! executor owns timeout enforcement and response classification; agents
//! only perform the outbound call and raise [`AgentError`] for problems
//! on their side of the boundary.

pub mod dataset;
pub mod ollama;

use async_trait::async_trait;
use thiserror::Error;

use crate::domain::StageTask;

pub use dataset::{DatasetError, DatasetProfile, DatasetReader};
pub use ollama::{OllamaAgent, OllamaClient};

/// Failures an agent can raise across the invocation boundary.
///
/// Transport failures are treated as retryable infrastructure problems.
/// Resource failures (an unreadable or missing dataset) are unrecoverable
/// and fail the whole run.
#[derive(Debug, Error)]
pub enum AgentError {
    #[error("transport failure: {0}")]
    Transport(String),

    #[error("resource failure: {0}")]
    Resource(String),
}

/// One external inference capability, bound to a single stage.
#[async_trait]
pub trait StageAgent: Send + Sync {
    /// Agent identity as registered
    fn name(&self) -> &str;

    /// Execute the stage task and return the raw reply text.
    ///
    /// Implementations must not retry internally; the coordinator owns
    /// retry policy.
    async fn invoke(&self, task: &StageTask) -> Result<String, AgentError>;
}
