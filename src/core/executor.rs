//! Stage executor: one bounded agent invocation, classified.
//!
//! The executor owns the time budget and the cancellation wait point.
//! Agent-level problems never cross its boundary as errors; they come
//! back as a classified [`StageResult`]. Only registry misconfiguration,
//! unrecoverable resource failures, and cancellation surface as
//! [`ExecutorError`]. Retry policy lives in the coordinator, which keeps
//! this unit side-effect free apart from the single outbound call.

use std::sync::Arc;
use std::time::Instant;

use thiserror::Error;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::agents::AgentError;
use crate::domain::{AgentReport, StageName, StageResult, StageStatus, StageTask};

use super::registry::{AgentRegistry, RegistryError};

/// A summary shorter than this counts as near-empty, a self-reported
/// low-confidence marker.
const NEAR_EMPTY_SUMMARY_CHARS: usize = 24;

/// Replies self-reporting confidence below this are low-confidence.
const CONFIDENCE_FLOOR: f64 = 0.4;

/// Failures that cross the executor boundary. Everything here is fatal
/// to the run; ordinary agent trouble becomes a `StageResult` instead.
#[derive(Debug, Error)]
pub enum ExecutorError {
    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error("resource failure: {0}")]
    Resource(String),

    #[error("run cancelled")]
    Cancelled,
}

/// Invokes one agent per task with a bounded time budget.
pub struct StageExecutor {
    registry: Arc<AgentRegistry>,
}

impl StageExecutor {
    pub fn new(registry: Arc<AgentRegistry>) -> Self {
        Self { registry }
    }

    /// Run a single stage attempt.
    pub async fn run(
        &self,
        task: &StageTask,
        cancel: &CancellationToken,
    ) -> Result<StageResult, ExecutorError> {
        let registered = self.registry.lookup(task.stage)?;
        let budget = registered.descriptor.timeout();
        let agent_name = registered.descriptor.name.clone();

        debug!(
            stage = %task.stage,
            attempt = task.attempt,
            agent = %agent_name,
            timeout_s = budget.as_secs(),
            "Invoking agent"
        );

        let started = Instant::now();

        let outcome = tokio::select! {
            _ = cancel.cancelled() => return Err(ExecutorError::Cancelled),
            outcome = timeout(budget, registered.agent.invoke(task)) => outcome,
        };

        let duration_ms = started.elapsed().as_millis() as u64;

        let result = match outcome {
            // Elapsed past the budget: infrastructure, not a bad answer
            Err(_) => StageResult::new(task.stage, task.attempt, StageStatus::Timeout, String::new())
                .with_diagnostic(format!(
                    "agent '{}' exceeded its {}s budget",
                    agent_name,
                    budget.as_secs()
                ))
                .with_duration(duration_ms),

            Ok(Err(AgentError::Transport(detail))) => {
                StageResult::new(task.stage, task.attempt, StageStatus::Timeout, String::new())
                    .with_diagnostic(detail)
                    .with_duration(duration_ms)
            }

            Ok(Err(AgentError::Resource(detail))) => {
                return Err(ExecutorError::Resource(detail));
            }

            Ok(Ok(raw)) => classify(task.stage, task.attempt, raw).with_duration(duration_ms),
        };

        Ok(result)
    }
}

/// Classify a raw agent reply against the output contract.
pub fn classify(stage: StageName, attempt: u32, raw: String) -> StageResult {
    match AgentReport::parse(&raw) {
        Err(e) => StageResult::new(stage, attempt, StageStatus::Failed, raw)
            .with_diagnostic(format!("reply failed schema validation: {}", e)),

        Ok(report) => {
            let near_empty = report.summary.trim().len() < NEAR_EMPTY_SUMMARY_CHARS;
            let under_floor = report
                .confidence
                .map(|c| c < CONFIDENCE_FLOOR)
                .unwrap_or(false);

            if near_empty || under_floor {
                let marker = if near_empty {
                    "near-empty summary".to_string()
                } else {
                    format!("confidence {:.2} below floor", report.confidence.unwrap_or(0.0))
                };
                StageResult::new(stage, attempt, StageStatus::LowConfidence, raw)
                    .with_diagnostic(marker)
            } else {
                StageResult::new(stage, attempt, StageStatus::Ok, raw)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::time::Duration;

    use crate::agents::StageAgent;
    use crate::core::registry::AgentDescriptor;
    use crate::domain::StagePayload;

    struct ScriptedAgent {
        reply: Result<String, fn() -> AgentError>,
        delay: Duration,
    }

    #[async_trait]
    impl StageAgent for ScriptedAgent {
        fn name(&self) -> &str {
            "scripted"
        }

        async fn invoke(&self, _task: &StageTask) -> Result<String, AgentError> {
            tokio::time::sleep(self.delay).await;
            match &self.reply {
                Ok(raw) => Ok(raw.clone()),
                Err(make) => Err(make()),
            }
        }
    }

    fn task(stage: StageName) -> StageTask {
        StageTask {
            stage,
            payload: StagePayload {
                request: "analyze".to_string(),
                dataset_path: None,
                upstream: Default::default(),
                directive: None,
            },
            attempt: 1,
        }
    }

    fn executor_with(agent: ScriptedAgent, timeout_seconds: u64) -> StageExecutor {
        let mut registry = AgentRegistry::new();
        registry
            .register(
                AgentDescriptor {
                    name: "scripted".to_string(),
                    stage: StageName::Analysis,
                    role: "test".to_string(),
                    model: "test".to_string(),
                    timeout_seconds,
                    max_retries: 0,
                },
                Arc::new(agent),
            )
            .unwrap();
        StageExecutor::new(Arc::new(registry))
    }

    fn good_reply() -> String {
        serde_json::json!({
            "summary": "The dataset shows a clear downward price trend.",
            "confidence": 0.9
        })
        .to_string()
    }

    #[tokio::test]
    async fn test_ok_classification() {
        let executor = executor_with(
            ScriptedAgent {
                reply: Ok(good_reply()),
                delay: Duration::ZERO,
            },
            30,
        );

        let result = executor
            .run(&task(StageName::Analysis), &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(result.status, StageStatus::Ok);
    }

    #[tokio::test]
    async fn test_schema_mismatch_is_failed() {
        let executor = executor_with(
            ScriptedAgent {
                reply: Ok("definitely not json".to_string()),
                delay: Duration::ZERO,
            },
            30,
        );

        let result = executor
            .run(&task(StageName::Analysis), &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(result.status, StageStatus::Failed);
        assert!(result.diagnostic.unwrap().contains("schema validation"));
    }

    #[tokio::test]
    async fn test_transport_error_is_timeout_status() {
        let executor = executor_with(
            ScriptedAgent {
                reply: Err(|| AgentError::Transport("connection refused".to_string())),
                delay: Duration::ZERO,
            },
            30,
        );

        let result = executor
            .run(&task(StageName::Analysis), &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(result.status, StageStatus::Timeout);
    }

    #[tokio::test]
    async fn test_resource_error_propagates() {
        let executor = executor_with(
            ScriptedAgent {
                reply: Err(|| AgentError::Resource("dataset unreadable".to_string())),
                delay: Duration::ZERO,
            },
            30,
        );

        let err = executor
            .run(&task(StageName::Analysis), &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, ExecutorError::Resource(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_budget_exceeded_is_timeout() {
        let executor = executor_with(
            ScriptedAgent {
                reply: Ok(good_reply()),
                delay: Duration::from_secs(120),
            },
            1,
        );

        let result = executor
            .run(&task(StageName::Analysis), &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(result.status, StageStatus::Timeout);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancellation_observed_at_wait_point() {
        let executor = executor_with(
            ScriptedAgent {
                reply: Ok(good_reply()),
                delay: Duration::from_secs(3600),
            },
            7200,
        );

        let cancel = CancellationToken::new();
        let child = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            child.cancel();
        });

        let err = executor
            .run(&task(StageName::Analysis), &cancel)
            .await
            .unwrap_err();
        assert!(matches!(err, ExecutorError::Cancelled));
    }

    #[tokio::test]
    async fn test_unknown_stage() {
        let registry = AgentRegistry::new();
        let executor = StageExecutor::new(Arc::new(registry));

        let err = executor
            .run(&task(StageName::Discovery), &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ExecutorError::Registry(RegistryError::UnknownStage(_))
        ));
    }

    #[test]
    fn test_low_confidence_markers() {
        let short = serde_json::json!({"summary": "ok", "confidence": 0.95}).to_string();
        let result = classify(StageName::Statistics, 1, short);
        assert_eq!(result.status, StageStatus::LowConfidence);

        let shaky = serde_json::json!({
            "summary": "The correlation estimate is too noisy to trust.",
            "confidence": 0.2
        })
        .to_string();
        let result = classify(StageName::Statistics, 1, shaky);
        assert_eq!(result.status, StageStatus::LowConfidence);

        let confident = serde_json::json!({
            "summary": "Selling price correlates strongly with year.",
        })
        .to_string();
        let result = classify(StageName::Statistics, 1, confident);
        assert_eq!(result.status, StageStatus::Ok);
    }
}
