//! The run state machine.
//!
//! Sequences PLANNING through the planned stages to DONE, with FAILED
//! reachable from anywhere. The coordinator owns retry and fallback
//! policy; it prefers degraded completion over aborting, so the user
//! always gets a final artifact. Full diagnostics go to the append-only
//! event log, which is the operator channel, not the client one.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

use crate::domain::{
    Event, EventType, FinalArtifact, RunContext, StageName, StageStatus, StageTask,
    WorkflowRequest,
};
use crate::report::ReportRenderer;

use super::aggregator::{Aggregator, Termination};
use super::event_store::EventStore;
use super::executor::{ExecutorError, StageExecutor};
use super::plan::Plan;
use super::registry::AgentRegistry;

/// Why a run left the stage loop without reaching DONE.
enum Failure {
    /// An essential stage exhausted its retries
    EssentialStage(StageName),

    /// Registry misconfiguration or unrecoverable resource error
    Fatal(String),

    /// The run-level cancellation signal fired
    Cancelled,
}

/// How one stage attempt resolves within the state machine.
enum StageVerdict {
    Advance,
    Retry { directive: Option<String> },
    AcceptDegraded,
    Abandon,
    FailRun,
}

/// Coordinates a fixed team of stage agents. Invisible to the end user:
/// callers receive only the aggregated artifact.
pub struct Coordinator {
    registry: Arc<AgentRegistry>,
    executor: StageExecutor,
    runs_dir: PathBuf,
    renderer: Option<ReportRenderer>,
}

impl Coordinator {
    pub fn new(registry: Arc<AgentRegistry>, runs_dir: PathBuf) -> Self {
        Self {
            executor: StageExecutor::new(registry.clone()),
            registry,
            runs_dir,
            renderer: None,
        }
    }

    /// Attach a report renderer, invoked once per run after aggregation.
    pub fn with_renderer(mut self, renderer: ReportRenderer) -> Self {
        self.renderer = Some(renderer);
        self
    }

    /// Execute a workflow run to termination and return its artifact.
    #[instrument(skip(self, request, cancel), fields(run_id = tracing::field::Empty))]
    pub async fn run(
        &self,
        request: WorkflowRequest,
        cancel: CancellationToken,
    ) -> Result<FinalArtifact> {
        let run_id = Uuid::new_v4();
        tracing::Span::current().record("run_id", tracing::field::display(run_id));
        info!(%run_id, "Starting workflow run");

        let store = EventStore::open(&self.runs_dir, run_id).await?;
        let mut ctx = RunContext::new(run_id, request);

        let request_text = ctx.request().text.clone();
        self.log(
            &store,
            &mut ctx,
            Event::new(run_id, EventType::RunStarted, request_text),
        )
        .await?;

        let plan = Plan::for_request(ctx.request());
        store.store_plan(&plan).await?;
        self.log(
            &store,
            &mut ctx,
            Event::new(run_id, EventType::PlanBuilt, plan.describe()),
        )
        .await?;
        for skip in plan.skipped() {
            self.log(
                &store,
                &mut ctx,
                Event::new(run_id, EventType::StageSkipped, skip.reason.clone())
                    .with_stage(skip.stage),
            )
            .await?;
        }

        let failure = self.drive(&store, &mut ctx, &plan, &cancel).await?;

        let termination = match &failure {
            None => Termination::Done,
            Some(_) => Termination::Failed,
        };

        let terminal_event = match &failure {
            None => Event::new(run_id, EventType::RunCompleted, "workflow reached DONE"),
            Some(Failure::Cancelled) => {
                Event::new(run_id, EventType::RunCancelled, "cancellation signal observed")
            }
            Some(Failure::EssentialStage(stage)) => Event::new(
                run_id,
                EventType::RunFailed,
                format!("essential stage '{}' exhausted its retries", stage),
            ),
            Some(Failure::Fatal(detail)) => {
                Event::new(run_id, EventType::RunFailed, detail.clone())
            }
        };
        self.log(&store, &mut ctx, terminal_event).await?;

        let mut artifact = Aggregator::aggregate(run_id, &plan, ctx.results(), termination);

        // Rendering failure degrades to the in-memory artifact
        if let Some(renderer) = &self.renderer {
            match renderer.render(&artifact) {
                Ok(path) => {
                    self.log(
                        &store,
                        &mut ctx,
                        Event::new(run_id, EventType::ReportRendered, path.display().to_string()),
                    )
                    .await?;
                    artifact.report_path = Some(path);
                }
                Err(e) => {
                    warn!(%run_id, error = %e, "Report rendering failed");
                    self.log(
                        &store,
                        &mut ctx,
                        Event::new(run_id, EventType::ReportFailed, e.to_string()),
                    )
                    .await?;
                }
            }
        }

        info!(%run_id, outcome = %artifact.outcome, "Workflow run terminated");
        Ok(artifact)
    }

    /// Walk the planned stages; returns the failure that stopped the run,
    /// or `None` when every planned stage was resolved.
    async fn drive(
        &self,
        store: &EventStore,
        ctx: &mut RunContext,
        plan: &Plan,
        cancel: &CancellationToken,
    ) -> Result<Option<Failure>> {
        let run_id = ctx.run_id();

        for &stage in plan.stages() {
            let max_retries = match self.registry.lookup(stage) {
                Ok(registered) => registered.descriptor.max_retries,
                Err(e) => return Ok(Some(Failure::Fatal(e.to_string()))),
            };

            let mut attempt: u32 = 1;
            let mut directive: Option<String> = None;

            loop {
                if cancel.is_cancelled() {
                    return Ok(Some(Failure::Cancelled));
                }

                let payload = ctx.snapshot().payload_for(stage, directive.clone());
                let task = StageTask {
                    stage,
                    payload,
                    attempt,
                };

                self.log(
                    store,
                    ctx,
                    Event::new(run_id, EventType::StageStarted, format!("issuing {}", stage))
                        .with_stage(stage)
                        .with_attempt(attempt),
                )
                .await?;

                let result = match self.executor.run(&task, cancel).await {
                    Ok(result) => result,
                    Err(ExecutorError::Cancelled) => return Ok(Some(Failure::Cancelled)),
                    Err(e) => {
                        error!(%run_id, stage = %stage, error = %e, "Unrecoverable stage failure");
                        return Ok(Some(Failure::Fatal(e.to_string())));
                    }
                };

                let status = result.status;
                let detail = result.diagnostic.clone().unwrap_or_default();

                store.append_result(&result).await?;
                ctx.append(result)
                    .context("stage result violated context invariant")?;

                self.log(
                    store,
                    ctx,
                    Event::new(run_id, EventType::StageFinished, detail)
                        .with_stage(stage)
                        .with_attempt(attempt)
                        .with_status(status),
                )
                .await?;

                match self.verdict(stage, status, attempt, max_retries) {
                    StageVerdict::Advance => break,

                    StageVerdict::Retry { directive: next } => {
                        self.log(
                            store,
                            ctx,
                            Event::new(
                                run_id,
                                EventType::StageRetrying,
                                format!("attempt {} was {}", attempt, status),
                            )
                            .with_stage(stage)
                            .with_attempt(attempt + 1),
                        )
                        .await?;
                        if next.is_some() {
                            directive = next;
                        }
                        attempt += 1;
                    }

                    StageVerdict::AcceptDegraded => {
                        warn!(%run_id, stage = %stage, "Accepting low-confidence result");
                        self.log(
                            store,
                            ctx,
                            Event::new(
                                run_id,
                                EventType::StageDegraded,
                                "retries exhausted; best low-confidence attempt accepted",
                            )
                            .with_stage(stage),
                        )
                        .await?;
                        break;
                    }

                    StageVerdict::Abandon => {
                        warn!(%run_id, stage = %stage, "Abandoning non-essential stage");
                        self.log(
                            store,
                            ctx,
                            Event::new(
                                run_id,
                                EventType::StageAbandoned,
                                "retries exhausted on a non-essential stage",
                            )
                            .with_stage(stage),
                        )
                        .await?;
                        break;
                    }

                    StageVerdict::FailRun => {
                        return Ok(Some(Failure::EssentialStage(stage)));
                    }
                }
            }
        }

        Ok(None)
    }

    /// The retry/fallback policy, pure and separately testable.
    ///
    /// `max_retries` counts additional attempts beyond the first. Timeouts
    /// retry with the same payload; low-confidence retries narrow the
    /// scope; exhaustion resolves by essentiality, preferring degraded
    /// completion over aborting.
    fn verdict(
        &self,
        stage: StageName,
        status: StageStatus,
        attempt: u32,
        max_retries: u32,
    ) -> StageVerdict {
        let can_retry = attempt <= max_retries;

        match status {
            StageStatus::Ok => StageVerdict::Advance,

            StageStatus::LowConfidence => {
                if can_retry {
                    StageVerdict::Retry {
                        directive: Some(format!(
                            "Attempt {} was low-confidence. Narrow the scope to the strongest findings and answer decisively.",
                            attempt
                        )),
                    }
                } else {
                    StageVerdict::AcceptDegraded
                }
            }

            StageStatus::Timeout | StageStatus::Failed => {
                if can_retry {
                    StageVerdict::Retry { directive: None }
                } else if stage.is_essential() {
                    StageVerdict::FailRun
                } else {
                    StageVerdict::Abandon
                }
            }
        }
    }

    async fn log(&self, store: &EventStore, ctx: &mut RunContext, event: Event) -> Result<()> {
        store.append_event(&event).await?;
        ctx.record(event);
        Ok(())
    }

    /// Reconstruct the artifact of a persisted run from its logs.
    ///
    /// Deterministic: the same plan and results always rebuild the same
    /// artifact (rendered report paths are not part of replay).
    pub async fn replay(&self, run_id: Uuid) -> Result<FinalArtifact> {
        let store = EventStore::open(&self.runs_dir, run_id).await?;

        let events = store.replay_events().await?;
        if events.is_empty() {
            anyhow::bail!("Run {} not found", run_id);
        }

        let plan = store
            .load_plan()
            .await?
            .with_context(|| format!("Run {} has no persisted plan", run_id))?;
        let results = store.replay_results().await?;

        let termination = events
            .iter()
            .rev()
            .find_map(|e| match e.event_type {
                EventType::RunCompleted => Some(Termination::Done),
                EventType::RunFailed | EventType::RunCancelled => Some(Termination::Failed),
                _ => None,
            })
            // A log without a terminal event means the process died mid-run
            .unwrap_or(Termination::Failed);

        Ok(Aggregator::aggregate(run_id, &plan, &results, termination))
    }

    /// Events of a persisted run, for operator inspection.
    pub async fn run_events(&self, run_id: Uuid) -> Result<Vec<Event>> {
        let store = EventStore::open(&self.runs_dir, run_id).await?;
        let events = store.replay_events().await?;
        if events.is_empty() {
            anyhow::bail!("Run {} not found", run_id);
        }
        Ok(events)
    }

    /// List persisted run IDs.
    pub async fn list_runs(&self) -> Result<Vec<Uuid>> {
        EventStore::list_runs(&self.runs_dir).await
    }
}
