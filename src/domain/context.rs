//! Per-run accumulated state.
//!
//! A `RunContext` is exclusively owned by one workflow run. Stage results
//! are keyed by (stage, attempt) and only ever appended, so the full
//! history of a run stays replayable. The coordinator's decision logic
//! reads through an immutable [`ContextSnapshot`].

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use super::events::Event;
use super::request::WorkflowRequest;
use super::stage::{StageName, StagePayload, StageResult};

/// Violations of the context invariants.
#[derive(Debug, Clone, Error)]
pub enum ContextError {
    #[error("duplicate result for stage '{stage}' attempt {attempt}")]
    DuplicateAttempt { stage: StageName, attempt: u32 },
}

/// The evolving shared state of one workflow run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunContext {
    run_id: Uuid,
    request: WorkflowRequest,

    /// Append-only; at most one entry per (stage, attempt)
    results: Vec<StageResult>,

    /// In-memory mirror of the persisted event log
    events: Vec<Event>,
}

impl RunContext {
    pub fn new(run_id: Uuid, request: WorkflowRequest) -> Self {
        Self {
            run_id,
            request,
            results: Vec::new(),
            events: Vec::new(),
        }
    }

    /// Rebuild a context from previously persisted results, re-validating
    /// the (stage, attempt) uniqueness invariant.
    pub fn from_results(
        run_id: Uuid,
        request: WorkflowRequest,
        results: Vec<StageResult>,
    ) -> Result<Self, ContextError> {
        let mut ctx = Self::new(run_id, request);
        for result in results {
            ctx.append(result)?;
        }
        Ok(ctx)
    }

    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    pub fn request(&self) -> &WorkflowRequest {
        &self.request
    }

    pub fn results(&self) -> &[StageResult] {
        &self.results
    }

    pub fn events(&self) -> &[Event] {
        &self.events
    }

    /// Append a stage result. Rejects a second result for the same
    /// (stage, attempt) pair; existing entries are never overwritten.
    pub fn append(&mut self, result: StageResult) -> Result<(), ContextError> {
        let duplicate = self
            .results
            .iter()
            .any(|r| r.stage == result.stage && r.attempt == result.attempt);
        if duplicate {
            return Err(ContextError::DuplicateAttempt {
                stage: result.stage,
                attempt: result.attempt,
            });
        }
        self.results.push(result);
        Ok(())
    }

    /// Record an event in the in-memory log.
    pub fn record(&mut self, event: Event) {
        self.events.push(event);
    }

    /// Immutable view for decision logic and payload derivation.
    pub fn snapshot(&self) -> ContextSnapshot<'_> {
        ContextSnapshot {
            run_id: self.run_id,
            request: &self.request,
            results: &self.results,
        }
    }

    /// Highest-attempt result for a stage, if any.
    pub fn get_latest(&self, stage: StageName) -> Option<&StageResult> {
        self.snapshot().get_latest(stage)
    }

    /// Number of attempts recorded for a stage.
    pub fn attempts(&self, stage: StageName) -> u32 {
        self.snapshot().attempts(stage)
    }
}

/// Read-only view over a run context.
#[derive(Debug, Clone, Copy)]
pub struct ContextSnapshot<'a> {
    pub run_id: Uuid,
    pub request: &'a WorkflowRequest,
    pub results: &'a [StageResult],
}

impl<'a> ContextSnapshot<'a> {
    /// Highest-attempt result for a stage, if any.
    pub fn get_latest(&self, stage: StageName) -> Option<&'a StageResult> {
        self.results
            .iter()
            .filter(|r| r.stage == stage)
            .max_by_key(|r| r.attempt)
    }

    /// Number of attempts recorded for a stage.
    pub fn attempts(&self, stage: StageName) -> u32 {
        self.results.iter().filter(|r| r.stage == stage).count() as u32
    }

    /// Best result to present for a stage: the latest `ok`, falling back
    /// to the latest low-confidence attempt.
    pub fn latest_presentable(&self, stage: StageName) -> Option<&'a StageResult> {
        self.results
            .iter()
            .filter(|r| r.stage == stage && r.status == super::stage::StageStatus::Ok)
            .max_by_key(|r| r.attempt)
            .or_else(|| {
                self.results
                    .iter()
                    .filter(|r| r.stage == stage && r.is_presentable())
                    .max_by_key(|r| r.attempt)
            })
    }

    /// Derive the input payload for a stage attempt.
    ///
    /// Deterministic given the snapshot: the request, the dataset
    /// reference, the latest presentable summary of every earlier stage,
    /// and the optional narrowing directive.
    pub fn payload_for(&self, stage: StageName, directive: Option<String>) -> StagePayload {
        let mut upstream = BTreeMap::new();
        for prior in StageName::ORDERED {
            if prior == stage {
                break;
            }
            if let Some(result) = self.latest_presentable(prior) {
                upstream.insert(prior, result.summary());
            }
        }

        StagePayload {
            request: self.request.text.clone(),
            dataset_path: self.request.dataset.clone(),
            upstream,
            directive,
        }
    }
}
