//! Event types for the append-only run log.
//!
//! Every coordinator decision and stage outcome is recorded as an immutable
//! event. The log is the operator channel: diagnostics live here and never
//! reach the client-facing artifact.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::stage::{StageName, StageStatus};

/// A single event in the append-only run log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    /// Unique identifier for this event
    pub id: Uuid,

    /// When this event occurred (UTC)
    pub timestamp: DateTime<Utc>,

    /// The run this event belongs to
    pub run_id: Uuid,

    /// Stage the event concerns (if applicable)
    pub stage: Option<StageName>,

    /// Attempt number the event concerns (if applicable)
    pub attempt: Option<u32>,

    /// Classification of the finished attempt (for `StageFinished`)
    pub status: Option<StageStatus>,

    /// Type of event
    pub event_type: EventType,

    /// Operator-facing detail (NO secrets, never shown to the end user)
    pub detail: String,
}

impl Event {
    /// Create a new event with the current timestamp.
    pub fn new(run_id: Uuid, event_type: EventType, detail: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            run_id,
            stage: None,
            attempt: None,
            status: None,
            event_type,
            detail: detail.into(),
        }
    }

    pub fn with_stage(mut self, stage: StageName) -> Self {
        self.stage = Some(stage);
        self
    }

    pub fn with_attempt(mut self, attempt: u32) -> Self {
        self.attempt = Some(attempt);
        self
    }

    pub fn with_status(mut self, status: StageStatus) -> Self {
        self.status = Some(status);
        self
    }
}

/// Types of events recorded during a workflow run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    /// A new run has started
    RunStarted,

    /// Planning finished; detail lists the ordered stages
    PlanBuilt,

    /// A stage was dropped from the plan; detail carries the reason
    StageSkipped,

    /// An attempt has been issued to the executor
    StageStarted,

    /// An attempt came back; `status` carries the classification
    StageFinished,

    /// The stage will be re-issued after a retryable outcome
    StageRetrying,

    /// Retries exhausted on low confidence; best attempt accepted as degraded
    StageDegraded,

    /// Retries exhausted on a non-essential stage; stage left absent
    StageAbandoned,

    /// The run reached DONE
    RunCompleted,

    /// The run reached FAILED
    RunFailed,

    /// The run was cancelled before reaching a terminal stage
    RunCancelled,

    /// The final report file was written
    ReportRendered,

    /// Report rendering failed (non-fatal)
    ReportFailed,
}
