//! The final artifact returned to the user.
//!
//! Built once per run by the aggregator after the coordinator reaches a
//! terminal state. Carries the synthesized result and per-stage provenance;
//! intermediate diagnostics stay in the event log.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::stage::StageName;

/// Terminal quality of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunOutcome {
    /// Every planned stage completed cleanly
    Completed,

    /// The run finished but one or more stages were degraded or absent
    Degraded,

    /// An essential stage (or the run itself) failed
    Failed,
}

impl std::fmt::Display for RunOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            RunOutcome::Completed => "completed",
            RunOutcome::Degraded => "degraded",
            RunOutcome::Failed => "failed",
        };
        write!(f, "{}", s)
    }
}

/// How a stage ended up in the final artifact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageDisposition {
    /// A confident result was produced
    Completed,

    /// Best available result was low-confidence
    Degraded,

    /// Attempts were made but nothing presentable came back
    Absent,

    /// Planning decided the request did not need this stage
    Skipped,

    /// The run terminated before this stage was issued
    NotReached,
}

/// Per-stage provenance: what happened and how many attempts it took.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageProvenance {
    pub stage: StageName,
    pub disposition: StageDisposition,
    pub attempts: u32,
}

/// One structured output section, in planned stage order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArtifactSection {
    pub stage: StageName,
    pub title: String,
    pub body: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

/// The single client-facing result of a workflow run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FinalArtifact {
    pub run_id: Uuid,
    pub outcome: RunOutcome,

    /// Narrative synthesis of the presentable stage outputs
    pub summary: String,

    pub sections: Vec<ArtifactSection>,
    pub provenance: Vec<StageProvenance>,

    /// Rendered report file, when rendering succeeded
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub report_path: Option<PathBuf>,

    /// Timestamp of the last stage result (none if the run produced no
    /// results at all)
    pub completed_at: Option<DateTime<Utc>>,
}

impl FinalArtifact {
    /// Provenance entry for a stage, if the stage was part of the run.
    pub fn provenance_for(&self, stage: StageName) -> Option<&StageProvenance> {
        self.provenance.iter().find(|p| p.stage == stage)
    }

    /// Section produced by a stage, if any.
    pub fn section_for(&self, stage: StageName) -> Option<&ArtifactSection> {
        self.sections.iter().find(|s| s.stage == stage)
    }
}
