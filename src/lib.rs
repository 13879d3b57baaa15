//! datapilot - multi-agent data analysis orchestrator
//!
//! Routes a data-analysis request through a fixed team of specialized
//! model agents, one per workflow stage (discovery, analysis, statistics,
//! reporting), sequenced by a coordinator the end user never sees.
//!
//! # Architecture
//!
//! The system is built around an append-only run log:
//! - Every coordinator decision and stage outcome is recorded as an event
//! - Stage results are keyed by (stage, attempt) and never overwritten
//! - A terminated run can be replayed into the same final artifact
//!
//! The coordinator prefers degraded completion over aborting: retries are
//! bounded, non-essential stages are skippable, and the user always gets
//! one final artifact with per-stage provenance.
//!
//! # Modules
//!
//! - `agents`: External inference capabilities (Ollama models, datasets)
//! - `core`: Coordination logic (Registry, Plan, Executor, Coordinator,
//!   Aggregator, EventStore)
//! - `domain`: Data structures (Request, Context, Event, Artifact)
//! - `report`: Markdown report rendering
//! - `history`: SQLite session history
//! - `cli`: Command-line interface
//!
//! # Usage
//!
//! ```bash
//! # Run an analysis against the first CSV in the data directory
//! datapilot analyze "analyze the car sales dataset"
//!
//! # Inspect a run's event log
//! datapilot status <run-id>
//!
//! # List recent runs
//! datapilot runs
//! ```

pub mod agents;
pub mod cli;
pub mod config;
pub mod core;
pub mod domain;
pub mod history;
pub mod report;

// Re-export main types at crate root for convenience
pub use self::core::{AgentDescriptor, AgentRegistry, Aggregator, Coordinator, Plan, StageExecutor};
pub use domain::{
    Event, EventType, FinalArtifact, RunContext, RunOutcome, StageName, StageResult, StageStatus,
    WorkflowRequest,
};

// Capability surfaces
pub use agents::{DatasetProfile, DatasetReader, OllamaAgent, OllamaClient, StageAgent};
pub use history::RunHistory;
pub use report::ReportRenderer;
