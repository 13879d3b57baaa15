//! Append-only per-run persistence.
//!
//! Each run owns a directory holding newline-delimited JSON logs: the
//! event log (operator channel) and the stage results, plus the plan as
//! a standalone JSON file. JSONL keeps the logs inspectable with plain
//! shell tools and makes replay trivial.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::fs::{self, File, OpenOptions};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use uuid::Uuid;

use crate::core::plan::Plan;
use crate::domain::{Event, StageResult};

/// File-based store for one run's logs.
pub struct EventStore {
    run_dir: PathBuf,
    events_path: PathBuf,
    results_path: PathBuf,
    plan_path: PathBuf,
}

impl EventStore {
    /// Create or open the store for a run under the given base directory.
    pub async fn open(base_dir: &Path, run_id: Uuid) -> Result<Self> {
        let run_dir = base_dir.join(run_id.to_string());

        fs::create_dir_all(&run_dir)
            .await
            .with_context(|| format!("Failed to create run directory: {}", run_dir.display()))?;

        Ok(Self {
            events_path: run_dir.join("events.jsonl"),
            results_path: run_dir.join("results.jsonl"),
            plan_path: run_dir.join("plan.json"),
            run_dir,
        })
    }

    pub fn run_dir(&self) -> &Path {
        &self.run_dir
    }

    pub fn events_path(&self) -> &Path {
        &self.events_path
    }

    /// Append an event to the log.
    pub async fn append_event(&self, event: &Event) -> Result<()> {
        append_line(&self.events_path, event).await
    }

    /// Replay all events in append order.
    pub async fn replay_events(&self) -> Result<Vec<Event>> {
        replay_lines(&self.events_path).await
    }

    /// Append a stage result.
    pub async fn append_result(&self, result: &StageResult) -> Result<()> {
        append_line(&self.results_path, result).await
    }

    /// Replay all stage results in append order.
    pub async fn replay_results(&self) -> Result<Vec<StageResult>> {
        replay_lines(&self.results_path).await
    }

    /// Persist the plan for later replay.
    pub async fn store_plan(&self, plan: &Plan) -> Result<()> {
        let json = serde_json::to_string_pretty(plan).context("Failed to serialize plan")?;
        fs::write(&self.plan_path, json)
            .await
            .with_context(|| format!("Failed to write plan: {}", self.plan_path.display()))?;
        Ok(())
    }

    /// Load the persisted plan, if the run got far enough to write one.
    pub async fn load_plan(&self) -> Result<Option<Plan>> {
        if !self.plan_path.exists() {
            return Ok(None);
        }
        let content = fs::read_to_string(&self.plan_path)
            .await
            .with_context(|| format!("Failed to read plan: {}", self.plan_path.display()))?;
        let plan = serde_json::from_str(&content).context("Failed to parse plan")?;
        Ok(Some(plan))
    }

    /// List all run IDs under a base directory.
    pub async fn list_runs(base_dir: &Path) -> Result<Vec<Uuid>> {
        if !base_dir.exists() {
            return Ok(Vec::new());
        }

        let mut runs = Vec::new();
        let mut entries = fs::read_dir(base_dir).await?;

        while let Some(entry) = entries.next_entry().await? {
            if entry.file_type().await?.is_dir() {
                if let Some(name) = entry.file_name().to_str() {
                    if let Ok(uuid) = Uuid::parse_str(name) {
                        runs.push(uuid);
                    }
                }
            }
        }

        Ok(runs)
    }
}

async fn append_line<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .await
        .with_context(|| format!("Failed to open log file: {}", path.display()))?;

    let json = serde_json::to_string(value).context("Failed to serialize log record")?;
    file.write_all(format!("{}\n", json).as_bytes())
        .await
        .context("Failed to write log record")?;
    file.flush().await.context("Failed to flush log record")?;

    Ok(())
}

async fn replay_lines<T: DeserializeOwned>(path: &Path) -> Result<Vec<T>> {
    if !path.exists() {
        return Ok(Vec::new());
    }

    let file = File::open(path)
        .await
        .with_context(|| format!("Failed to open log file: {}", path.display()))?;

    let reader = BufReader::new(file);
    let mut lines = reader.lines();
    let mut records = Vec::new();

    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }
        let record =
            serde_json::from_str(&line).with_context(|| format!("Failed to parse record: {}", line))?;
        records.push(record);
    }

    Ok(records)
}
