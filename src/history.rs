//! Session history: one SQLite row per terminated run.
//!
//! Lets `datapilot runs` answer "what did I analyze lately" without
//! walking every run directory.

use std::path::Path;

use anyhow::{Context, Result};
use rusqlite::{params, Connection};

use crate::domain::FinalArtifact;

/// A recorded run summary.
#[derive(Debug, Clone)]
pub struct RunRecord {
    pub run_id: String,
    pub request: String,
    pub outcome: String,
    pub summary: String,
    pub report_path: Option<String>,
    pub completed_at: Option<String>,
}

/// SQLite-backed history of terminated runs.
pub struct RunHistory {
    conn: Connection,
}

impl RunHistory {
    /// Open (creating if needed) the history database.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create history directory: {}", parent.display())
            })?;
        }

        let conn = Connection::open(path)
            .with_context(|| format!("Failed to open history database: {}", path.display()))?;
        Self::init(conn)
    }

    /// In-memory history, used by tests.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().context("Failed to open in-memory database")?;
        Self::init(conn)
    }

    fn init(conn: Connection) -> Result<Self> {
        conn.execute(
            "CREATE TABLE IF NOT EXISTS runs (
                run_id       TEXT PRIMARY KEY,
                request      TEXT NOT NULL,
                outcome      TEXT NOT NULL,
                summary      TEXT NOT NULL,
                report_path  TEXT,
                completed_at TEXT
            )",
            [],
        )
        .context("Failed to create runs table")?;

        Ok(Self { conn })
    }

    /// Record a terminated run.
    pub fn record(&self, request_text: &str, artifact: &FinalArtifact) -> Result<()> {
        self.conn
            .execute(
                "INSERT OR REPLACE INTO runs
                 (run_id, request, outcome, summary, report_path, completed_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    artifact.run_id.to_string(),
                    request_text,
                    artifact.outcome.to_string(),
                    artifact.summary,
                    artifact.report_path.as_ref().map(|p| p.display().to_string()),
                    artifact.completed_at.map(|t| t.to_rfc3339()),
                ],
            )
            .context("Failed to record run")?;
        Ok(())
    }

    /// Most recent runs, newest first.
    pub fn recent(&self, limit: usize) -> Result<Vec<RunRecord>> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT run_id, request, outcome, summary, report_path, completed_at
                 FROM runs
                 ORDER BY completed_at DESC
                 LIMIT ?1",
            )
            .context("Failed to prepare history query")?;

        let rows = stmt
            .query_map(params![limit as i64], |row| {
                Ok(RunRecord {
                    run_id: row.get(0)?,
                    request: row.get(1)?,
                    outcome: row.get(2)?,
                    summary: row.get(3)?,
                    report_path: row.get(4)?,
                    completed_at: row.get(5)?,
                })
            })
            .context("Failed to query history")?;

        let mut records = Vec::new();
        for row in rows {
            records.push(row.context("Failed to read history row")?);
        }
        Ok(records)
    }
}
