//! Report rendering: write a final artifact as a markdown file.
//!
//! Invoked once per run after aggregation. Failure here is non-fatal;
//! the caller falls back to the in-memory artifact.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::Utc;

use crate::domain::{FinalArtifact, StageDisposition};

/// Renders artifacts into the reports directory.
#[derive(Debug, Clone)]
pub struct ReportRenderer {
    reports_dir: PathBuf,
}

impl ReportRenderer {
    pub fn new(reports_dir: impl Into<PathBuf>) -> Self {
        Self {
            reports_dir: reports_dir.into(),
        }
    }

    pub fn reports_dir(&self) -> &Path {
        &self.reports_dir
    }

    /// Write the artifact as markdown and return the file path.
    pub fn render(&self, artifact: &FinalArtifact) -> Result<PathBuf> {
        std::fs::create_dir_all(&self.reports_dir).with_context(|| {
            format!(
                "Failed to create reports directory: {}",
                self.reports_dir.display()
            )
        })?;

        let short_id: String = artifact.run_id.to_string().chars().take(8).collect();
        let path = self
            .reports_dir
            .join(format!("analysis_report_{}.md", short_id));

        let content = self.render_markdown(artifact);
        std::fs::write(&path, content)
            .with_context(|| format!("Failed to write report: {}", path.display()))?;

        Ok(path)
    }

    fn render_markdown(&self, artifact: &FinalArtifact) -> String {
        let mut out = String::new();

        out.push_str("# Data Analysis Report\n\n");
        out.push_str(&format!(
            "*Generated: {}*\n\n",
            Utc::now().format("%Y-%m-%d %H:%M UTC")
        ));
        out.push_str(&format!("**Outcome:** {}\n\n", artifact.outcome));

        out.push_str("## Summary\n\n");
        out.push_str(&artifact.summary);
        out.push_str("\n\n");

        for section in &artifact.sections {
            out.push_str(&format!("## {}\n\n", section.title));
            out.push_str(&section.body);
            out.push('\n');
            if let Some(data) = &section.data {
                out.push_str("\n```json\n");
                out.push_str(
                    &serde_json::to_string_pretty(data).unwrap_or_else(|_| data.to_string()),
                );
                out.push_str("\n```\n");
            }
            out.push('\n');
        }

        out.push_str("## Provenance\n\n");
        out.push_str("| Stage | Disposition | Attempts |\n");
        out.push_str("|-------|-------------|----------|\n");
        for p in &artifact.provenance {
            let disposition = match p.disposition {
                StageDisposition::Completed => "completed",
                StageDisposition::Degraded => "degraded",
                StageDisposition::Absent => "absent",
                StageDisposition::Skipped => "skipped",
                StageDisposition::NotReached => "not reached",
            };
            out.push_str(&format!(
                "| {} | {} | {} |\n",
                p.stage.title(),
                disposition,
                p.attempts
            ));
        }

        out.push_str("\n---\n*Report generated by datapilot*\n");
        out
    }
}
