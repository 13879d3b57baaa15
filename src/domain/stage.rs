//! Stage vocabulary: names, tasks, payloads, and results.
//!
//! A stage is one phase of the analysis workflow. Each stage is bound to
//! exactly one agent via the registry; the coordinator issues a `StageTask`
//! per attempt and folds the resulting `StageResult` into the run context.

use std::collections::BTreeMap;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The fixed set of workflow stages, in default execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageName {
    /// Dataset discovery and metadata profiling
    Discovery,

    /// Heavy data analysis
    Analysis,

    /// Correlations and distributions
    Statistics,

    /// Visualization planning and report drafting
    Reporting,
}

impl StageName {
    /// All stages in default execution order.
    pub const ORDERED: [StageName; 4] = [
        StageName::Discovery,
        StageName::Analysis,
        StageName::Statistics,
        StageName::Reporting,
    ];

    /// Whether exhausting retries on this stage fails the whole run.
    ///
    /// Discovery and analysis gate everything downstream; statistics and
    /// reporting degrade to an absent section instead.
    pub fn is_essential(&self) -> bool {
        matches!(self, StageName::Discovery | StageName::Analysis)
    }

    /// Section title used in artifacts and rendered reports.
    pub fn title(&self) -> &'static str {
        match self {
            StageName::Discovery => "Data Discovery",
            StageName::Analysis => "Data Analysis",
            StageName::Statistics => "Statistical Analysis",
            StageName::Reporting => "Reporting",
        }
    }
}

impl std::fmt::Display for StageName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            StageName::Discovery => "discovery",
            StageName::Analysis => "analysis",
            StageName::Statistics => "statistics",
            StageName::Reporting => "reporting",
        };
        write!(f, "{}", name)
    }
}

/// Classification of one agent invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageStatus {
    /// Valid, confident answer
    Ok,

    /// Valid answer carrying a self-reported low-confidence marker
    LowConfidence,

    /// Answer failed output-schema validation
    Failed,

    /// Transport error or elapsed time beyond the stage budget
    Timeout,
}

impl std::fmt::Display for StageStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            StageStatus::Ok => "ok",
            StageStatus::LowConfidence => "low_confidence",
            StageStatus::Failed => "failed",
            StageStatus::Timeout => "timeout",
        };
        write!(f, "{}", s)
    }
}

/// Input handed to an agent for one attempt.
///
/// Derived deterministically from the run context: the original request,
/// the dataset reference, the latest presentable output of each prior
/// stage, and an optional narrowing directive added on low-confidence
/// retries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StagePayload {
    /// The user's original ask
    pub request: String,

    /// Dataset the run was pointed at (if any)
    pub dataset_path: Option<PathBuf>,

    /// Latest presentable summary per upstream stage
    pub upstream: BTreeMap<StageName, String>,

    /// Scope-narrowing instruction added on low-confidence retries
    pub directive: Option<String>,
}

/// One unit of work: a stage, its derived payload, and the attempt number.
///
/// Created by the coordinator, consumed by the executor, discarded once the
/// result is folded back into the context.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageTask {
    pub stage: StageName,
    pub payload: StagePayload,
    /// 1-indexed attempt counter
    pub attempt: u32,
}

/// Immutable record of one agent invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageResult {
    pub stage: StageName,
    pub attempt: u32,
    pub status: StageStatus,

    /// Raw agent reply (JSON text) for presentable results, possibly empty
    /// for timeouts
    pub payload: String,

    /// Operator-facing failure detail; never surfaced in the final artifact
    pub diagnostic: Option<String>,

    /// Wall-clock duration of the invocation
    pub duration_ms: u64,

    pub produced_at: DateTime<Utc>,
}

impl StageResult {
    pub fn new(stage: StageName, attempt: u32, status: StageStatus, payload: String) -> Self {
        Self {
            stage,
            attempt,
            status,
            payload,
            diagnostic: None,
            duration_ms: 0,
            produced_at: Utc::now(),
        }
    }

    pub fn with_diagnostic(mut self, diagnostic: impl Into<String>) -> Self {
        self.diagnostic = Some(diagnostic.into());
        self
    }

    pub fn with_duration(mut self, duration_ms: u64) -> Self {
        self.duration_ms = duration_ms;
        self
    }

    /// A result that can stand in for the stage's output downstream.
    pub fn is_presentable(&self) -> bool {
        matches!(self.status, StageStatus::Ok | StageStatus::LowConfidence)
    }

    /// Human-readable summary extracted from the reply, falling back to the
    /// raw payload when it does not parse.
    pub fn summary(&self) -> String {
        AgentReport::parse(&self.payload)
            .map(|r| r.summary)
            .unwrap_or_else(|_| self.payload.trim().to_string())
    }
}

/// The output contract every agent must satisfy: a JSON object with a
/// summary, optional structured data, and an optional confidence score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentReport {
    pub summary: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
}

impl AgentReport {
    pub fn parse(raw: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_order() {
        assert_eq!(StageName::ORDERED[0], StageName::Discovery);
        assert_eq!(StageName::ORDERED[3], StageName::Reporting);
    }

    #[test]
    fn test_essential_stages() {
        assert!(StageName::Discovery.is_essential());
        assert!(StageName::Analysis.is_essential());
        assert!(!StageName::Statistics.is_essential());
        assert!(!StageName::Reporting.is_essential());
    }

    #[test]
    fn test_stage_serialization() {
        let json = serde_json::to_string(&StageName::Statistics).unwrap();
        assert_eq!(json, "\"statistics\"");

        let parsed: StageName = serde_json::from_str("\"discovery\"").unwrap();
        assert_eq!(parsed, StageName::Discovery);
    }

    #[test]
    fn test_result_summary_extraction() {
        let reply = serde_json::json!({
            "summary": "Three columns profiled, no missing values.",
            "confidence": 0.92
        })
        .to_string();

        let result = StageResult::new(StageName::Discovery, 1, StageStatus::Ok, reply);
        assert_eq!(result.summary(), "Three columns profiled, no missing values.");
    }

    #[test]
    fn test_result_summary_fallback_on_plain_text() {
        let result = StageResult::new(
            StageName::Analysis,
            1,
            StageStatus::Failed,
            "  not json at all  ".to_string(),
        );
        assert_eq!(result.summary(), "not json at all");
    }

    #[test]
    fn test_agent_report_roundtrip() {
        let report = AgentReport {
            summary: "Prices correlate with mileage.".to_string(),
            data: Some(serde_json::json!({"r": -0.62})),
            confidence: Some(0.8),
        };

        let json = serde_json::to_string(&report).unwrap();
        let parsed = AgentReport::parse(&json).unwrap();
        assert_eq!(parsed, report);
    }
}
