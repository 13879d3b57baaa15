//! Final artifact assembly.
//!
//! The aggregator walks the planned stage order, selects the best
//! available result per stage, and merges everything into the one
//! client-facing object. Stage diagnostics never cross into the
//! artifact; they stay in the event log.

use uuid::Uuid;

use crate::domain::{
    AgentReport, ArtifactSection, FinalArtifact, RunOutcome, StageDisposition, StageName,
    StageProvenance, StageResult, StageStatus,
};

use super::plan::Plan;

/// How the coordinator's state machine ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Termination {
    /// Reached DONE
    Done,

    /// Reached FAILED (essential stage exhausted, fatal error, or cancel)
    Failed,
}

pub struct Aggregator;

impl Aggregator {
    /// Build the final artifact from a terminated run.
    ///
    /// Deterministic given the plan and results, so replaying a persisted
    /// run reconstructs an identical artifact.
    pub fn aggregate(
        run_id: Uuid,
        plan: &Plan,
        results: &[StageResult],
        termination: Termination,
    ) -> FinalArtifact {
        let mut sections = Vec::new();
        let mut provenance = Vec::new();

        for &stage in plan.stages() {
            let attempts = results.iter().filter(|r| r.stage == stage).count() as u32;
            let best = best_result(results, stage);

            let disposition = match (&best, attempts) {
                (Some(r), _) if r.status == StageStatus::Ok => StageDisposition::Completed,
                (Some(_), _) => StageDisposition::Degraded,
                (None, 0) => StageDisposition::NotReached,
                (None, _) => StageDisposition::Absent,
            };

            if let Some(result) = best {
                let data = AgentReport::parse(&result.payload)
                    .ok()
                    .and_then(|r| r.data);
                sections.push(ArtifactSection {
                    stage,
                    title: stage.title().to_string(),
                    body: result.summary(),
                    data,
                });
            }

            provenance.push(StageProvenance {
                stage,
                disposition,
                attempts,
            });
        }

        for skip in plan.skipped() {
            provenance.push(StageProvenance {
                stage: skip.stage,
                disposition: StageDisposition::Skipped,
                attempts: 0,
            });
        }

        let outcome = match termination {
            Termination::Failed => RunOutcome::Failed,
            Termination::Done => {
                let degraded = provenance.iter().any(|p| {
                    matches!(
                        p.disposition,
                        StageDisposition::Degraded | StageDisposition::Absent
                    )
                });
                if degraded {
                    RunOutcome::Degraded
                } else {
                    RunOutcome::Completed
                }
            }
        };

        let summary = narrative(&sections, outcome);
        let completed_at = results.iter().map(|r| r.produced_at).max();

        FinalArtifact {
            run_id,
            outcome,
            summary,
            sections,
            provenance,
            report_path: None,
            completed_at,
        }
    }
}

/// Latest `ok` result for a stage, falling back to the latest
/// low-confidence attempt.
fn best_result(results: &[StageResult], stage: StageName) -> Option<&StageResult> {
    results
        .iter()
        .filter(|r| r.stage == stage && r.status == StageStatus::Ok)
        .max_by_key(|r| r.attempt)
        .or_else(|| {
            results
                .iter()
                .filter(|r| r.stage == stage && r.is_presentable())
                .max_by_key(|r| r.attempt)
        })
}

fn narrative(sections: &[ArtifactSection], outcome: RunOutcome) -> String {
    if sections.is_empty() {
        return match outcome {
            RunOutcome::Failed => {
                "The workflow failed before any stage produced output.".to_string()
            }
            _ => "The workflow produced no stage output.".to_string(),
        };
    }

    let mut parts: Vec<String> = sections
        .iter()
        .map(|s| format!("{}: {}", s.title, s.body))
        .collect();

    if outcome == RunOutcome::Failed {
        parts.push("The workflow stopped early; later stages are missing.".to_string());
    }

    parts.join("\n\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::WorkflowRequest;

    fn reply(summary: &str) -> String {
        serde_json::json!({ "summary": summary, "confidence": 0.9 }).to_string()
    }

    fn full_plan() -> Plan {
        Plan::for_request(&WorkflowRequest::new("analyze the dataset"))
    }

    #[test]
    fn test_all_stages_completed() {
        let results: Vec<StageResult> = StageName::ORDERED
            .iter()
            .map(|&stage| {
                StageResult::new(stage, 1, StageStatus::Ok, reply("a perfectly fine answer"))
            })
            .collect();

        let artifact =
            Aggregator::aggregate(Uuid::new_v4(), &full_plan(), &results, Termination::Done);

        assert_eq!(artifact.outcome, RunOutcome::Completed);
        assert_eq!(artifact.sections.len(), 4);
        assert!(artifact
            .provenance
            .iter()
            .all(|p| p.disposition == StageDisposition::Completed));
        assert!(artifact.completed_at.is_some());
    }

    #[test]
    fn test_degraded_stage_selects_best_available() {
        let results = vec![
            StageResult::new(StageName::Discovery, 1, StageStatus::Ok, reply("found cars.csv")),
            StageResult::new(
                StageName::Analysis,
                1,
                StageStatus::LowConfidence,
                reply("tentative pattern in prices"),
            ),
            StageResult::new(
                StageName::Analysis,
                2,
                StageStatus::LowConfidence,
                reply("still tentative, narrower scope"),
            ),
        ];

        let plan = Plan::for_request(&WorkflowRequest::new("analyze, no stats, no report"));
        let artifact = Aggregator::aggregate(Uuid::new_v4(), &plan, &results, Termination::Done);

        assert_eq!(artifact.outcome, RunOutcome::Degraded);
        let analysis = artifact.section_for(StageName::Analysis).unwrap();
        assert_eq!(analysis.body, "still tentative, narrower scope");

        let prov = artifact.provenance_for(StageName::Analysis).unwrap();
        assert_eq!(prov.disposition, StageDisposition::Degraded);
        assert_eq!(prov.attempts, 2);
    }

    #[test]
    fn test_failed_run_keeps_pre_failure_stages() {
        let results = vec![StageResult::new(
            StageName::Discovery,
            1,
            StageStatus::Ok,
            reply("found cars.csv with 4 columns"),
        )];

        let artifact =
            Aggregator::aggregate(Uuid::new_v4(), &full_plan(), &results, Termination::Failed);

        assert_eq!(artifact.outcome, RunOutcome::Failed);
        assert_eq!(artifact.sections.len(), 1);
        assert!(!artifact.summary.is_empty());
        assert_eq!(
            artifact.provenance_for(StageName::Statistics).unwrap().disposition,
            StageDisposition::NotReached
        );
    }

    #[test]
    fn test_skipped_stages_in_provenance() {
        let plan = Plan::for_request(&WorkflowRequest::new("analyze without statistics"));
        let results = vec![
            StageResult::new(StageName::Discovery, 1, StageStatus::Ok, reply("one dataset found")),
            StageResult::new(StageName::Analysis, 1, StageStatus::Ok, reply("analysis complete")),
            StageResult::new(StageName::Reporting, 1, StageStatus::Ok, reply("report drafted ok")),
        ];

        let artifact = Aggregator::aggregate(Uuid::new_v4(), &plan, &results, Termination::Done);

        let stats = artifact.provenance_for(StageName::Statistics).unwrap();
        assert_eq!(stats.disposition, StageDisposition::Skipped);
        assert_eq!(artifact.outcome, RunOutcome::Completed);
    }

    #[test]
    fn test_empty_run_still_yields_artifact() {
        let artifact =
            Aggregator::aggregate(Uuid::new_v4(), &full_plan(), &[], Termination::Failed);

        assert_eq!(artifact.outcome, RunOutcome::Failed);
        assert!(artifact.sections.is_empty());
        assert!(!artifact.summary.is_empty());
        assert!(artifact.completed_at.is_none());
        assert_eq!(artifact.provenance.len(), 4);
    }

    #[test]
    fn test_diagnostics_never_surface() {
        let results = vec![
            StageResult::new(StageName::Discovery, 1, StageStatus::Ok, reply("dataset profiled"))
                .with_diagnostic("internal retry detail"),
            StageResult::new(StageName::Analysis, 1, StageStatus::Timeout, String::new())
                .with_diagnostic("agent exceeded budget"),
        ];

        let artifact =
            Aggregator::aggregate(Uuid::new_v4(), &full_plan(), &results, Termination::Done);

        let serialized = serde_json::to_string(&artifact).unwrap();
        assert!(!serialized.contains("internal retry detail"));
        assert!(!serialized.contains("agent exceeded budget"));
    }
}
