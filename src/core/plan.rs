//! Request decomposition into an ordered stage list.
//!
//! Planning is deterministic: the default order is the full four-stage
//! workflow, and a stage is dropped only when the request explicitly
//! opts out of it. Skip decisions are recorded so runs stay auditable.

use serde::{Deserialize, Serialize};

use crate::domain::{StageName, WorkflowRequest};

/// A recorded decision to leave a stage out of the run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SkipDecision {
    pub stage: StageName,
    pub reason: String,
}

/// The ordered stage list for one run, plus what was skipped and why.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Plan {
    stages: Vec<StageName>,
    skipped: Vec<SkipDecision>,
}

/// Phrases that opt a stage out of the run.
const STATISTICS_OPT_OUTS: [&str; 4] = [
    "without statistics",
    "no statistics",
    "skip statistics",
    "no stats",
];
const REPORTING_OPT_OUTS: [&str; 4] = ["without report", "no report", "skip report", "without a report"];

impl Plan {
    /// Decompose a request into stage tasks to run, in order.
    pub fn for_request(request: &WorkflowRequest) -> Self {
        let text = request.text.to_lowercase();

        let mut stages = Vec::new();
        let mut skipped = Vec::new();

        for stage in StageName::ORDERED {
            let opt_out = match stage {
                StageName::Statistics => STATISTICS_OPT_OUTS
                    .iter()
                    .find(|phrase| text.contains(*phrase)),
                StageName::Reporting => REPORTING_OPT_OUTS
                    .iter()
                    .find(|phrase| text.contains(*phrase)),
                // Discovery and analysis are always planned
                _ => None,
            };

            match opt_out {
                Some(phrase) => skipped.push(SkipDecision {
                    stage,
                    reason: format!("request says \"{}\"", phrase),
                }),
                None => stages.push(stage),
            }
        }

        Self { stages, skipped }
    }

    pub fn stages(&self) -> &[StageName] {
        &self.stages
    }

    pub fn skipped(&self) -> &[SkipDecision] {
        &self.skipped
    }

    pub fn is_planned(&self, stage: StageName) -> bool {
        self.stages.contains(&stage)
    }

    /// Short form for logs, e.g. "discovery -> analysis -> reporting".
    pub fn describe(&self) -> String {
        self.stages
            .iter()
            .map(|s| s.to_string())
            .collect::<Vec<_>>()
            .join(" -> ")
    }
}
