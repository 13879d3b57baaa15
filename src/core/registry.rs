//! Capability registry: stage name to agent binding.
//!
//! Descriptors are defined in YAML (or built-in defaults) and bound to
//! agent implementations at startup. The registry is read-only afterwards
//! and shared across concurrent runs.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::agents::StageAgent;
use crate::domain::StageName;

/// Registry failures. `UnknownStage` is a configuration error and fatal
/// to the run that hits it.
#[derive(Debug, Clone, Error)]
pub enum RegistryError {
    #[error("no agent registered for stage '{0}'")]
    UnknownStage(StageName),

    #[error("duplicate agent registered for stage '{0}'")]
    DuplicateStage(StageName),
}

/// Static description of one stage agent. Immutable, loaded at startup.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentDescriptor {
    /// Agent identity, e.g. "data-discovery-agent"
    pub name: String,

    /// Stage this agent serves
    pub stage: StageName,

    /// Human-readable specialty
    pub role: String,

    /// Model id, e.g. "qwen2.5:14b-instruct"
    pub model: String,

    /// Per-attempt time budget
    #[serde(default = "default_timeout_seconds")]
    pub timeout_seconds: u64,

    /// Additional attempts allowed beyond the first
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
}

fn default_timeout_seconds() -> u64 {
    120
}
fn default_max_retries() -> u32 {
    2
}

impl AgentDescriptor {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }

    /// The built-in team: one model per stage.
    pub fn defaults() -> Vec<AgentDescriptor> {
        vec![
            AgentDescriptor {
                name: "data-discovery-agent".to_string(),
                stage: StageName::Discovery,
                role: "Quick dataset discovery and metadata profiling".to_string(),
                model: "llama3.2:3b".to_string(),
                timeout_seconds: 60,
                max_retries: default_max_retries(),
            },
            AgentDescriptor {
                name: "data-analysis-agent".to_string(),
                stage: StageName::Analysis,
                role: "Complex data analysis and transformation".to_string(),
                model: "qwen2.5:14b-instruct".to_string(),
                timeout_seconds: default_timeout_seconds(),
                max_retries: default_max_retries(),
            },
            AgentDescriptor {
                name: "statistical-agent".to_string(),
                stage: StageName::Statistics,
                role: "Correlation and distribution analysis".to_string(),
                model: "mistral:7b-instruct".to_string(),
                timeout_seconds: default_timeout_seconds(),
                max_retries: default_max_retries(),
            },
            AgentDescriptor {
                name: "report-agent".to_string(),
                stage: StageName::Reporting,
                role: "Visualization planning and report drafting".to_string(),
                model: "qwen2.5:7b-instruct".to_string(),
                timeout_seconds: default_timeout_seconds(),
                max_retries: default_max_retries(),
            },
        ]
    }

    /// Load descriptors from a YAML file.
    pub fn from_file(path: &Path) -> Result<Vec<AgentDescriptor>> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read agents file: {}", path.display()))?;
        Self::from_yaml(&content)
    }

    /// Parse descriptors from YAML content and validate them.
    pub fn from_yaml(content: &str) -> Result<Vec<AgentDescriptor>> {
        let descriptors: Vec<AgentDescriptor> =
            serde_yaml::from_str(content).context("Failed to parse agents YAML")?;
        Self::validate(&descriptors)?;
        Ok(descriptors)
    }

    fn validate(descriptors: &[AgentDescriptor]) -> Result<()> {
        let mut seen = Vec::new();
        for (i, descriptor) in descriptors.iter().enumerate() {
            if descriptor.name.is_empty() {
                anyhow::bail!("Agent {} has an empty name", i);
            }
            if descriptor.timeout_seconds == 0 {
                anyhow::bail!("Agent '{}' has a zero timeout", descriptor.name);
            }
            if seen.contains(&descriptor.stage) {
                anyhow::bail!(
                    "Stage '{}' is bound to more than one agent",
                    descriptor.stage
                );
            }
            seen.push(descriptor.stage);
        }
        Ok(())
    }
}

/// One registry entry: the descriptor plus the live agent behind it.
pub struct RegisteredAgent {
    pub descriptor: AgentDescriptor,
    pub agent: Arc<dyn StageAgent>,
}

impl std::fmt::Debug for RegisteredAgent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegisteredAgent")
            .field("descriptor", &self.descriptor)
            .finish_non_exhaustive()
    }
}

/// Stage-name to agent mapping. Read-only after initialization;
/// registration order defines no semantics.
#[derive(Default)]
pub struct AgentRegistry {
    agents: HashMap<StageName, RegisteredAgent>,
}

impl AgentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind an agent to its descriptor's stage.
    pub fn register(
        &mut self,
        descriptor: AgentDescriptor,
        agent: Arc<dyn StageAgent>,
    ) -> Result<(), RegistryError> {
        let stage = descriptor.stage;
        if self.agents.contains_key(&stage) {
            return Err(RegistryError::DuplicateStage(stage));
        }
        self.agents
            .insert(stage, RegisteredAgent { descriptor, agent });
        Ok(())
    }

    /// Look up the agent bound to a stage.
    pub fn lookup(&self, stage: StageName) -> Result<&RegisteredAgent, RegistryError> {
        self.agents
            .get(&stage)
            .ok_or(RegistryError::UnknownStage(stage))
    }

    /// Descriptors in stage order, for display.
    pub fn descriptors(&self) -> Vec<&AgentDescriptor> {
        StageName::ORDERED
            .iter()
            .filter_map(|stage| self.agents.get(stage).map(|r| &r.descriptor))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.agents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.agents.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    use crate::agents::AgentError;
    use crate::domain::StageTask;

    struct NullAgent;

    #[async_trait]
    impl StageAgent for NullAgent {
        fn name(&self) -> &str {
            "null"
        }

        async fn invoke(&self, _task: &StageTask) -> Result<String, AgentError> {
            Ok(String::new())
        }
    }

    fn discovery_descriptor() -> AgentDescriptor {
        AgentDescriptor {
            name: "data-discovery-agent".to_string(),
            stage: StageName::Discovery,
            role: "discovery".to_string(),
            model: "llama3.2:3b".to_string(),
            timeout_seconds: 60,
            max_retries: 1,
        }
    }

    #[test]
    fn test_lookup_unknown_stage() {
        let registry = AgentRegistry::new();
        let err = registry.lookup(StageName::Analysis).unwrap_err();
        assert!(matches!(err, RegistryError::UnknownStage(StageName::Analysis)));
    }

    #[test]
    fn test_register_and_lookup() {
        let mut registry = AgentRegistry::new();
        registry
            .register(discovery_descriptor(), Arc::new(NullAgent))
            .unwrap();

        let registered = registry.lookup(StageName::Discovery).unwrap();
        assert_eq!(registered.descriptor.name, "data-discovery-agent");
        assert_eq!(registered.descriptor.timeout(), Duration::from_secs(60));
    }

    #[test]
    fn test_duplicate_stage_rejected() {
        let mut registry = AgentRegistry::new();
        registry
            .register(discovery_descriptor(), Arc::new(NullAgent))
            .unwrap();

        let err = registry
            .register(discovery_descriptor(), Arc::new(NullAgent))
            .unwrap_err();
        assert!(matches!(err, RegistryError::DuplicateStage(_)));
    }

    #[test]
    fn test_default_team_covers_all_stages() {
        let descriptors = AgentDescriptor::defaults();
        assert_eq!(descriptors.len(), 4);
        for stage in StageName::ORDERED {
            assert!(descriptors.iter().any(|d| d.stage == stage));
        }
    }

    #[test]
    fn test_descriptor_yaml_parsing() {
        let yaml = r#"
- name: data-discovery-agent
  stage: discovery
  role: Quick dataset discovery
  model: llama3.2:3b
  timeout_seconds: 30

- name: data-analysis-agent
  stage: analysis
  role: Heavy analysis
  model: qwen2.5:14b-instruct
"#;
        let descriptors = AgentDescriptor::from_yaml(yaml).unwrap();
        assert_eq!(descriptors.len(), 2);
        assert_eq!(descriptors[0].timeout_seconds, 30);
        // Defaults applied where omitted
        assert_eq!(descriptors[1].timeout_seconds, 120);
        assert_eq!(descriptors[1].max_retries, 2);
    }

    #[test]
    fn test_descriptor_yaml_duplicate_stage() {
        let yaml = r#"
- name: a
  stage: discovery
  role: r
  model: m
- name: b
  stage: discovery
  role: r
  model: m
"#;
        assert!(AgentDescriptor::from_yaml(yaml).is_err());
    }
}
