//! Ollama-backed stage agents.
//!
//! Each stage talks to one local model via the Ollama generate API. The
//! discovery agent additionally consumes the dataset capability so that
//! file handles never cross into the coordinator.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::core::registry::AgentDescriptor;
use crate::domain::{StageName, StageTask};

use super::dataset::{DatasetProfile, DatasetReader};
use super::{AgentError, StageAgent};

const DEFAULT_HOST: &str = "http://localhost:11434";

/// Thin client for the Ollama generate endpoint.
pub struct OllamaClient {
    base_url: String,
    client: reqwest::Client,
}

#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
    format: &'a str,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    response: String,
}

impl OllamaClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            client: reqwest::Client::new(),
        }
    }

    /// Create from the OLLAMA_HOST environment variable, falling back to
    /// the default local endpoint.
    pub fn from_env() -> Self {
        let base_url =
            std::env::var("OLLAMA_HOST").unwrap_or_else(|_| DEFAULT_HOST.to_string());
        Self::new(base_url)
    }

    /// Run one non-streaming generation and return the reply text.
    pub async fn generate(&self, model: &str, prompt: &str) -> Result<String, AgentError> {
        let url = format!("{}/api/generate", self.base_url.trim_end_matches('/'));
        let body = GenerateRequest {
            model,
            prompt,
            stream: false,
            format: "json",
        };

        let response = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| AgentError::Transport(format!("ollama request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(AgentError::Transport(format!(
                "ollama returned {} for model '{}': {}",
                status,
                model,
                text.trim()
            )));
        }

        let parsed: GenerateResponse = response
            .json()
            .await
            .map_err(|e| AgentError::Transport(format!("malformed ollama response: {}", e)))?;

        Ok(parsed.response)
    }
}

/// A stage agent backed by one Ollama model.
pub struct OllamaAgent {
    name: String,
    stage: StageName,
    role: String,
    model: String,
    client: Arc<OllamaClient>,

    /// Wired for the discovery agent only
    dataset: Option<Arc<DatasetReader>>,
}

impl OllamaAgent {
    pub fn from_descriptor(
        descriptor: &AgentDescriptor,
        client: Arc<OllamaClient>,
        dataset: Option<Arc<DatasetReader>>,
    ) -> Self {
        Self {
            name: descriptor.name.clone(),
            stage: descriptor.stage,
            role: descriptor.role.clone(),
            model: descriptor.model.clone(),
            client,
            dataset,
        }
    }

    fn build_prompt(&self, task: &StageTask, profile: Option<&DatasetProfile>) -> String {
        let mut prompt = String::new();

        prompt.push_str(&format!(
            "You are the {} specialist of a data-science team. Role: {}.\n",
            self.stage.title(),
            self.role
        ));
        prompt.push_str(
            "Respond with a single JSON object: \
             {\"summary\": string, \"data\": object (optional), \
             \"confidence\": number between 0 and 1}.\n\n",
        );

        prompt.push_str(&format!("Request: {}\n", task.payload.request));

        if let Some(profile) = profile {
            prompt.push_str(&format!(
                "Dataset: {} ({} bytes, {} rows, columns: {})\n",
                profile.path.display(),
                profile.size_bytes,
                profile.row_count,
                profile.columns.join(", ")
            ));
        }

        for (stage, summary) in &task.payload.upstream {
            prompt.push_str(&format!("{} output: {}\n", stage.title(), summary));
        }

        if let Some(directive) = &task.payload.directive {
            prompt.push_str(&format!("Directive: {}\n", directive));
        }

        prompt
    }
}

#[async_trait]
impl StageAgent for OllamaAgent {
    fn name(&self) -> &str {
        &self.name
    }

    async fn invoke(&self, task: &StageTask) -> Result<String, AgentError> {
        // Discovery profiles the dataset before consulting the model; the
        // handle is released here, before any result exists.
        let profile = match &self.dataset {
            Some(reader) => Some(
                reader
                    .resolve(task.payload.dataset_path.as_deref())
                    .await
                    .map_err(|e| AgentError::Resource(e.to_string()))?,
            ),
            None => None,
        };

        let prompt = self.build_prompt(task, profile.as_ref());
        self.client.generate(&self.model, &prompt).await
    }
}
