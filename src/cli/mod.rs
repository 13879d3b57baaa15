//! Command-line interface for datapilot.
//!
//! Provides commands for running an analysis, inspecting run logs,
//! listing past runs, and showing the agent team and configuration.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing::warn;
use uuid::Uuid;

use crate::agents::{DatasetReader, OllamaAgent, OllamaClient};
use crate::config;
use crate::core::{AgentDescriptor, AgentRegistry, Coordinator};
use crate::domain::{StageName, WorkflowRequest};
use crate::history::RunHistory;
use crate::report::ReportRenderer;

/// datapilot - multi-agent data analysis orchestrator
#[derive(Parser, Debug)]
#[command(name = "datapilot")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run an analysis workflow
    Analyze {
        /// The request, e.g. "analyze the car sales dataset"
        request: Vec<String>,

        /// Dataset file (first CSV in the data directory if not given)
        #[arg(short, long)]
        data: Option<PathBuf>,

        /// Agent descriptor file (built-in team if not given)
        #[arg(long)]
        agents: Option<PathBuf>,
    },

    /// Show the event log of a run
    Status {
        /// Run ID (UUID)
        run_id: String,
    },

    /// List recent runs
    Runs {
        /// Maximum number of runs to show
        #[arg(short, long, default_value = "10")]
        limit: usize,
    },

    /// Show the registered agent team
    Agents,

    /// Show resolved configuration (debug)
    Config,
}

impl Cli {
    pub async fn execute(self) -> Result<()> {
        match self.command {
            Commands::Analyze {
                request,
                data,
                agents,
            } => analyze(request.join(" "), data, agents).await,
            Commands::Status { run_id } => status(&run_id).await,
            Commands::Runs { limit } => runs(limit),
            Commands::Agents => list_agents(),
            Commands::Config => show_config(),
        }
    }
}

/// Build the agent team: descriptors (file or built-in defaults, with
/// config overrides) bound to Ollama-backed agents.
fn build_registry(agents_file: Option<PathBuf>) -> Result<Arc<AgentRegistry>> {
    let cfg = config::config()?;

    let descriptors_path = agents_file.unwrap_or_else(|| cfg.agents_path());
    let mut descriptors = if descriptors_path.exists() {
        AgentDescriptor::from_file(&descriptors_path)?
    } else {
        AgentDescriptor::defaults()
    };

    if let Some(timeout) = cfg.workflow.stage_timeout_seconds {
        for d in &mut descriptors {
            d.timeout_seconds = timeout;
        }
    }
    if let Some(max_retries) = cfg.workflow.max_retries {
        for d in &mut descriptors {
            d.max_retries = max_retries;
        }
    }

    let client = Arc::new(OllamaClient::new(cfg.ollama_host.clone()));
    let reader = Arc::new(DatasetReader::new(cfg.data_dir.clone()));

    let mut registry = AgentRegistry::new();
    for descriptor in descriptors {
        // Only discovery touches the dataset capability
        let dataset = (descriptor.stage == StageName::Discovery).then(|| reader.clone());
        let agent = Arc::new(OllamaAgent::from_descriptor(
            &descriptor,
            client.clone(),
            dataset,
        ));
        registry.register(descriptor, agent)?;
    }

    Ok(Arc::new(registry))
}

async fn analyze(text: String, data: Option<PathBuf>, agents: Option<PathBuf>) -> Result<()> {
    if text.trim().is_empty() {
        anyhow::bail!("Empty request; tell me what to analyze");
    }

    let cfg = config::config()?;
    let registry = build_registry(agents)?;

    let mut request = WorkflowRequest::new(text.clone());
    if let Some(path) = data {
        request = request.with_dataset(path);
    }

    let coordinator = Coordinator::new(registry, cfg.runs_dir())
        .with_renderer(ReportRenderer::new(cfg.reports_dir.clone()));

    // Ctrl-C cancels the run instead of killing the process mid-write
    let cancel = CancellationToken::new();
    let signal_token = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received, cancelling run");
            signal_token.cancel();
        }
    });

    let artifact = coordinator.run(request, cancel).await?;

    // History is best-effort; a failed insert never hides the artifact
    match RunHistory::open(&cfg.history_path()) {
        Ok(history) => {
            if let Err(e) = history.record(&text, &artifact) {
                warn!(error = %e, "Failed to record run in history");
            }
        }
        Err(e) => warn!(error = %e, "Failed to open run history"),
    }

    println!("Run {} {}", artifact.run_id, artifact.outcome);
    println!();
    println!("{}", artifact.summary);
    println!();
    println!("Provenance:");
    for p in &artifact.provenance {
        println!("  {:22} {:?} ({} attempts)", p.stage.title(), p.disposition, p.attempts);
    }
    if let Some(path) = &artifact.report_path {
        println!();
        println!("Report: {}", path.display());
    }

    Ok(())
}

async fn status(run_id: &str) -> Result<()> {
    let cfg = config::config()?;
    let run_id = Uuid::parse_str(run_id).context("Invalid run ID")?;

    let registry = Arc::new(AgentRegistry::new());
    let coordinator = Coordinator::new(registry, cfg.runs_dir());

    let events = coordinator.run_events(run_id).await?;
    for event in events {
        let stage = event
            .stage
            .map(|s| s.to_string())
            .unwrap_or_else(|| "-".to_string());
        let attempt = event
            .attempt
            .map(|a| format!("#{}", a))
            .unwrap_or_default();
        println!(
            "{}  {:16} {:12}{:3}  {}",
            event.timestamp.format("%H:%M:%S%.3f"),
            format!("{:?}", event.event_type),
            stage,
            attempt,
            event.detail
        );
    }

    Ok(())
}

fn runs(limit: usize) -> Result<()> {
    let cfg = config::config()?;
    let history = RunHistory::open(&cfg.history_path())?;

    let records = history.recent(limit)?;
    if records.is_empty() {
        println!("No runs recorded yet");
        return Ok(());
    }

    for record in records {
        println!(
            "{}  {:9}  {}",
            record.run_id,
            record.outcome,
            record.request
        );
    }

    Ok(())
}

fn list_agents() -> Result<()> {
    let registry = build_registry(None)?;

    for descriptor in registry.descriptors() {
        println!(
            "{:12} {:24} {:22} timeout={}s retries={}",
            descriptor.stage.to_string(),
            descriptor.name,
            descriptor.model,
            descriptor.timeout_seconds,
            descriptor.max_retries
        );
    }

    Ok(())
}

fn show_config() -> Result<()> {
    let cfg = config::config()?;

    println!("home:        {}", cfg.home.display());
    println!("runs:        {}", cfg.runs_dir().display());
    println!("data:        {}", cfg.data_dir.display());
    println!("reports:     {}", cfg.reports_dir.display());
    println!("history:     {}", cfg.history_path().display());
    println!("ollama:      {}", cfg.ollama_host);
    match &cfg.config_file {
        Some(path) => println!("config file: {}", path.display()),
        None => println!("config file: (none, using defaults)"),
    }

    Ok(())
}
