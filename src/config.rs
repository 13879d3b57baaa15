//! Configuration for datapilot paths and workflow defaults.
//!
//! Configuration sources (highest priority first):
//! 1. Environment variables (DATAPILOT_HOME, DATAPILOT_DATA, OLLAMA_HOST)
//! 2. Config file (.datapilot/config.yaml)
//! 3. Defaults (~/.datapilot, ./data, ./reports)
//!
//! Config file discovery:
//! - Searches current directory and parents for .datapilot/config.yaml
//! - Paths in the config file are relative to the project root (the
//!   parent of the .datapilot directory)

use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use anyhow::{Context, Result};
use serde::Deserialize;

/// Global cached configuration (stores Result to handle init errors)
static CONFIG: OnceLock<std::result::Result<ResolvedConfig, String>> = OnceLock::new();

/// Raw config file schema (matches YAML structure)
#[derive(Debug, Clone, Deserialize)]
pub struct ConfigFile {
    pub version: String,
    #[serde(default)]
    pub paths: PathsConfig,
    #[serde(default)]
    pub ollama: Option<OllamaConfig>,
    #[serde(default)]
    pub workflow: Option<WorkflowConfig>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PathsConfig {
    /// Engine state directory (runs, history, agents file)
    pub home: Option<String>,
    /// Dataset directory
    pub data: Option<String>,
    /// Rendered report directory
    pub reports: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OllamaConfig {
    pub host: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WorkflowConfig {
    pub stage_timeout_seconds: Option<u64>,
    pub max_retries: Option<u32>,
}

/// Per-stage policy overrides applied on top of descriptor defaults.
#[derive(Debug, Clone, Default)]
pub struct WorkflowOverrides {
    pub stage_timeout_seconds: Option<u64>,
    pub max_retries: Option<u32>,
}

/// Resolved configuration with absolute paths
#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    /// Engine state directory
    pub home: PathBuf,
    /// Dataset directory
    pub data_dir: PathBuf,
    /// Rendered report directory
    pub reports_dir: PathBuf,
    /// Ollama endpoint
    pub ollama_host: String,
    /// Workflow policy overrides
    pub workflow: WorkflowOverrides,
    /// Path to config file (if found)
    pub config_file: Option<PathBuf>,
}

impl ResolvedConfig {
    /// Run log directory ($HOME/runs)
    pub fn runs_dir(&self) -> PathBuf {
        self.home.join("runs")
    }

    /// Session history database ($HOME/history.db)
    pub fn history_path(&self) -> PathBuf {
        self.home.join("history.db")
    }

    /// Agent descriptor file ($HOME/agents.yaml), optional
    pub fn agents_path(&self) -> PathBuf {
        self.home.join("agents.yaml")
    }
}

const DEFAULT_OLLAMA_HOST: &str = "http://localhost:11434";

/// Find config file by searching current directory and parents
fn find_config_file() -> Option<PathBuf> {
    let mut current = std::env::current_dir().ok()?;

    loop {
        let config_path = current.join(".datapilot").join("config.yaml");
        if config_path.exists() {
            return Some(config_path);
        }

        if !current.pop() {
            break;
        }
    }

    None
}

/// Load and parse config file
fn load_config_file(path: &Path) -> Result<ConfigFile> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    serde_yaml::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {}", path.display()))
}

/// Resolve a path that may be relative to a base directory
fn resolve_path(base: &Path, path_str: &str) -> PathBuf {
    let path = PathBuf::from(path_str);
    if path.is_absolute() {
        path
    } else {
        base.join(path)
            .canonicalize()
            .unwrap_or_else(|_| base.join(path_str))
    }
}

/// Load configuration from all sources
fn load_config() -> Result<ResolvedConfig> {
    let default_home = dirs::home_dir()
        .context("Failed to determine home directory")?
        .join(".datapilot");

    let config_file = find_config_file();

    let (file, base_dir) = match &config_file {
        Some(config_path) => {
            let file = load_config_file(config_path)?;
            // Project root is the parent of .datapilot/
            let base = config_path
                .parent()
                .and_then(|p| p.parent())
                .unwrap_or(Path::new("."))
                .to_path_buf();
            (Some(file), base)
        }
        None => (None, std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."))),
    };

    let home = if let Ok(env_home) = std::env::var("DATAPILOT_HOME") {
        PathBuf::from(env_home)
    } else if let Some(home_path) = file.as_ref().and_then(|f| f.paths.home.as_ref()) {
        resolve_path(&base_dir, home_path)
    } else {
        default_home
    };

    let data_dir = if let Ok(env_data) = std::env::var("DATAPILOT_DATA") {
        PathBuf::from(env_data)
    } else if let Some(data_path) = file.as_ref().and_then(|f| f.paths.data.as_ref()) {
        resolve_path(&base_dir, data_path)
    } else {
        base_dir.join("data")
    };

    let reports_dir = if let Some(reports_path) = file.as_ref().and_then(|f| f.paths.reports.as_ref())
    {
        resolve_path(&base_dir, reports_path)
    } else {
        base_dir.join("reports")
    };

    let ollama_host = if let Ok(env_host) = std::env::var("OLLAMA_HOST") {
        env_host
    } else {
        file.as_ref()
            .and_then(|f| f.ollama.as_ref())
            .and_then(|o| o.host.clone())
            .unwrap_or_else(|| DEFAULT_OLLAMA_HOST.to_string())
    };

    let workflow = file
        .as_ref()
        .and_then(|f| f.workflow.as_ref())
        .map(|w| WorkflowOverrides {
            stage_timeout_seconds: w.stage_timeout_seconds,
            max_retries: w.max_retries,
        })
        .unwrap_or_default();

    Ok(ResolvedConfig {
        home,
        data_dir,
        reports_dir,
        ollama_host,
        workflow,
        config_file,
    })
}

/// Get the global configuration (loads once, then cached)
pub fn config() -> Result<&'static ResolvedConfig> {
    let result = CONFIG.get_or_init(|| load_config().map_err(|e| e.to_string()));

    match result {
        Ok(config) => Ok(config),
        Err(e) => anyhow::bail!("{}", e),
    }
}

/// Force reload configuration (useful for testing)
pub fn reload_config() -> Result<ResolvedConfig> {
    load_config()
}
