//! Agent configuration
//!
//! Configuration file: ~/.config/recap/config.toml (or platform equivalent)

use anyhow::{Context, Result};
use llm_core::OllamaConfig;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Full configuration for the recap agent
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RecapConfig {
    /// Language-model server settings
    #[serde(default)]
    pub ollama: OllamaConfig,

    /// Directory polling settings
    #[serde(default)]
    pub agent: AgentConfig,
}

/// `[agent]` section
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Directory scanned for summary files
    #[serde(default = "default_monitor_dir")]
    pub monitor_dir: PathBuf,

    /// Persisted state file; relative paths resolve against the working directory
    #[serde(default = "default_output_file")]
    pub output_file: PathBuf,

    /// Seconds between two cycles
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,

    /// Extension of input files (without dot)
    #[serde(default = "default_extension")]
    pub extension: String,

    /// Parse attempts before a malformed file is set aside
    #[serde(default = "default_max_parse_attempts")]
    pub max_parse_attempts: u32,
}

fn default_monitor_dir() -> PathBuf {
    PathBuf::from("./video_summaries")
}

fn default_output_file() -> PathBuf {
    PathBuf::from("overall_summary.json")
}

fn default_poll_interval() -> u64 {
    30
}

fn default_extension() -> String {
    "json".to_string()
}

fn default_max_parse_attempts() -> u32 {
    3
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            monitor_dir: default_monitor_dir(),
            output_file: default_output_file(),
            poll_interval_secs: default_poll_interval(),
            extension: default_extension(),
            max_parse_attempts: default_max_parse_attempts(),
        }
    }
}

impl AgentConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }
}

/// Command-line overrides applied on top of the file configuration
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub monitor_dir: Option<PathBuf>,
    pub output_file: Option<PathBuf>,
    pub model: Option<String>,
    pub ollama_url: Option<String>,
    pub poll_interval_secs: Option<u64>,
}

impl RecapConfig {
    /// Load configuration from an explicit path, or the default location.
    ///
    /// A missing default file yields the built-in defaults; a missing explicit
    /// file is an error.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        match explicit {
            Some(path) => Self::load_from(path),
            None => {
                let path = Self::config_path()?;
                if !path.exists() {
                    return Ok(Self::default());
                }
                Self::load_from(&path)
            }
        }
    }

    /// Load configuration from a specific path
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config from {}", path.display()))?;

        toml::from_str(&content)
            .with_context(|| format!("Failed to parse config from {}", path.display()))
    }

    /// Get the configuration file path
    pub fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not determine config directory"))?;

        Ok(config_dir.join("recap").join("config.toml"))
    }

    /// Apply command-line overrides
    pub fn with_overrides(mut self, overrides: Overrides) -> Self {
        if let Some(dir) = overrides.monitor_dir {
            self.agent.monitor_dir = dir;
        }
        if let Some(output) = overrides.output_file {
            self.agent.output_file = output;
        }
        if let Some(model) = overrides.model {
            self.ollama.model = model;
        }
        if let Some(url) = overrides.ollama_url {
            self.ollama.url = Some(url);
        }
        if let Some(secs) = overrides.poll_interval_secs {
            self.agent.poll_interval_secs = secs;
        }
        self
    }

    /// Render the effective configuration as TOML
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).context("Failed to serialize config")
    }

    /// Create a default configuration file with comments
    pub fn create_default(path: &Path) -> Result<()> {
        if path.exists() {
            anyhow::bail!("Config file already exists: {}", path.display());
        }

        // Create directory if needed
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let default_config = r#"# recap configuration
# Location: ~/.config/recap/config.toml

[ollama]
# Ollama server (url takes precedence over host/port when set)
host = "localhost"
port = 11434
# url = "http://localhost:11434"

# Model used for classification and summary generation
model = "deepseek-r1:8b"

# Timeouts in seconds
probe_timeout_secs = 5
classify_timeout_secs = 120
generate_timeout_secs = 180

[agent]
# Directory scanned for summary files
monitor_dir = "./video_summaries"

# Consolidated state file
output_file = "overall_summary.json"

# Seconds between checks
poll_interval_secs = 30

# Input file extension
extension = "json"

# Malformed files are retried this many times before being set aside
max_parse_attempts = 3
"#;

        fs::write(path, default_config)
            .with_context(|| format!("Failed to write {}", path.display()))?;

        Ok(())
    }
}
