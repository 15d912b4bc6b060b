//! CLI commands implementation

use anyhow::{Context, Result};
use llm_core::{OllamaClient, OllamaStatus};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

use crate::agent::{Agent, CycleOutcome};
use crate::config::{Overrides, RecapConfig};
use crate::report::{render_state, ConsoleReporter};
use crate::shutdown::{listen_for_signals, ShutdownToken};
use crate::state::StateStore;
use crate::summarizer::{OllamaGenerator, Summarizer, TextGenerator};

// ANSI color codes
const GREEN: &str = "\x1b[92m";
const RED: &str = "\x1b[91m";
const YELLOW: &str = "\x1b[93m";
const BLUE: &str = "\x1b[94m";
const BOLD: &str = "\x1b[1m";
const RESET: &str = "\x1b[0m";

fn print_status(ok: bool, msg: &str) {
    let icon = if ok {
        format!("{}✓{}", GREEN, RESET)
    } else {
        format!("{}✗{}", RED, RESET)
    };
    println!("  {} {}", icon, msg);
}

fn load_config(config_path: Option<&Path>, overrides: Overrides) -> Result<RecapConfig> {
    let config = RecapConfig::load(config_path).context("Failed to load configuration")?;
    Ok(config.with_overrides(overrides))
}

/// Build the agent after confirming Ollama answers
async fn start_agent(config: &RecapConfig) -> Result<Agent> {
    let base_url = config.ollama.base_url();
    let client = OllamaClient::new(&base_url)?;
    let generator = Arc::new(OllamaGenerator::new(client, config.ollama.probe_timeout()));

    if !generator.is_available().await {
        print_status(false, &format!("Ollama is not reachable at {}", base_url));
        println!("\n  Start with: {}ollama serve{}", BLUE, RESET);
        anyhow::bail!("Ollama is not reachable at {}", base_url);
    }

    let summarizer = Summarizer::new(
        generator,
        config.ollama.classify_timeout(),
        config.ollama.generate_timeout(),
    );

    Agent::new(
        config.agent.clone(),
        config.ollama.model.clone(),
        summarizer,
        Arc::new(ConsoleReporter::new()),
    )
}

/// Monitor the directory until interrupted
pub async fn run(config_path: Option<&Path>, overrides: Overrides) -> Result<()> {
    let config = load_config(config_path, overrides)?;
    let mut agent = start_agent(&config).await?;

    let shutdown = ShutdownToken::new();
    listen_for_signals(shutdown.clone());
    agent.run(&shutdown).await;
    debug!(
        phase = %agent.phase(),
        files = agent.state().map_or(0, |s| s.total_files),
        "Agent finished"
    );

    Ok(())
}

/// Process whatever is new once, then print the state
pub async fn once(config_path: Option<&Path>, overrides: Overrides) -> Result<()> {
    let config = load_config(config_path, overrides)?;
    let mut agent = start_agent(&config).await?;

    let shutdown = ShutdownToken::new();
    listen_for_signals(shutdown.clone());

    let outcome = agent.run_once(&shutdown).await?;
    debug!(
        ?outcome,
        files = agent.state().map_or(0, |s| s.total_files),
        "Single cycle finished"
    );
    if let CycleOutcome::CollaboratorUnavailable = outcome {
        anyhow::bail!("Ollama became unavailable before the cycle started");
    }

    Ok(())
}

/// Print the persisted state without contacting the model
pub async fn status(config_path: Option<&Path>, overrides: Overrides) -> Result<()> {
    let config = load_config(config_path, overrides)?;
    let store = StateStore::new(&config.agent.output_file);

    match store.load() {
        Some(state) => print!("{}", render_state(&state)),
        None => {
            println!("No summary state at {}", store.path().display());
            println!("Run '{}recap once{}' to create one.", BLUE, RESET);
        }
    }

    Ok(())
}

/// Probe Ollama and confirm the configured model is installed
pub async fn check(config_path: Option<&Path>, overrides: Overrides) -> Result<()> {
    let config = load_config(config_path, overrides)?;
    let base_url = config.ollama.base_url();
    let client = OllamaClient::new(&base_url)?;

    println!("{}Ollama{}", BOLD, RESET);
    println!("  Endpoint: {}", client.base_url());

    match client.status(config.ollama.probe_timeout()).await {
        OllamaStatus::Running => print_status(true, "Ollama is running"),
        OllamaStatus::Stopped => {
            print_status(false, "Ollama is not running");
            println!("\n  Start with: {}ollama serve{}", BLUE, RESET);
            anyhow::bail!("Ollama is not reachable at {}", base_url);
        }
    }

    let mut models = client.list_models().await?;
    models.sort_by(|a, b| a.name.cmp(&b.name));

    println!("\n{}Installed Models ({}){}", BOLD, models.len(), RESET);
    for m in &models {
        println!("  - {} ({})", m.name, m.size_human());
    }

    let wanted = &config.ollama.model;
    let latest = format!("{}:latest", wanted);
    let installed = models.iter().any(|m| &m.name == wanted || m.name == latest);
    println!();
    if installed {
        print_status(true, &format!("Model {} is installed", wanted));
    } else {
        println!(
            "  {}⚠{} Model {} is not installed. Pull it with: {}ollama pull {}{}",
            YELLOW, RESET, wanted, BLUE, wanted, RESET
        );
    }

    let dir = &config.agent.monitor_dir;
    print_status(dir.is_dir(), &format!("Monitor directory: {}", dir.display()));

    Ok(())
}

// Config management commands

fn resolve_config_path(explicit: Option<&Path>) -> Result<PathBuf> {
    match explicit {
        Some(path) => Ok(path.to_path_buf()),
        None => RecapConfig::config_path(),
    }
}

/// Create default config file
pub async fn config_init(config_path: Option<&Path>) -> Result<()> {
    let path = resolve_config_path(config_path)?;

    if path.exists() {
        println!("Config file already exists: {}", path.display());
        return Ok(());
    }

    RecapConfig::create_default(&path)?;
    println!("{}Created:{} {}", GREEN, RESET, path.display());
    println!("\nEdit this file to customize the agent.");

    Ok(())
}

/// Show the effective configuration
pub async fn config_show(config_path: Option<&Path>) -> Result<()> {
    let path = resolve_config_path(config_path)?;
    let config = RecapConfig::load(config_path)?;

    println!("{}Configuration{}", BOLD, RESET);
    if path.exists() {
        println!("  Path: {}", path.display());
    } else {
        println!("  Path: {} (not found, using defaults)", path.display());
    }
    println!();
    print!("{}", config.to_toml()?);

    Ok(())
}

/// Print config file path
pub async fn config_path(config_path: Option<&Path>) -> Result<()> {
    let path = resolve_config_path(config_path)?;
    println!("{}", path.display());

    Ok(())
}
