//! recap: continuous video-summary consolidation
//!
//! Watches a directory of video summaries and keeps one consolidated
//! description up to date with a local Ollama model.

mod agent;
mod commands;
mod config;
mod ingest;
mod report;
mod shutdown;
mod state;
mod summarizer;

use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use crate::config::Overrides;

#[derive(Debug, Parser)]
#[command(name = "recap")]
#[command(about = "Consolidate video summaries with a local LLM", version)]
#[command(propagate_version = true)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Config file (default: ~/.config/recap/config.toml)
    #[arg(short, long, global = true, env = "RECAP_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Monitor the directory continuously (default)
    Run(AgentArgs),

    /// Process new files once and print the result
    Once(AgentArgs),

    /// Show the persisted summary state
    Status(AgentArgs),

    /// Check Ollama and the configured model
    Check(AgentArgs),

    /// Manage the configuration file
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Debug, Args)]
struct AgentArgs {
    /// Directory containing summary files
    #[arg(short, long, env = "RECAP_DIR")]
    dir: Option<PathBuf>,

    /// Consolidated state file
    #[arg(short, long, env = "RECAP_OUTPUT")]
    output: Option<PathBuf>,

    /// Ollama model
    #[arg(short, long, env = "RECAP_MODEL")]
    model: Option<String>,

    /// Ollama base URL
    #[arg(long, env = "RECAP_OLLAMA_URL")]
    ollama_url: Option<String>,

    /// Seconds between checks
    #[arg(short, long, env = "RECAP_INTERVAL")]
    interval: Option<u64>,
}

impl From<AgentArgs> for Overrides {
    fn from(args: AgentArgs) -> Self {
        Overrides {
            monitor_dir: args.dir,
            output_file: args.output,
            model: args.model,
            ollama_url: args.ollama_url,
            poll_interval_secs: args.interval,
        }
    }
}

#[derive(Debug, Subcommand)]
enum ConfigAction {
    /// Create a default config file
    Init,
    /// Show the effective configuration
    Show,
    /// Print the config file path
    Path,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Setup logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let config = cli.config.as_deref();

    match cli.command {
        Some(Commands::Run(args)) => commands::run(config, args.into()).await,
        Some(Commands::Once(args)) => commands::once(config, args.into()).await,
        Some(Commands::Status(args)) => commands::status(config, args.into()).await,
        Some(Commands::Check(args)) => commands::check(config, args.into()).await,
        Some(Commands::Config { action }) => match action {
            ConfigAction::Init => commands::config_init(config).await,
            ConfigAction::Show => commands::config_show(config).await,
            ConfigAction::Path => commands::config_path(config).await,
        },
        None => {
            // Default to continuous monitoring
            commands::run(config, Overrides::default()).await
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_run_options_become_overrides() {
        let cli = Cli::try_parse_from([
            "recap", "run", "--dir", "/tmp/in", "--model", "gemma3:4b", "-i", "5",
        ])
        .unwrap();

        let Some(Commands::Run(args)) = cli.command else {
            panic!("expected run");
        };
        let overrides: Overrides = args.into();
        assert_eq!(overrides.monitor_dir, Some(PathBuf::from("/tmp/in")));
        assert_eq!(overrides.model.as_deref(), Some("gemma3:4b"));
        assert_eq!(overrides.poll_interval_secs, Some(5));
        assert!(overrides.output_file.is_none());
    }

    #[test]
    fn test_no_subcommand_defaults_to_run() {
        let cli = Cli::try_parse_from(["recap", "-v"]).unwrap();
        assert!(cli.verbose);
        assert!(cli.command.is_none());
    }
}
