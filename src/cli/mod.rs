pub mod resume;
pub mod run;
pub mod schema;
mod session;

use crate::config::{Config, Provider};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};

/// Config file picked up from the working directory when `--config` is absent
pub const DEFAULT_CONFIG: &str = "axiom.yaml";

#[derive(Parser)]
#[command(name = "axiom")]
#[command(
    author,
    version,
    about = "Research execution orchestrator: decompose, execute, validate and synthesize with LLM subagents"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Enable verbose/debug logging
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Research a question end to end and write the report
    Run(RunArgs),

    /// Continue an interrupted run from its checkpoint
    Resume(ResumeArgs),

    /// Print JSON Schema for config validation
    Schema,
}

/// Settings shared by every command that talks to the reasoning service
#[derive(Parser, Clone)]
pub struct ServiceArgs {
    /// Path to config file (defaults to ./axiom.yaml when present)
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Override max reasoning calls in flight
    #[arg(long)]
    pub concurrency: Option<usize>,

    /// Override the reasoning provider (gemini, claude_cli)
    #[arg(long)]
    pub provider: Option<Provider>,

    /// Override output directory
    #[arg(long)]
    pub report_dir: Option<PathBuf>,

    /// Print progress as JSON lines instead of text
    #[arg(long)]
    pub events: bool,
}

impl ServiceArgs {
    /// Load the config and apply command-line overrides.
    ///
    /// An explicit `--config` must exist; the implicit default may be absent.
    pub fn load_config(&self) -> anyhow::Result<Config> {
        let mut config = match &self.config {
            Some(path) => Config::load(path)?,
            None => Config::load_or_default(Path::new(DEFAULT_CONFIG))?,
        };

        if let Some(concurrency) = self.concurrency {
            config.concurrency = concurrency;
        }
        if let Some(provider) = self.provider {
            config.provider = provider;
        }
        if let Some(report_dir) = &self.report_dir {
            config.report_dir = report_dir.clone();
        }

        config.validate()?;
        Ok(config)
    }
}

#[derive(Parser, Clone)]
pub struct RunArgs {
    /// The research question
    pub question: String,

    /// Additional context passed to every stage
    #[arg(long)]
    pub context: Option<String>,

    /// Show plan without executing
    #[arg(long)]
    pub dry_run: bool,

    #[command(flatten)]
    pub service: ServiceArgs,
}

#[derive(Parser, Clone)]
pub struct ResumeArgs {
    /// Checkpoint written by an earlier `axiom run`
    #[arg(value_name = "CHECKPOINT")]
    pub checkpoint: PathBuf,

    #[command(flatten)]
    pub service: ServiceArgs,
}
