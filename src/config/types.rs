use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use super::defaults::*;

#[derive(Debug, Clone, Deserialize, Serialize, JsonSchema)]
pub struct Config {
    #[serde(default = "default_version")]
    pub version: u32,

    /// Which reasoning service backs every stage
    #[serde(default)]
    pub provider: Provider,

    /// Maximum number of reasoning calls in flight at once
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,

    #[serde(default = "default_report_dir")]
    pub report_dir: PathBuf,

    /// Where run checkpoints are kept for `axiom resume`
    #[serde(default = "default_state_dir")]
    pub state_dir: PathBuf,

    #[serde(default)]
    pub dry_run: bool,

    /// Per-call timeout for the reasoning service
    #[serde(default = "default_timeout_sec")]
    pub timeout_sec: u64,

    #[serde(default)]
    pub providers: ProvidersConfig,

    #[serde(default)]
    pub retry: RetryConfig,

    #[serde(default)]
    pub stages: StagesConfig,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum Provider {
    #[default]
    Gemini,
    ClaudeCli,
}

impl std::fmt::Display for Provider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Provider::Gemini => write!(f, "gemini"),
            Provider::ClaudeCli => write!(f, "claude_cli"),
        }
    }
}

impl std::str::FromStr for Provider {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "gemini" => Ok(Provider::Gemini),
            "claude_cli" | "claude" => Ok(Provider::ClaudeCli),
            _ => Err(format!("Unknown provider: {}", s)),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize, JsonSchema)]
pub struct ProvidersConfig {
    #[serde(default)]
    pub gemini: GeminiConfig,

    #[serde(default)]
    pub claude_cli: ClaudeCliConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize, JsonSchema)]
pub struct GeminiConfig {
    #[serde(default = "default_gemini_model")]
    pub model: String,

    /// Environment variable holding the API key
    #[serde(default = "default_gemini_api_key_env")]
    pub api_key_env: String,

    #[serde(default = "default_gemini_base_url")]
    pub base_url: String,

    /// Ask the model to return its thought parts for reasoning traces
    #[serde(default = "default_true")]
    pub include_thoughts: bool,
}

impl Default for GeminiConfig {
    fn default() -> Self {
        Self {
            model: default_gemini_model(),
            api_key_env: default_gemini_api_key_env(),
            base_url: default_gemini_base_url(),
            include_thoughts: true,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, JsonSchema)]
pub struct ClaudeCliConfig {
    #[serde(default = "default_claude_binary")]
    pub binary: PathBuf,

    #[serde(default = "default_claude_model")]
    pub model: String,
}

impl Default for ClaudeCliConfig {
    fn default() -> Self {
        Self {
            binary: default_claude_binary(),
            model: default_claude_model(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, JsonSchema)]
pub struct RetryConfig {
    /// Retries after the first attempt
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Linear backoff step: the nth retry waits `n * backoff_base_ms`
    #[serde(default = "default_backoff_base_ms")]
    pub backoff_base_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            backoff_base_ms: default_backoff_base_ms(),
        }
    }
}

/// Sampling settings for one pipeline stage
#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Serialize, JsonSchema)]
pub struct StageSettings {
    pub temperature: f32,
    pub max_tokens: u32,
}

impl From<StageDefaults> for StageSettings {
    fn from(d: StageDefaults) -> Self {
        Self {
            temperature: d.temperature,
            max_tokens: d.max_tokens,
        }
    }
}

fn decompose_settings() -> StageSettings {
    default_decompose_stage().into()
}

fn validate_settings() -> StageSettings {
    default_validate_stage().into()
}

fn synthesize_settings() -> StageSettings {
    default_synthesize_stage().into()
}

#[derive(Debug, Clone, Deserialize, Serialize, JsonSchema)]
pub struct StagesConfig {
    #[serde(default = "decompose_settings")]
    pub decompose: StageSettings,

    /// Subagent temperature; the token budget comes from each task
    #[serde(default = "default_execute_temperature")]
    pub execute_temperature: f32,

    #[serde(default = "validate_settings")]
    pub validate: StageSettings,

    #[serde(default = "synthesize_settings")]
    pub synthesize: StageSettings,
}

impl Default for StagesConfig {
    fn default() -> Self {
        Self {
            decompose: decompose_settings(),
            execute_temperature: default_execute_temperature(),
            validate: validate_settings(),
            synthesize: synthesize_settings(),
        }
    }
}
