use std::path::PathBuf;

pub fn default_version() -> u32 {
    1
}

pub fn default_concurrency() -> usize {
    3
}

pub fn default_report_dir() -> PathBuf {
    PathBuf::from("reports")
}

pub fn default_state_dir() -> PathBuf {
    PathBuf::from(".axiom")
}

pub fn default_timeout_sec() -> u64 {
    120
}

pub fn default_gemini_model() -> String {
    "gemini-2.0-flash-thinking-exp-01-21".to_string()
}

pub fn default_gemini_api_key_env() -> String {
    "GEMINI_API_KEY".to_string()
}

pub fn default_gemini_base_url() -> String {
    "https://generativelanguage.googleapis.com/v1beta".to_string()
}

pub fn default_claude_binary() -> PathBuf {
    // Check common install location first
    if let Some(home) = std::env::var_os("HOME") {
        let local_path = PathBuf::from(home).join(".claude/local/claude");
        if local_path.exists() {
            return local_path;
        }
    }
    // Fall back to PATH lookup
    PathBuf::from("claude")
}

pub fn default_claude_model() -> String {
    "sonnet".to_string()
}

pub fn default_max_retries() -> u32 {
    2
}

pub fn default_backoff_base_ms() -> u64 {
    1000
}

pub fn default_true() -> bool {
    true
}

pub fn default_decompose_stage() -> StageDefaults {
    StageDefaults {
        temperature: 0.0,
        max_tokens: 4000,
    }
}

pub fn default_execute_temperature() -> f32 {
    0.3
}

pub fn default_validate_stage() -> StageDefaults {
    StageDefaults {
        temperature: 0.2,
        max_tokens: 3000,
    }
}

pub fn default_synthesize_stage() -> StageDefaults {
    StageDefaults {
        temperature: 0.3,
        max_tokens: 4000,
    }
}

/// Plain pair used to seed `StageSettings` without a dependency on types.rs
pub struct StageDefaults {
    pub temperature: f32,
    pub max_tokens: u32,
}
