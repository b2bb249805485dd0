use super::{Backend, Completion, CompletionRequest};
use crate::error::ServiceError;
use async_trait::async_trait;
use std::path::PathBuf;
use std::time::Duration;
use tokio::process::Command;
use tokio::time::timeout as tokio_timeout;
use tracing::debug;

pub struct ClaudeCliBackend {
    pub binary: PathBuf,
    pub model: String,
    pub timeout: Duration,
}

#[async_trait]
impl Backend for ClaudeCliBackend {
    fn name(&self) -> &'static str {
        "claude_cli"
    }

    async fn generate(&self, request: &CompletionRequest) -> Result<Completion, ServiceError> {
        // Use string for PATH lookup if not an absolute/relative path
        let binary_str = self.binary.to_string_lossy();
        let mut cmd = if binary_str.contains('/') || binary_str.contains('\\') {
            Command::new(&self.binary)
        } else {
            Command::new(binary_str.as_ref())
        };

        // The CLI has no sampling flags
        debug!(
            "claude_cli ignores temperature={} max_tokens={}",
            request.temperature, request.max_tokens
        );

        cmd.arg("-p")
            .arg(&request.user_prompt)
            .arg("--system-prompt")
            .arg(&request.system_prompt)
            .arg("--model")
            .arg(&self.model)
            .arg("--output-format")
            .arg("json");

        let output = tokio_timeout(self.timeout, cmd.output())
            .await
            .map_err(|_| ServiceError::Timeout(self.timeout))?
            .map_err(ServiceError::Io)?;

        let stdout = String::from_utf8_lossy(&output.stdout).to_string();
        let stderr = String::from_utf8_lossy(&output.stderr).to_string();

        if !output.status.success() {
            if looks_like_auth_failure(&stderr) || looks_like_auth_failure(&stdout) {
                return Err(ServiceError::Auth {
                    provider: "claude_cli".to_string(),
                    message: stderr.trim().to_string(),
                });
            }
            return Err(ServiceError::NonZeroExit {
                code: output.status.code().unwrap_or(-1),
                stderr,
            });
        }

        Ok(Completion::text(unwrap_result_envelope(&stdout)))
    }
}

fn looks_like_auth_failure(text: &str) -> bool {
    let lower = text.to_lowercase();
    lower.contains("api key") || lower.contains("authentication") || lower.contains("/login")
}

/// Claude wraps the answer in {"result": "...", ...}
fn unwrap_result_envelope(stdout: &str) -> String {
    #[derive(serde::Deserialize)]
    struct ClaudeOutput {
        result: String,
    }

    match serde_json::from_str::<ClaudeOutput>(stdout.trim()) {
        Ok(out) => out.result,
        Err(_) => stdout.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unwrap_result_envelope() {
        let raw = r#"{"type":"result","result":"{\"tasks\": []}","session_id":"abc"}"#;
        assert_eq!(unwrap_result_envelope(raw), r#"{"tasks": []}"#);
    }

    #[test]
    fn test_unwrap_passes_plain_text_through() {
        assert_eq!(unwrap_result_envelope("plain answer"), "plain answer");
    }

    #[test]
    fn test_auth_failure_detection() {
        assert!(looks_like_auth_failure("Invalid API key · Please run /login"));
        assert!(!looks_like_auth_failure("rate limited, try again"));
    }
}
