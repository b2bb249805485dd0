//! Google Gemini `generateContent` backend.
//!
//! Thought parts (`"thought": true`) are collected into the completion's
//! thinking channel so subagent traces can be rebuilt from real reasoning.

use super::{Backend, Completion, CompletionRequest};
use crate::config::GeminiConfig;
use crate::error::ServiceError;
use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::debug;

pub struct GeminiBackend {
    client: Client,
    base_url: String,
    model: String,
    api_key_env: String,
    include_thoughts: bool,
}

impl GeminiBackend {
    pub fn new(config: &GeminiConfig, timeout: Duration) -> Result<Self, ServiceError> {
        let client = Client::builder()
            .timeout(timeout)
            .connect_timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| ServiceError::Request(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            api_key_env: config.api_key_env.clone(),
            include_thoughts: config.include_thoughts,
        })
    }

    /// The key is resolved per call so a missing key surfaces as an auth failure
    fn api_key(&self) -> Result<String, ServiceError> {
        std::env::var(&self.api_key_env)
            .ok()
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| ServiceError::Auth {
                provider: "gemini".to_string(),
                message: format!("API key not found, set {}", self.api_key_env),
            })
    }

    fn build_request_body(&self, request: &CompletionRequest) -> Value {
        let mut generation_config = json!({
            "temperature": request.temperature,
            "maxOutputTokens": request.max_tokens,
        });
        if self.include_thoughts {
            generation_config["thinkingConfig"] = json!({ "includeThoughts": true });
        }

        json!({
            "systemInstruction": { "parts": [{ "text": request.system_prompt }] },
            "contents": [{ "role": "user", "parts": [{ "text": request.user_prompt }] }],
            "generationConfig": generation_config,
        })
    }

    fn map_http_error(status: reqwest::StatusCode, body_text: &str) -> ServiceError {
        match status.as_u16() {
            401 | 403 => ServiceError::Auth {
                provider: "gemini".to_string(),
                message: format!("HTTP {}", status),
            },
            _ => ServiceError::Request(format!("HTTP {} from Gemini API: {}", status, body_text)),
        }
    }
}

/// Split the first candidate's parts into answer text and thought text
fn parse_response(data: &Value) -> Completion {
    let mut text = String::new();
    let mut thinking = String::new();

    if let Some(parts) = data["candidates"][0]["content"]["parts"].as_array() {
        for part in parts {
            let Some(part_text) = part.get("text").and_then(|t| t.as_str()) else {
                continue;
            };
            if part.get("thought").and_then(|t| t.as_bool()).unwrap_or(false) {
                if !thinking.is_empty() {
                    thinking.push('\n');
                }
                thinking.push_str(part_text);
            } else {
                text.push_str(part_text);
            }
        }
    }

    Completion {
        text,
        thinking: (!thinking.trim().is_empty()).then_some(thinking),
    }
}

#[async_trait]
impl Backend for GeminiBackend {
    fn name(&self) -> &'static str {
        "gemini"
    }

    async fn generate(&self, request: &CompletionRequest) -> Result<Completion, ServiceError> {
        let api_key = self.api_key()?;
        let url = format!("{}/models/{}:generateContent", self.base_url, self.model);
        let body = self.build_request_body(request);

        debug!(
            model = self.model.as_str(),
            prompt_bytes = request.user_prompt.len(),
            "Sending Gemini completion request"
        );

        let response = self
            .client
            .post(&url)
            .header("content-type", "application/json")
            .header("x-goog-api-key", api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| ServiceError::Request(format!("Request to Gemini API failed: {}", e)))?;

        let status = response.status();
        let body_text = response
            .text()
            .await
            .map_err(|e| ServiceError::Request(format!("Failed to read response body: {}", e)))?;

        if !status.is_success() {
            return Err(Self::map_http_error(status, &body_text));
        }

        let data: Value = serde_json::from_str(&body_text)
            .map_err(|e| ServiceError::Request(format!("Invalid JSON in response: {}", e)))?;

        Ok(parse_response(&data))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn backend(include_thoughts: bool) -> GeminiBackend {
        let config = GeminiConfig {
            include_thoughts,
            ..GeminiConfig::default()
        };
        GeminiBackend::new(&config, Duration::from_secs(5)).unwrap()
    }

    #[test]
    fn test_parse_response_separates_thoughts() {
        let data = json!({
            "candidates": [{
                "content": {
                    "parts": [
                        { "text": "Consider the supply side", "thought": true },
                        { "text": "Verify confidence", "thought": true },
                        { "text": "{\"output\": \"done\"}" }
                    ]
                }
            }]
        });

        let completion = parse_response(&data);
        assert_eq!(completion.text, "{\"output\": \"done\"}");
        assert_eq!(
            completion.thinking.as_deref(),
            Some("Consider the supply side\nVerify confidence")
        );
    }

    #[test]
    fn test_parse_response_without_candidates() {
        let completion = parse_response(&json!({ "promptFeedback": {} }));
        assert!(completion.text.is_empty());
        assert!(completion.thinking.is_none());
    }

    #[test]
    fn test_request_body_shape() {
        let request = CompletionRequest {
            system_prompt: "sys".to_string(),
            user_prompt: "user".to_string(),
            temperature: 0.2,
            max_tokens: 3000,
        };

        let body = backend(true).build_request_body(&request);
        assert_eq!(body["systemInstruction"]["parts"][0]["text"], "sys");
        assert_eq!(body["contents"][0]["parts"][0]["text"], "user");
        assert_eq!(body["generationConfig"]["maxOutputTokens"], 3000);
        assert_eq!(
            body["generationConfig"]["thinkingConfig"]["includeThoughts"],
            true
        );

        let body = backend(false).build_request_body(&request);
        assert!(body["generationConfig"].get("thinkingConfig").is_none());
    }

    #[test]
    fn test_http_error_mapping() {
        let err = GeminiBackend::map_http_error(reqwest::StatusCode::UNAUTHORIZED, "");
        assert!(!err.is_retryable());

        let err = GeminiBackend::map_http_error(reqwest::StatusCode::TOO_MANY_REQUESTS, "slow down");
        assert!(err.is_retryable());
    }
}
