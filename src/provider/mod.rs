mod claude;
mod gemini;

pub use claude::ClaudeCliBackend;
pub use gemini::GeminiBackend;

use crate::config::{Config, Provider};
use crate::error::ServiceError;
use async_trait::async_trait;
use std::sync::Arc;

/// One text-completion request to the reasoning service
#[derive(Debug, Clone)]
pub struct CompletionRequest {
    pub system_prompt: String,
    pub user_prompt: String,
    pub temperature: f32,
    pub max_tokens: u32,
}

/// Raw service output: the answer text plus any thinking channel
#[derive(Debug, Clone, Default)]
pub struct Completion {
    pub text: String,
    pub thinking: Option<String>,
}

impl Completion {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            thinking: None,
        }
    }
}

#[async_trait]
pub trait Backend: Send + Sync {
    fn name(&self) -> &'static str;

    async fn generate(&self, request: &CompletionRequest) -> Result<Completion, ServiceError>;
}

/// Create the backend selected by the config
pub fn create_backend(config: &Config) -> Result<Arc<dyn Backend>, ServiceError> {
    match config.provider {
        Provider::Gemini => Ok(Arc::new(GeminiBackend::new(
            &config.providers.gemini,
            config.timeout(),
        )?)),
        Provider::ClaudeCli => Ok(Arc::new(ClaudeCliBackend {
            binary: config.providers.claude_cli.binary.clone(),
            model: config.providers.claude_cli.model.clone(),
            timeout: config.timeout(),
        })),
    }
}

#[cfg(test)]
pub mod testing {
    use super::*;
    use std::sync::Mutex;

    type Responder = dyn Fn(&CompletionRequest) -> Result<Completion, ServiceError> + Send + Sync;

    /// In-memory backend answering from a closure and recording every request
    pub struct ScriptedBackend {
        responder: Box<Responder>,
        requests: Mutex<Vec<CompletionRequest>>,
    }

    impl ScriptedBackend {
        pub fn new<F>(responder: F) -> Arc<Self>
        where
            F: Fn(&CompletionRequest) -> Result<Completion, ServiceError> + Send + Sync + 'static,
        {
            Arc::new(Self {
                responder: Box::new(responder),
                requests: Mutex::new(Vec::new()),
            })
        }

        /// Backend that always fails with a retryable service error
        pub fn failing() -> Arc<Self> {
            Self::new(|_| Err(ServiceError::Request("service unavailable".to_string())))
        }

        pub fn requests(&self) -> Vec<CompletionRequest> {
            self.requests.lock().unwrap().clone()
        }

        pub fn call_count(&self) -> usize {
            self.requests.lock().unwrap().len()
        }

        /// Number of recorded requests whose system prompt contains `marker`
        pub fn calls_matching(&self, marker: &str) -> usize {
            self.requests
                .lock()
                .unwrap()
                .iter()
                .filter(|r| r.system_prompt.contains(marker))
                .count()
        }
    }

    #[async_trait]
    impl Backend for ScriptedBackend {
        fn name(&self) -> &'static str {
            "scripted"
        }

        async fn generate(&self, request: &CompletionRequest) -> Result<Completion, ServiceError> {
            self.requests.lock().unwrap().push(request.clone());
            (self.responder)(request)
        }
    }
}
