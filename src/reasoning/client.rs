use crate::config::RetryConfig;
use crate::error::ServiceError;
use crate::provider::{Backend, Completion, CompletionRequest};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tracing::debug;

use super::retry::retry_with_backoff;

/// Shared handle to the reasoning service.
///
/// Holds only configuration; a single client serves every stage of a run and
/// caps how many calls are in flight at once.
pub struct ReasoningClient {
    backend: Arc<dyn Backend>,
    retry: RetryConfig,
    in_flight: Arc<Semaphore>,
}

impl ReasoningClient {
    pub fn new(backend: Arc<dyn Backend>, retry: RetryConfig, max_in_flight: usize) -> Self {
        Self {
            backend,
            retry,
            in_flight: Arc::new(Semaphore::new(max_in_flight.max(1))),
        }
    }

    pub fn backend_name(&self) -> &'static str {
        self.backend.name()
    }

    /// One completion with retries; blank answers count as failed attempts
    pub async fn complete(
        &self,
        system_prompt: &str,
        user_prompt: &str,
        temperature: f32,
        max_tokens: u32,
    ) -> Result<Completion, ServiceError> {
        let request = CompletionRequest {
            system_prompt: system_prompt.to_string(),
            user_prompt: user_prompt.to_string(),
            temperature,
            max_tokens,
        };

        debug!(
            "Calling {} with {} byte prompt (temperature {}, max_tokens {})",
            self.backend.name(),
            request.user_prompt.len(),
            temperature,
            max_tokens
        );

        retry_with_backoff(&self.retry, ServiceError::is_retryable, || {
            let request = &request;
            async move {
                let _permit = self
                    .in_flight
                    .acquire()
                    .await
                    .map_err(|e| ServiceError::Request(format!("Call limiter closed: {}", e)))?;

                let completion = self.backend.generate(request).await?;
                if completion.text.trim().is_empty() {
                    return Err(ServiceError::EmptyResponse);
                }
                Ok(completion)
            }
        })
        .await
    }
}
