use crate::config::RetryConfig;
use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;
use tracing::warn;

/// Delay before retry number `retry` (1-based): `base * retry`
pub fn linear_delay(config: &RetryConfig, retry: u32) -> Duration {
    Duration::from_millis(config.backoff_base_ms.saturating_mul(retry as u64))
}

/// Execute an async operation with linear backoff.
///
/// Errors for which `is_retryable` returns false are returned immediately.
pub async fn retry_with_backoff<F, Fut, T, E, R>(
    config: &RetryConfig,
    is_retryable: R,
    mut operation: F,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
    R: Fn(&E) -> bool,
{
    let max_attempts = config.max_retries + 1;
    let mut attempts = 0;

    loop {
        attempts += 1;

        match operation().await {
            Ok(result) => return Ok(result),
            Err(e) if !is_retryable(&e) => {
                warn!("Attempt {} failed with a non-retryable error: {}", attempts, e);
                return Err(e);
            }
            Err(e) if attempts >= max_attempts => {
                warn!("All {} attempts failed: {}", attempts, e);
                return Err(e);
            }
            Err(e) => {
                let delay = linear_delay(config, attempts);

                warn!(
                    "Attempt {} failed: {}. Retrying in {:?}...",
                    attempts, e, delay
                );

                sleep(delay).await;
            }
        }
    }
}
