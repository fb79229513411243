// file: src/captioner/retry.rs
// description: linear backoff retry policy for captioning requests

use crate::config::CaptionerConfig;
use crate::error::{PipelineError, Result};
use std::future::Future;
use std::time::Duration;
use tracing::warn;

#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub attempts: u32,
    pub delay: Duration,
    pub rate_limit_backoff: Duration,
}

impl RetryPolicy {
    pub fn new(attempts: u32, delay: Duration, rate_limit_backoff: Duration) -> Self {
        Self {
            attempts: attempts.max(1),
            delay,
            rate_limit_backoff,
        }
    }

    pub fn from_config(config: &CaptionerConfig) -> Self {
        Self::new(
            config.retries,
            config.retry_delay(),
            config.rate_limit_backoff(),
        )
    }

    /// Sleep before the attempt following failed attempt `attempt` (0-based).
    pub fn backoff_for(&self, attempt: u32, error: &PipelineError) -> Duration {
        match error {
            PipelineError::RateLimited { retry_after } => retry_after
                .map(|after| after.max(self.rate_limit_backoff))
                .unwrap_or(self.rate_limit_backoff),
            _ => self.delay * (attempt + 1),
        }
    }

    pub async fn run<T, F, Fut>(&self, label: &str, mut operation: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut attempt = 0;

        loop {
            match operation().await {
                Ok(value) => return Ok(value),
                Err(err) if err.is_retryable() && attempt + 1 < self.attempts => {
                    let wait = self.backoff_for(attempt, &err);
                    warn!(
                        "[{}] attempt {} failed: {} (retrying in {:.1}s)",
                        label,
                        attempt + 1,
                        err,
                        wait.as_secs_f64()
                    );
                    tokio::time::sleep(wait).await;
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }
}
