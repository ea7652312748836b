use rand::Rng;
use reqwest::Client;
use std::{future::Future, time::Duration};
use tracing::warn;

const MAX_BACKOFF: Duration = Duration::from_secs(10);

/// Timeout and retry settings for one external collaborator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HttpSettings {
    pub timeout: Duration,
    pub connect_timeout: Duration,
    pub retry: RetryPolicy,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl RetryPolicy {
    #[cfg(test)]
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            base_delay: Duration::ZERO,
        }
    }

    /// Exponential delay before retry number `attempt` (1-based), capped, with up
    /// to 25% jitter.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 1u32.checked_shl(attempt.saturating_sub(1)).unwrap_or(u32::MAX);
        let raw = self.base_delay.saturating_mul(factor).min(MAX_BACKOFF);
        let jitter_ms = (raw.as_millis() as u64) / 4;
        if jitter_ms == 0 {
            return raw;
        }
        let extra = rand::rng().random_range(0..=jitter_ms);
        raw.saturating_add(Duration::from_millis(extra)).min(MAX_BACKOFF)
    }
}

/// Errors that can tell whether another attempt may succeed.
pub trait Transient {
    fn is_transient(&self) -> bool;
}

pub fn build_client(settings: &HttpSettings) -> Client {
    Client::builder()
        .timeout(settings.timeout)
        .connect_timeout(settings.connect_timeout)
        .build()
        .unwrap_or_else(|_| Client::new())
}

/// True for statuses worth retrying: 408, 429 and any 5xx.
pub fn is_transient_status(status: reqwest::StatusCode) -> bool {
    status == reqwest::StatusCode::REQUEST_TIMEOUT
        || status == reqwest::StatusCode::TOO_MANY_REQUESTS
        || status.is_server_error()
}

/// Runs `op` until it succeeds, fails with a non-transient error, or the
/// policy's attempt cap is reached.
pub async fn with_retry<T, E, F, Fut>(
    target: &'static str,
    operation: &'static str,
    policy: RetryPolicy,
    op: F,
) -> Result<T, E>
where
    E: Transient + std::fmt::Display,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    with_retry_when(target, operation, policy, E::is_transient, op).await
}

/// Like [`with_retry`], but only errors accepted by `retryable` are retried.
pub async fn with_retry_when<T, E, F, Fut, R>(
    target: &'static str,
    operation: &'static str,
    policy: RetryPolicy,
    retryable: R,
    mut op: F,
) -> Result<T, E>
where
    E: std::fmt::Display,
    R: Fn(&E) -> bool,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 1;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(err) if attempt < max_attempts && retryable(&err) => {
                let delay = policy.backoff(attempt);
                warn!(
                    target = "lister.http",
                    collaborator = target,
                    operation,
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    error = %err,
                    "retrying_transient_failure"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(err) => return Err(err),
        }
    }
}
