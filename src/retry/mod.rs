//! Bounded retries with exponential backoff, jitter, and per-attempt timeouts.
//!
//! Every stage call in the flow goes through [`RetryExecutor::run`]. An attempt
//! runs on its own tokio task; when a timeout is configured the executor stops
//! waiting after the deadline and abandons the task, so a late result is
//! discarded rather than cancelled cooperatively.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::errors::{AttemptError, RetryError};
use crate::redaction::redact_text;

/// Retry/backoff policy.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub backoff_seconds: f64,
    pub jitter_seconds: f64,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, backoff_seconds: f64, jitter_seconds: f64) -> Self {
        Self {
            max_attempts,
            backoff_seconds,
            jitter_seconds,
        }
    }

    /// Base delay before attempt `attempt + 1`, without jitter.
    pub fn base_delay(&self, attempt: u32) -> f64 {
        let exponent = attempt.saturating_sub(1).min(30) as i32;
        self.backoff_seconds * 2f64.powi(exponent)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(3, 1.0, 0.2)
    }
}

/// Waits between attempts. Swapped out in tests to record delays.
#[async_trait]
pub trait Sleeper: Send + Sync {
    async fn sleep(&self, duration: Duration);
}

pub struct TokioSleeper;

#[async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// Returns a jitter value in `[0, upper]`.
pub type JitterFn = Arc<dyn Fn(f64) -> f64 + Send + Sync>;

fn uniform_jitter(upper: f64) -> f64 {
    if upper <= 0.0 {
        return 0.0;
    }
    rand::random::<f64>() * upper
}

#[derive(Clone)]
pub struct RetryExecutor {
    policy: RetryPolicy,
    sleeper: Arc<dyn Sleeper>,
    jitter: JitterFn,
}

impl RetryExecutor {
    pub fn new(policy: RetryPolicy) -> Self {
        Self {
            policy,
            sleeper: Arc::new(TokioSleeper),
            jitter: Arc::new(uniform_jitter),
        }
    }

    pub fn with_sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.sleeper = sleeper;
        self
    }

    pub fn with_jitter(mut self, jitter: JitterFn) -> Self {
        self.jitter = jitter;
        self
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Delay before attempt `attempt + 1` (attempt is 1-based), floored at zero.
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        let jitter = (self.jitter)(self.policy.jitter_seconds);
        let secs = (self.policy.base_delay(attempt) + jitter).max(0.0);
        Duration::try_from_secs_f64(secs).unwrap_or(Duration::MAX)
    }

    /// Run `operation` until it succeeds or the attempt budget is spent.
    ///
    /// `operation` is invoked once per attempt to build a fresh future. Only the
    /// final error is surfaced, wrapped with the stage name and attempt count.
    pub async fn run<T, F, Fut>(
        &self,
        stage: &str,
        timeout: Option<Duration>,
        mut operation: F,
    ) -> Result<T, RetryError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = anyhow::Result<T>> + Send + 'static,
        T: Send + 'static,
    {
        let max_attempts = self.policy.max_attempts;
        if max_attempts < 1 {
            return Err(RetryError::InvalidPolicy { max_attempts });
        }

        let mut attempt = 1;
        loop {
            let error = match run_once(operation(), timeout).await {
                Ok(value) => {
                    if attempt > 1 {
                        tracing::info!(stage, attempt, "Stage succeeded after retry");
                    }
                    return Ok(value);
                }
                Err(error) => error,
            };

            if attempt >= max_attempts {
                tracing::warn!(
                    stage,
                    attempts = max_attempts,
                    error = %redact_text(&error.to_string()),
                    "Stage exhausted retries"
                );
                return Err(RetryError::Exhausted {
                    stage: stage.to_string(),
                    attempts: max_attempts,
                    last_error: error,
                });
            }

            let delay = self.backoff_delay(attempt);
            tracing::warn!(
                stage,
                attempt,
                timed_out = error.is_timeout(),
                delay_secs = delay.as_secs_f64(),
                error = %redact_text(&error.to_string()),
                "Stage attempt failed, retrying"
            );
            self.sleeper.sleep(delay).await;
            attempt += 1;
        }
    }
}

async fn run_once<T, Fut>(future: Fut, timeout: Option<Duration>) -> Result<T, AttemptError>
where
    Fut: Future<Output = anyhow::Result<T>> + Send + 'static,
    T: Send + 'static,
{
    let handle = tokio::spawn(future);
    let joined = match timeout {
        Some(limit) => match tokio::time::timeout(limit, handle).await {
            Ok(joined) => joined,
            // Dropping the JoinHandle detaches the task; its result is discarded.
            Err(_) => return Err(AttemptError::TimedOut(limit)),
        },
        None => handle.await,
    };
    match joined {
        Ok(result) => result.map_err(AttemptError::Failed),
        Err(join_error) => Err(AttemptError::Panicked(join_error.to_string())),
    }
}
