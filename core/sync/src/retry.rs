//! Retry strategy with a fixed backoff schedule for transient errors.

use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, warn};

use budgetsync_common::Error;

use crate::reporter::ErrorContext;

/// Backoff waited after failed attempt 1, 2 and 3 respectively.
pub const RETRY_SCHEDULE: [Duration; 3] = [
    Duration::from_secs(2),
    Duration::from_secs(5),
    Duration::from_secs(10),
];

/// Total attempts made before giving up.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Configuration for retry behavior.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of attempts, the first one included.
    pub max_attempts: u32,
    /// Delay after each failed attempt, indexed by attempt.
    pub delays: Vec<Duration>,
}

impl RetryConfig {
    /// Create a new retry configuration using the standard schedule.
    pub fn new(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            delays: RETRY_SCHEDULE.to_vec(),
        }
    }

    /// Replace the delay schedule.
    pub fn with_delays(mut self, delays: Vec<Duration>) -> Self {
        self.delays = delays;
        self
    }

    /// Delay to wait after the failed attempt with the given 0-based index.
    ///
    /// Indices past the end of the schedule reuse its last entry.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        self.delays
            .get(attempt as usize)
            .or_else(|| self.delays.last())
            .copied()
            .unwrap_or(Duration::ZERO)
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_ATTEMPTS)
    }
}

/// Why a retried operation ultimately failed.
#[derive(Debug, thiserror::Error)]
pub enum RetryError {
    /// A non-transient error stopped the loop.
    #[error("attempt {attempt} failed: {error}")]
    Aborted { attempt: u32, error: Error },

    /// Every attempt failed with a transient error.
    #[error("retries exhausted after {attempts} attempts: {error}")]
    Exhausted { attempts: u32, error: Error },
}

impl RetryError {
    /// The underlying error of the last attempt.
    pub fn error(&self) -> &Error {
        match self {
            RetryError::Aborted { error, .. } | RetryError::Exhausted { error, .. } => error,
        }
    }

    /// Consume into the underlying error.
    pub fn into_error(self) -> Error {
        match self {
            RetryError::Aborted { error, .. } | RetryError::Exhausted { error, .. } => error,
        }
    }

    /// Reporting category for this failure.
    pub fn context(&self) -> ErrorContext {
        match self {
            RetryError::Aborted { .. } => ErrorContext::SyncRetry,
            RetryError::Exhausted { .. } => ErrorContext::SyncRetryExhausted,
        }
    }
}

/// Retry executor for running operations with retry logic.
pub struct RetryExecutor {
    config: RetryConfig,
}

impl RetryExecutor {
    /// Create a new retry executor.
    pub fn new(config: RetryConfig) -> Self {
        Self { config }
    }

    /// Execute an operation with retry logic.
    ///
    /// Transient errors (see [`Error::is_transient`]) are retried after the
    /// scheduled delay; no delay follows the final attempt. Any other error
    /// ends the loop at once. Each retry calls `operation` again from scratch.
    pub async fn execute<F, Fut, T>(&self, operation: F) -> Result<T, RetryError>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = budgetsync_common::Result<T>>,
    {
        let max_attempts = self.config.max_attempts.max(1);
        let mut attempt = 0;

        loop {
            attempt += 1;
            match operation().await {
                Ok(result) => {
                    if attempt > 1 {
                        debug!("Operation succeeded on attempt {}", attempt);
                    }
                    return Ok(result);
                }
                Err(error) if !error.is_transient() => {
                    return Err(RetryError::Aborted { attempt, error });
                }
                Err(error) => {
                    if attempt >= max_attempts {
                        warn!("Operation failed after {} attempts: {}", attempt, error);
                        return Err(RetryError::Exhausted {
                            attempts: attempt,
                            error,
                        });
                    }

                    let delay = self.config.delay_for_attempt(attempt - 1);
                    warn!(
                        "Attempt {}/{} failed: {}. Retrying in {:?}...",
                        attempt, max_attempts, error, delay
                    );
                    sleep(delay).await;
                }
            }
        }
    }

    /// Get the retry configuration.
    pub fn config(&self) -> &RetryConfig {
        &self.config
    }
}

impl Default for RetryExecutor {
    fn default() -> Self {
        Self::new(RetryConfig::default())
    }
}
