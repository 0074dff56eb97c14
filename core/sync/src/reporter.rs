//! Failure reporting for logging and telemetry.

use async_trait::async_trait;
use std::fmt;
use tracing::error;

use budgetsync_common::Error;

/// Category under which a failure is reported.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorContext {
    /// A single attempt failed.
    Sync,
    /// A non-transient failure aborted the retry loop.
    SyncRetry,
    /// Every retry failed with a transient error.
    SyncRetryExhausted,
}

impl ErrorContext {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorContext::Sync => "Sync",
            ErrorContext::SyncRetry => "SyncRetry",
            ErrorContext::SyncRetryExhausted => "SyncRetryExhausted",
        }
    }
}

impl fmt::Display for ErrorContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Receives failure notifications from the sync engine.
#[async_trait]
pub trait ErrorReporter: Send + Sync {
    /// Report a failure. Implementations must not fail.
    async fn report(&self, context: ErrorContext, error: &Error);
}

/// Reporter that writes failures to the tracing log.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingErrorReporter;

#[async_trait]
impl ErrorReporter for TracingErrorReporter {
    async fn report(&self, context: ErrorContext, error: &Error) {
        error!(context = %context, transient = error.is_transient(), "{}", error);
    }
}

/// Short message suitable for showing to the user.
pub fn user_message(error: &Error) -> &'static str {
    match error {
        Error::Network(_) => "No internet connection. Please try again later.",
        Error::Timeout(_) => "The operation took too long. Check your connection.",
        Error::InvalidInput(_) => "Invalid operation. Please try again.",
        _ => "An unexpected error occurred. The team has been notified.",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_context_names() {
        assert_eq!(ErrorContext::Sync.to_string(), "Sync");
        assert_eq!(ErrorContext::SyncRetry.to_string(), "SyncRetry");
        assert_eq!(
            ErrorContext::SyncRetryExhausted.to_string(),
            "SyncRetryExhausted"
        );
    }

    #[test]
    fn test_user_message() {
        let msg = user_message(&Error::Network("dns".to_string()));
        assert!(msg.contains("internet"));

        let msg = user_message(&Error::Storage("locked".to_string()));
        assert!(msg.contains("unexpected"));
    }

    #[tokio::test]
    async fn test_tracing_reporter_does_not_panic() {
        TracingErrorReporter
            .report(ErrorContext::Sync, &Error::Timeout("t".to_string()))
            .await;
    }
}
