//! Error categorization and retry strategy for resilient external calls.
//!
//! This module provides:
//! - `OperationError` - a general-purpose error type for retryable operations
//! - `ErrorCategory` - classification of errors for smart retry logic
//! - `RetryStrategy` - how to handle retries based on error category

use std::time::Duration;
use thiserror::Error;

/// Errors that can occur during a retryable operation.
#[derive(Error, Debug)]
pub enum OperationError {
    /// Serialization/deserialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The operation itself failed (a provider call, a DB write, ...).
    #[error("processing error: {0}")]
    Processing(String),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),

    /// Internal error.
    #[error("internal error: {0}")]
    Internal(String),

    /// Operation exceeded its deadline.
    #[error("operation timed out: {0}")]
    Timeout(String),
}

impl OperationError {
    /// Check if this is a timeout error.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout(_))
    }

    /// Categorize the error for smart retry logic.
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::Timeout(_) => ErrorCategory::Transient,
            Self::Serialization(_) => ErrorCategory::Permanent,
            Self::Config(_) => ErrorCategory::Permanent,
            Self::Internal(s) => {
                let lower = s.to_lowercase();
                if lower.contains("connection") || lower.contains("timeout") {
                    ErrorCategory::Transient
                } else if lower.contains("rate") || lower.contains("limit") || lower.contains("quota")
                {
                    ErrorCategory::RateLimited
                } else {
                    ErrorCategory::Transient
                }
            }
            Self::Processing(s) => {
                let lower = s.to_lowercase();
                if lower.contains("rate")
                    || lower.contains("limit")
                    || lower.contains("quota")
                    || lower.contains("throttl")
                    || lower.contains("429")
                    || lower.contains("too many")
                {
                    ErrorCategory::RateLimited
                } else if lower.contains("invalid")
                    || lower.contains("malformed")
                    || lower.contains("not found")
                    || lower.contains("does not exist")
                    || lower.contains("forbidden")
                    || lower.contains("unauthorized")
                    || lower.contains("401")
                    || lower.contains("403")
                    || lower.contains("404")
                {
                    ErrorCategory::Permanent
                } else if lower.contains("timeout")
                    || lower.contains("connection")
                    || lower.contains("temporarily")
                    || lower.contains("unavailable")
                    || lower.contains("500")
                    || lower.contains("502")
                    || lower.contains("503")
                    || lower.contains("504")
                {
                    ErrorCategory::Transient
                } else {
                    ErrorCategory::Transient
                }
            }
        }
    }
}

/// Error category for smart retry logic.
///
/// Different error categories have different retry strategies:
/// - `Transient`: Temporary issues that will likely resolve with retry (connection issues, timeouts)
/// - `Permanent`: Errors that won't be fixed by retrying (invalid data, auth failures)
/// - `RateLimited`: Service is overloaded, need longer backoff
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Temporary error - retry with exponential backoff.
    Transient,

    /// Permanent error - do not retry, move to DLQ immediately.
    Permanent,

    /// Rate limited - retry with longer backoff.
    RateLimited,
}

impl ErrorCategory {
    /// Get the retry strategy for this error category.
    pub fn retry_strategy(&self) -> RetryStrategy {
        match self {
            Self::Transient => RetryStrategy::ExponentialBackoff {
                base_delay_ms: 1000,
                max_delay_ms: 30_000,
                max_retries: 3,
            },
            Self::Permanent => RetryStrategy::NoRetry,
            Self::RateLimited => RetryStrategy::ExponentialBackoff {
                base_delay_ms: 5000,
                max_delay_ms: 120_000,
                max_retries: 5,
            },
        }
    }

    /// Check if this error category should be retried.
    pub fn should_retry(&self) -> bool {
        !matches!(self, Self::Permanent)
    }
}

/// Retry strategy for handling errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryStrategy {
    /// Do not retry, move to DLQ immediately.
    NoRetry,

    /// Retry with exponential backoff.
    ExponentialBackoff {
        /// Base delay in milliseconds.
        base_delay_ms: u64,
        /// Maximum delay in milliseconds.
        max_delay_ms: u64,
        /// Maximum number of retries.
        max_retries: u32,
    },
}

impl RetryStrategy {
    /// Calculate the delay for a given retry attempt.
    ///
    /// Uses exponential backoff with jitter to prevent thundering herd.
    pub fn delay_for_attempt(&self, attempt: u32) -> Option<Duration> {
        match self {
            Self::NoRetry => None,
            Self::ExponentialBackoff {
                base_delay_ms,
                max_delay_ms,
                max_retries,
            } => {
                if attempt >= *max_retries {
                    return None;
                }

                let exp_delay = base_delay_ms.saturating_mul(2u64.pow(attempt));
                let capped_delay = exp_delay.min(*max_delay_ms);
                let final_delay = Self::apply_jitter(capped_delay);

                Some(Duration::from_millis(final_delay))
            }
        }
    }

    /// Apply jitter to a delay (±25% randomness).
    fn apply_jitter(delay_ms: u64) -> u64 {
        use std::collections::hash_map::DefaultHasher;
        use std::hash::{Hash, Hasher};
        use std::time::SystemTime;

        let mut hasher = DefaultHasher::new();
        SystemTime::now()
            .duration_since(SystemTime::UNIX_EPOCH)
            .unwrap_or_default()
            .as_nanos()
            .hash(&mut hasher);
        let hash = hasher.finish();

        let jitter_range = delay_ms / 4;
        if jitter_range == 0 {
            return delay_ms;
        }

        let random_offset = (hash % (jitter_range * 2 + 1)) as i64 - jitter_range as i64;

        if random_offset < 0 {
            delay_ms.saturating_sub((-random_offset) as u64)
        } else {
            delay_ms.saturating_add(random_offset as u64)
        }
    }

    /// Check if we should retry for a given attempt number.
    pub fn should_retry(&self, attempt: u32) -> bool {
        match self {
            Self::NoRetry => false,
            Self::ExponentialBackoff { max_retries, .. } => attempt < *max_retries,
        }
    }

    /// Get the maximum number of retries.
    pub fn max_retries(&self) -> u32 {
        match self {
            Self::NoRetry => 0,
            Self::ExponentialBackoff { max_retries, .. } => *max_retries,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = OperationError::Processing("failed to send email".to_string());
        assert_eq!(err.to_string(), "processing error: failed to send email");
    }

    #[test]
    fn test_error_category_transient() {
        let err = OperationError::Timeout("operation timed out".to_string());
        assert_eq!(err.category(), ErrorCategory::Transient);

        let err = OperationError::Processing("503 service unavailable".to_string());
        assert_eq!(err.category(), ErrorCategory::Transient);
    }

    #[test]
    fn test_error_category_permanent() {
        let err = OperationError::Config("missing required field".to_string());
        assert_eq!(err.category(), ErrorCategory::Permanent);

        let err = OperationError::Processing("404 not found".to_string());
        assert_eq!(err.category(), ErrorCategory::Permanent);

        let err = OperationError::Processing("unauthorized access".to_string());
        assert_eq!(err.category(), ErrorCategory::Permanent);
    }

    #[test]
    fn test_error_category_rate_limited() {
        let err = OperationError::Processing("429 too many requests".to_string());
        assert_eq!(err.category(), ErrorCategory::RateLimited);

        let err = OperationError::Processing("rate limit exceeded".to_string());
        assert_eq!(err.category(), ErrorCategory::RateLimited);
    }

    #[test]
    fn test_retry_strategy_no_retry() {
        let strategy = RetryStrategy::NoRetry;
        assert!(!strategy.should_retry(0));
        assert_eq!(strategy.delay_for_attempt(0), None);
        assert_eq!(strategy.max_retries(), 0);
    }

    #[test]
    fn test_retry_strategy_exponential_backoff() {
        let strategy = RetryStrategy::ExponentialBackoff {
            base_delay_ms: 1000,
            max_delay_ms: 30_000,
            max_retries: 3,
        };

        assert!(strategy.should_retry(0));
        assert!(strategy.should_retry(1));
        assert!(strategy.should_retry(2));
        assert!(!strategy.should_retry(3));

        assert!(strategy.delay_for_attempt(0).is_some());
        assert!(strategy.delay_for_attempt(2).is_some());
        assert!(strategy.delay_for_attempt(3).is_none());

        assert_eq!(strategy.max_retries(), 3);
    }

    #[test]
    fn test_retry_strategy_delay_capping() {
        let strategy = RetryStrategy::ExponentialBackoff {
            base_delay_ms: 1000,
            max_delay_ms: 5000,
            max_retries: 10,
        };

        let delay = strategy.delay_for_attempt(8).unwrap();
        assert!(delay.as_millis() <= 7000);
    }

    #[test]
    fn test_error_category_should_retry() {
        assert!(ErrorCategory::Transient.should_retry());
        assert!(!ErrorCategory::Permanent.should_retry());
        assert!(ErrorCategory::RateLimited.should_retry());
    }

    #[test]
    fn test_error_category_retry_strategy() {
        let strategy = ErrorCategory::Transient.retry_strategy();
        assert!(matches!(
            strategy,
            RetryStrategy::ExponentialBackoff { max_retries: 3, .. }
        ));

        let strategy = ErrorCategory::Permanent.retry_strategy();
        assert!(matches!(strategy, RetryStrategy::NoRetry));

        let strategy = ErrorCategory::RateLimited.retry_strategy();
        assert!(matches!(
            strategy,
            RetryStrategy::ExponentialBackoff { max_retries: 5, .. }
        ));
    }
}
