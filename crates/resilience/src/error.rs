// crates/resilience/src/error.rs
//! Error types for resilience operations

use std::time::Duration;
use thiserror::Error;

/// Boxed failure produced by a wrapped operation
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Result type for resilience operations
pub type ResilienceResult<T> = Result<T, ResilienceError>;

/// Outcome of executing an operation through a policy
pub type Outcome<T> = ResilienceResult<T>;

/// Classification of a failed outcome
///
/// Callers branch on the kind instead of matching on individual variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Operation exceeded its time budget
    TimeoutRejected,
    /// Circuit breaker is open; operation not attempted
    CircuitOpenRejected,
    /// Concurrency and queue capacity exhausted
    BulkheadRejected,
    /// No rate limiter token available
    RateLimitRejected,
    /// All configured attempts failed
    RetryExhausted,
    /// Caller-issued cancellation observed
    CancellationRequested,
    /// The wrapped operation failed on its own
    OperationFailed,
}

/// Errors that can occur in resilience operations
#[derive(Debug, Error)]
pub enum ResilienceError {
    /// Operation timed out
    #[error("Operation timed out after {0:?}")]
    Timeout(Duration),

    /// Circuit breaker is open
    #[error("Circuit breaker is open (failures: {failures}, retry in {remaining:?})")]
    CircuitBreakerOpen {
        failures: usize,
        remaining: Duration,
    },

    /// Bulkhead is full
    #[error(
        "Bulkhead rejected execution (max concurrency: {max_concurrency}, max queue: {max_queue})"
    )]
    BulkheadRejected {
        max_concurrency: usize,
        max_queue: usize,
    },

    /// Rate limit exceeded
    #[error("Rate limit exceeded (retry after {retry_after:?})")]
    RateLimitExceeded { retry_after: Duration },

    /// All retry attempts exhausted
    #[error("All {attempts} retry attempts exhausted: {last_error}")]
    RetriesExhausted {
        attempts: usize,
        #[source]
        last_error: Box<ResilienceError>,
    },

    /// Operation was cancelled
    #[error("Operation was cancelled")]
    Cancelled,

    /// Failure raised by the wrapped operation
    #[error("{0}")]
    Operation(#[source] BoxError),
}

impl ResilienceError {
    /// Wraps an operation failure
    pub fn operation<E>(error: E) -> Self
    where
        E: Into<BoxError>,
    {
        ResilienceError::Operation(error.into())
    }

    /// Wraps a plain message as an operation failure
    pub fn message(message: impl Into<String>) -> Self {
        ResilienceError::Operation(message.into().into())
    }

    /// Returns the classification of this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            ResilienceError::Timeout(_) => ErrorKind::TimeoutRejected,
            ResilienceError::CircuitBreakerOpen { .. } => ErrorKind::CircuitOpenRejected,
            ResilienceError::BulkheadRejected { .. } => ErrorKind::BulkheadRejected,
            ResilienceError::RateLimitExceeded { .. } => ErrorKind::RateLimitRejected,
            ResilienceError::RetriesExhausted { .. } => ErrorKind::RetryExhausted,
            ResilienceError::Cancelled => ErrorKind::CancellationRequested,
            ResilienceError::Operation(_) => ErrorKind::OperationFailed,
        }
    }

    /// Returns true if the operation was never attempted
    pub fn is_rejection(&self) -> bool {
        matches!(
            self.kind(),
            ErrorKind::CircuitOpenRejected
                | ErrorKind::BulkheadRejected
                | ErrorKind::RateLimitRejected
        )
    }

    /// Returns true if the error came from caller cancellation
    pub fn is_cancelled(&self) -> bool {
        matches!(self, ResilienceError::Cancelled)
    }

    /// Returns the innermost error, unwrapping exhausted retries
    pub fn root(&self) -> &ResilienceError {
        match self {
            ResilienceError::RetriesExhausted { last_error, .. } => last_error.root(),
            other => other,
        }
    }
}

/// Error raised when a policy is constructed with invalid options
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Invalid {policy} configuration: {reason}")]
pub struct BuildError {
    /// Policy being constructed
    pub policy: &'static str,
    /// What is wrong with the options
    pub reason: String,
}

impl BuildError {
    pub(crate) fn new(policy: &'static str, reason: impl Into<String>) -> Self {
        Self {
            policy,
            reason: reason.into(),
        }
    }
}
