// crates/resilience/src/rate_limiter.rs
//! Rate limiting implementation

use crate::clock::{self, Clock};
use crate::context::ExecutionContext;
use crate::error::{BuildError, Outcome, ResilienceError, ResilienceResult};
use crate::policy::{Operation, Policy};
use futures::future::BoxFuture;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::time::Instant;

#[derive(Debug)]
struct TokenBucket {
    capacity: f64,
    tokens: f64,
    /// Tokens added per second
    refill_rate: f64,
    last_refill: Instant,
}

impl TokenBucket {
    fn new(capacity: f64, refill_rate: f64, now: Instant) -> Self {
        Self {
            capacity,
            tokens: capacity,
            refill_rate,
            last_refill: now,
        }
    }

    fn refill(&mut self, now: Instant) {
        let elapsed = now.saturating_duration_since(self.last_refill).as_secs_f64();

        let new_tokens = elapsed * self.refill_rate;
        self.tokens = (self.tokens + new_tokens).clamp(0.0, self.capacity);
        self.last_refill = self.last_refill.max(now);
    }

    fn consume(&mut self, now: Instant) -> Result<(), Duration> {
        self.refill(now);

        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            Ok(())
        } else {
            let tokens_needed = 1.0 - self.tokens;
            let wait_secs = tokens_needed / self.refill_rate;
            Err(Duration::try_from_secs_f64(wait_secs).unwrap_or(Duration::MAX))
        }
    }
}

/// Token bucket rate limiter
///
/// `max_requests` tokens are added per `window`, spread evenly. The bucket
/// holds at most `capacity` tokens (defaults to `max_requests`) and starts
/// full.
#[derive(Debug, Clone)]
pub struct RateLimiter {
    max_tokens: usize,
    window: Duration,
    state: Arc<Mutex<TokenBucket>>,
    clock: Arc<dyn Clock>,
}

impl RateLimiter {
    /// Creates a new rate limiter
    pub fn new(max_requests: usize, window: Duration) -> Result<Self, BuildError> {
        if max_requests == 0 {
            return Err(BuildError::new(
                "rate limiter",
                "max requests must be at least 1",
            ));
        }
        if window.is_zero() {
            return Err(BuildError::new(
                "rate limiter",
                "window must be greater than zero",
            ));
        }

        let clock = clock::system();
        let rate = max_requests as f64 / window.as_secs_f64();
        let bucket = TokenBucket::new(max_requests as f64, rate, clock.now());

        Ok(Self {
            max_tokens: max_requests,
            window,
            state: Arc::new(Mutex::new(bucket)),
            clock,
        })
    }

    /// Sets the burst capacity
    pub fn with_burst(self, capacity: usize) -> Result<Self, BuildError> {
        if capacity == 0 {
            return Err(BuildError::new(
                "rate limiter",
                "burst capacity must be at least 1",
            ));
        }

        {
            let mut bucket = self.lock();
            bucket.capacity = capacity as f64;
            bucket.tokens = capacity as f64;
        }
        Ok(self)
    }

    /// Uses the given clock instead of the system clock
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.lock().last_refill = clock.now();
        self.clock = clock;
        self
    }

    fn lock(&self) -> MutexGuard<'_, TokenBucket> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Attempts to acquire a token
    pub fn try_acquire(&self) -> ResilienceResult<()> {
        let now = self.clock.now();
        self.lock().consume(now).map_err(|retry_after| {
            log::debug!("Rate limit exceeded, retry after {:?}", retry_after);
            ResilienceError::RateLimitExceeded { retry_after }
        })
    }

    /// Gets the number of whole tokens currently available
    pub fn available_tokens(&self) -> usize {
        let now = self.clock.now();
        let mut bucket = self.lock();
        bucket.refill(now);
        bucket.tokens as usize
    }

    /// Gets the maximum number of requests allowed per window
    pub fn max_requests(&self) -> usize {
        self.max_tokens
    }

    /// Gets the time window
    pub fn window(&self) -> Duration {
        self.window
    }

    /// Gets the burst capacity
    pub fn capacity(&self) -> usize {
        self.lock().capacity as usize
    }
}

impl<T: Send + 'static> Policy<T> for RateLimiter {
    fn execute(
        &self,
        operation: Operation<T>,
        ctx: ExecutionContext,
    ) -> BoxFuture<'static, Outcome<T>> {
        let limiter = self.clone();
        Box::pin(async move {
            limiter.try_acquire()?;
            operation.call(ctx).await
        })
    }

    fn name(&self) -> &'static str {
        "rate_limiter"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;

    fn limiter(max: usize, window: Duration) -> (RateLimiter, ManualClock) {
        let clock = ManualClock::new();
        let limiter = RateLimiter::new(max, window)
            .unwrap()
            .with_clock(Arc::new(clock.clone()));
        (limiter, clock)
    }

    #[test]
    fn test_rate_limiter_allows_within_limit() {
        let (limiter, _clock) = limiter(5, Duration::from_secs(1));

        for _ in 0..5 {
            assert!(limiter.try_acquire().is_ok());
        }
    }

    #[test]
    fn test_rate_limiter_blocks_over_limit() {
        let (limiter, _clock) = limiter(3, Duration::from_secs(1));

        for _ in 0..3 {
            assert!(limiter.try_acquire().is_ok());
        }

        let result = limiter.try_acquire();
        assert!(matches!(result, Err(ResilienceError::RateLimitExceeded { .. })));
    }

    #[test]
    fn test_retry_after_reports_next_token() {
        let (limiter, _clock) = limiter(4, Duration::from_secs(1));
        for _ in 0..4 {
            limiter.try_acquire().unwrap();
        }

        match limiter.try_acquire() {
            Err(ResilienceError::RateLimitExceeded { retry_after }) => {
                assert_eq!(retry_after, Duration::from_millis(250));
            }
            other => panic!("Expected rate limit rejection, got {:?}", other),
        }
    }

    #[test]
    fn test_rate_limiter_refills_over_time() {
        let (limiter, clock) = limiter(2, Duration::from_millis(100));

        assert!(limiter.try_acquire().is_ok());
        assert!(limiter.try_acquire().is_ok());
        assert!(limiter.try_acquire().is_err());

        clock.advance(Duration::from_millis(60));
        assert!(limiter.try_acquire().is_ok());
        assert!(limiter.try_acquire().is_err());
    }

    #[test]
    fn test_tokens_never_exceed_capacity() {
        let (limiter, clock) = limiter(3, Duration::from_secs(1));
        clock.advance(Duration::from_secs(3600));
        assert_eq!(limiter.available_tokens(), 3);
    }

    #[test]
    fn test_retry_after_saturates_for_huge_window() {
        let (limiter, _clock) = limiter(1, Duration::MAX);
        assert!(limiter.try_acquire().is_ok());

        match limiter.try_acquire() {
            Err(ResilienceError::RateLimitExceeded { retry_after }) => {
                assert!(retry_after > Duration::from_secs(u64::MAX / 2));
            }
            other => panic!("expected rate limit rejection, got {:?}", other),
        }
    }

    #[test]
    fn test_burst_capacity() {
        let clock = ManualClock::new();
        let limiter = RateLimiter::new(20, Duration::from_secs(1))
            .unwrap()
            .with_burst(10)
            .unwrap()
            .with_clock(Arc::new(clock.clone()));

        assert_eq!(limiter.capacity(), 10);
        for _ in 0..10 {
            assert!(limiter.try_acquire().is_ok());
        }
        assert!(limiter.try_acquire().is_err());

        clock.advance(Duration::from_millis(120));
        assert_eq!(limiter.available_tokens(), 2);
    }

    #[test]
    fn test_invalid_limits_rejected() {
        assert!(RateLimiter::new(0, Duration::from_secs(1)).is_err());
        assert!(RateLimiter::new(3, Duration::ZERO).is_err());
        assert!(RateLimiter::new(3, Duration::from_secs(1))
            .unwrap()
            .with_burst(0)
            .is_err());
    }

    #[test]
    fn test_rate_limiter_config() {
        let (limiter, _clock) = limiter(100, Duration::from_secs(60));
        assert_eq!(limiter.max_requests(), 100);
        assert_eq!(limiter.window(), Duration::from_secs(60));
    }

    #[tokio::test]
    async fn test_fourth_instant_call_rejected() {
        let (limiter, _clock) = limiter(3, Duration::from_secs(1));
        let mut admitted = 0;
        let mut rejected = 0;

        for _ in 0..4 {
            match limiter
                .execute(Operation::from_fn(|| Ok(())), ExecutionContext::new())
                .await
            {
                Ok(()) => admitted += 1,
                Err(e) => {
                    assert_eq!(e.kind(), crate::ErrorKind::RateLimitRejected);
                    rejected += 1;
                }
            }
        }

        assert_eq!(admitted, 3);
        assert_eq!(rejected, 1);
    }
}
