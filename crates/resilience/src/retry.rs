// crates/resilience/src/retry.rs
//! Retry policies with fixed, exponential or custom wait schedules

use crate::context::ExecutionContext;
use crate::error::{Outcome, ResilienceError};
use crate::policy::{Operation, Policy};
use futures::future::BoxFuture;
use std::sync::Arc;
use std::time::Duration;

type ErrorPredicate = Arc<dyn Fn(&ResilienceError) -> bool + Send + Sync>;
type ResultPredicate<T> = Arc<dyn Fn(&T) -> bool + Send + Sync>;
type BackoffFn = Arc<dyn Fn(usize) -> Duration + Send + Sync>;
type RetryHook = Arc<dyn Fn(usize, Duration) + Send + Sync>;

/// Delay applied before each re-attempt
#[derive(Clone)]
pub enum WaitSchedule {
    /// Re-attempt immediately
    None,
    /// Explicit list of delays; the last entry repeats once the list runs out
    Fixed(Vec<Duration>),
    /// Exponential backoff with optional jitter
    Exponential {
        initial_delay: Duration,
        max_delay: Duration,
        multiplier: f64,
        use_jitter: bool,
    },
    /// Delay computed from the 1-based retry number
    Backoff(BackoffFn),
}

impl WaitSchedule {
    fn delay(&self, attempt: usize) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }

        match self {
            WaitSchedule::None => Duration::ZERO,
            WaitSchedule::Fixed(delays) => delays
                .get(attempt - 1)
                .or_else(|| delays.last())
                .copied()
                .unwrap_or(Duration::ZERO),
            WaitSchedule::Exponential {
                initial_delay,
                max_delay,
                multiplier,
                use_jitter,
            } => {
                let base_delay =
                    initial_delay.as_millis() as f64 * multiplier.powi((attempt - 1) as i32);

                let capped_delay = base_delay.min(max_delay.as_millis() as f64);

                let final_delay = if *use_jitter {
                    // Add up to 25% jitter
                    let jitter_factor = 0.75 + (attempt as f64 * 0.1 % 0.25);
                    capped_delay * jitter_factor
                } else {
                    capped_delay
                };

                Duration::from_millis(final_delay as u64)
            }
            WaitSchedule::Backoff(f) => f(attempt),
        }
    }
}

impl std::fmt::Debug for WaitSchedule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WaitSchedule::None => f.write_str("None"),
            WaitSchedule::Fixed(delays) => f.debug_tuple("Fixed").field(delays).finish(),
            WaitSchedule::Exponential {
                initial_delay,
                max_delay,
                multiplier,
                use_jitter,
            } => f
                .debug_struct("Exponential")
                .field("initial_delay", initial_delay)
                .field("max_delay", max_delay)
                .field("multiplier", multiplier)
                .field("use_jitter", use_jitter)
                .finish(),
            WaitSchedule::Backoff(_) => f.write_str("Backoff(<fn>)"),
        }
    }
}

impl Default for WaitSchedule {
    fn default() -> Self {
        WaitSchedule::Exponential {
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(30),
            multiplier: 2.0,
            use_jitter: true,
        }
    }
}

/// Retry policy configuration
///
/// `max_attempts` counts the first call, so `RetryPolicy::new(3)` invokes the
/// operation at most three times. An outcome is retried when it is an error
/// accepted by the error predicate, or a value accepted by the result
/// predicate.
pub struct RetryPolicy<T> {
    /// Maximum number of attempts, `None` retries until cancelled
    max_attempts: Option<usize>,
    schedule: WaitSchedule,
    retry_on_error: ErrorPredicate,
    retry_on_result: Option<ResultPredicate<T>>,
    on_retry: Option<RetryHook>,
}

impl<T> RetryPolicy<T> {
    /// Creates a new retry policy with exponential backoff
    pub fn new(max_attempts: usize) -> Self {
        Self {
            max_attempts: Some(max_attempts.max(1)),
            schedule: WaitSchedule::default(),
            retry_on_error: Arc::new(|e| !e.is_cancelled()),
            retry_on_result: None,
            on_retry: None,
        }
    }

    /// Creates a policy that retries until the outcome is accepted or the
    /// caller cancels
    pub fn forever() -> Self {
        Self {
            max_attempts: None,
            schedule: WaitSchedule::None,
            ..Self::new(1)
        }
    }

    /// Creates a policy that waits for each listed delay before re-attempting
    ///
    /// The operation runs at most `delays.len() + 1` times.
    pub fn wait_and_retry(delays: Vec<Duration>) -> Self {
        let attempts = delays.len() + 1;
        Self::new(attempts).with_schedule(WaitSchedule::Fixed(delays))
    }

    /// Creates a policy that retries until cancelled, waiting `backoff(n)`
    /// before the n-th retry
    pub fn wait_and_retry_forever<F>(backoff: F) -> Self
    where
        F: Fn(usize) -> Duration + Send + Sync + 'static,
    {
        Self::forever().with_backoff(backoff)
    }

    /// Replaces the wait schedule
    pub fn with_schedule(mut self, schedule: WaitSchedule) -> Self {
        self.schedule = schedule;
        self
    }

    /// Re-attempts immediately without waiting
    pub fn immediate(self) -> Self {
        self.with_schedule(WaitSchedule::None)
    }

    /// Waits `backoff(n)` before the n-th retry
    pub fn with_backoff<F>(self, backoff: F) -> Self
    where
        F: Fn(usize) -> Duration + Send + Sync + 'static,
    {
        self.with_schedule(WaitSchedule::Backoff(Arc::new(backoff)))
    }

    /// Sets the initial delay of the exponential schedule
    pub fn with_initial_delay(mut self, delay: Duration) -> Self {
        if let WaitSchedule::Exponential { initial_delay, .. } = &mut self.schedule {
            *initial_delay = delay;
        }
        self
    }

    /// Sets the maximum delay of the exponential schedule
    pub fn with_max_delay(mut self, delay: Duration) -> Self {
        if let WaitSchedule::Exponential { max_delay, .. } = &mut self.schedule {
            *max_delay = delay;
        }
        self
    }

    /// Sets the backoff multiplier of the exponential schedule
    pub fn with_multiplier(mut self, value: f64) -> Self {
        if let WaitSchedule::Exponential { multiplier, .. } = &mut self.schedule {
            *multiplier = value;
        }
        self
    }

    /// Sets whether the exponential schedule uses jitter
    pub fn with_jitter(mut self, enabled: bool) -> Self {
        if let WaitSchedule::Exponential { use_jitter, .. } = &mut self.schedule {
            *use_jitter = enabled;
        }
        self
    }

    /// Decides which errors are retried (default: everything except cancellation)
    pub fn handle_error<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&ResilienceError) -> bool + Send + Sync + 'static,
    {
        self.retry_on_error = Arc::new(predicate);
        self
    }

    /// Retries successful values the predicate accepts
    pub fn handle_result<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&T) -> bool + Send + Sync + 'static,
    {
        self.retry_on_result = Some(Arc::new(predicate));
        self
    }

    /// Called with the retry number and the delay before each re-attempt
    pub fn on_retry<F>(mut self, hook: F) -> Self
    where
        F: Fn(usize, Duration) + Send + Sync + 'static,
    {
        self.on_retry = Some(Arc::new(hook));
        self
    }

    /// Calculates the delay before the given retry (1-based)
    pub fn delay_for_attempt(&self, attempt: usize) -> Duration {
        self.schedule.delay(attempt)
    }

    /// Returns the maximum number of attempts, `None` when unlimited
    pub fn max_attempts(&self) -> Option<usize> {
        self.max_attempts
    }

    /// Returns the wait schedule
    pub fn schedule(&self) -> &WaitSchedule {
        &self.schedule
    }

    fn should_retry(&self, outcome: &Outcome<T>) -> bool {
        match outcome {
            Ok(value) => self
                .retry_on_result
                .as_ref()
                .is_some_and(|predicate| predicate(value)),
            Err(e) => (self.retry_on_error)(e),
        }
    }
}

impl<T> Clone for RetryPolicy<T> {
    fn clone(&self) -> Self {
        Self {
            max_attempts: self.max_attempts,
            schedule: self.schedule.clone(),
            retry_on_error: Arc::clone(&self.retry_on_error),
            retry_on_result: self.retry_on_result.clone(),
            on_retry: self.on_retry.clone(),
        }
    }
}

impl<T> std::fmt::Debug for RetryPolicy<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RetryPolicy")
            .field("max_attempts", &self.max_attempts)
            .field("schedule", &self.schedule)
            .field("retries_results", &self.retry_on_result.is_some())
            .finish()
    }
}

impl<T> Default for RetryPolicy<T> {
    fn default() -> Self {
        Self::new(3)
    }
}

impl<T: Send + 'static> Policy<T> for RetryPolicy<T> {
    fn execute(
        &self,
        operation: Operation<T>,
        ctx: ExecutionContext,
    ) -> BoxFuture<'static, Outcome<T>> {
        let policy = self.clone();
        Box::pin(async move { policy.run(operation, ctx).await })
    }

    fn name(&self) -> &'static str {
        "retry"
    }
}

impl<T: Send + 'static> RetryPolicy<T> {
    async fn run(&self, operation: Operation<T>, ctx: ExecutionContext) -> Outcome<T> {
        let mut attempt = 0;

        loop {
            if ctx.is_cancelled() {
                return Err(ResilienceError::Cancelled);
            }

            let outcome = operation.call(ctx.clone()).await;
            attempt += 1;

            if !self.should_retry(&outcome) {
                return outcome;
            }

            if self.max_attempts.is_some_and(|max| attempt >= max) {
                return match outcome {
                    Ok(value) => Ok(value),
                    Err(e) => {
                        log::warn!(
                            "[{}] retries exhausted after {} attempts: {}",
                            ctx.correlation_id(),
                            attempt,
                            e
                        );
                        Err(ResilienceError::RetriesExhausted {
                            attempts: attempt,
                            last_error: Box::new(e),
                        })
                    }
                };
            }

            let delay = self.delay_for_attempt(attempt);
            log::debug!(
                "[{}] attempt {} not accepted, retrying in {:?}",
                ctx.correlation_id(),
                attempt,
                delay
            );
            if let Some(hook) = &self.on_retry {
                hook(attempt, delay);
            }

            if delay.is_zero() {
                // Give other tasks on this worker a chance to cancel us.
                tokio::task::yield_now().await;
            } else {
                tokio::select! {
                    _ = tokio::time::sleep(delay) => {}
                    _ = ctx.cancellation().cancelled() => {
                        return Err(ResilienceError::Cancelled);
                    }
                }
            }
        }
    }
}
