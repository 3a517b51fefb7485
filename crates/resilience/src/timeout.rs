// crates/resilience/src/timeout.rs
//! Timeout handling utilities
//!
//! Two enforcement strategies are available:
//!
//! - [`TimeoutStrategy::Optimistic`] spawns the operation and races it against
//!   a timer. When the timer wins the caller gets
//!   [`ResilienceError::Timeout`] immediately and the operation keeps running
//!   detached in the background. Its side effects may still happen.
//! - [`TimeoutStrategy::Cooperative`] runs the operation in place with a child
//!   context. At the deadline the child's cancellation signal fires and the
//!   policy waits for the operation to return before reporting the timeout.
//!   Operations that ignore the signal delay the timeout accordingly.

use crate::context::ExecutionContext;
use crate::error::{BuildError, Outcome, ResilienceError, ResilienceResult};
use crate::policy::{Operation, Policy};
use futures::future::BoxFuture;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

type TimeoutHook = Arc<dyn Fn(Duration) + Send + Sync>;

/// How a deadline is enforced
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TimeoutStrategy {
    /// Signal cancellation and wait for the operation to stop
    Cooperative,
    /// Race the operation and abandon it on timeout
    #[default]
    Optimistic,
}

/// Awaits a future with a timeout
pub async fn with_timeout<F>(duration: Duration, future: F) -> ResilienceResult<F::Output>
where
    F: Future,
{
    tokio::time::timeout(duration, future)
        .await
        .map_err(|_| ResilienceError::Timeout(duration))
}

/// Timeout wrapper for operations
#[derive(Clone)]
pub struct Timeout {
    duration: Duration,
    strategy: TimeoutStrategy,
    on_timeout: Option<TimeoutHook>,
}

impl Timeout {
    /// Creates a new optimistic timeout
    pub fn new(duration: Duration) -> Result<Self, BuildError> {
        if duration.is_zero() {
            return Err(BuildError::new(
                "timeout",
                "duration must be greater than zero",
            ));
        }

        Ok(Self {
            duration,
            strategy: TimeoutStrategy::default(),
            on_timeout: None,
        })
    }

    /// Sets the enforcement strategy
    pub fn with_strategy(mut self, strategy: TimeoutStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    /// Called with the configured duration whenever a call times out
    pub fn on_timeout<F>(mut self, hook: F) -> Self
    where
        F: Fn(Duration) + Send + Sync + 'static,
    {
        self.on_timeout = Some(Arc::new(hook));
        self
    }

    /// Gets the timeout duration
    pub fn duration(&self) -> Duration {
        self.duration
    }

    /// Gets the enforcement strategy
    pub fn strategy(&self) -> TimeoutStrategy {
        self.strategy
    }

    fn timed_out<T>(&self, ctx: &ExecutionContext) -> Outcome<T> {
        log::warn!(
            "[{}] operation timed out after {:?}",
            ctx.correlation_id(),
            self.duration
        );
        if let Some(hook) = &self.on_timeout {
            hook(self.duration);
        }
        Err(ResilienceError::Timeout(self.duration))
    }

    async fn run_optimistic<T: Send + 'static>(
        &self,
        operation: Operation<T>,
        ctx: ExecutionContext,
    ) -> Outcome<T> {
        // Dropping the handle on timeout detaches the task instead of aborting it.
        let handle = tokio::spawn(operation.call(ctx.clone()));

        match with_timeout(self.duration, handle).await {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(join_error)) if join_error.is_panic() => {
                std::panic::resume_unwind(join_error.into_panic())
            }
            Ok(Err(_)) => Err(ResilienceError::Cancelled),
            Err(_) => self.timed_out(&ctx),
        }
    }

    async fn run_cooperative<T: Send + 'static>(
        &self,
        operation: Operation<T>,
        ctx: ExecutionContext,
    ) -> Outcome<T> {
        let child = ctx.child();
        let signal = child.cancellation().clone();
        let future = operation.call(child);
        tokio::pin!(future);

        match with_timeout(self.duration, future.as_mut()).await {
            Ok(outcome) => outcome,
            Err(_) => {
                signal.cancel();
                let _ = future.await;
                self.timed_out(&ctx)
            }
        }
    }
}

impl std::fmt::Debug for Timeout {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Timeout")
            .field("duration", &self.duration)
            .field("strategy", &self.strategy)
            .finish()
    }
}

impl<T: Send + 'static> Policy<T> for Timeout {
    fn execute(
        &self,
        operation: Operation<T>,
        ctx: ExecutionContext,
    ) -> BoxFuture<'static, Outcome<T>> {
        let timeout = self.clone();
        Box::pin(async move {
            match timeout.strategy {
                TimeoutStrategy::Optimistic => timeout.run_optimistic(operation, ctx).await,
                TimeoutStrategy::Cooperative => timeout.run_cooperative(operation, ctx).await,
            }
        })
    }

    fn name(&self) -> &'static str {
        "timeout"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    fn sleeping(secs: f64, done: Arc<AtomicBool>) -> Operation<i32> {
        Operation::new(move |_ctx| {
            let done = done.clone();
            async move {
                tokio::time::sleep(Duration::from_secs_f64(secs)).await;
                done.store(true, Ordering::SeqCst);
                Ok(42)
            }
        })
    }

    #[test]
    fn test_zero_duration_rejected() {
        assert!(Timeout::new(Duration::ZERO).is_err());
    }

    #[test]
    fn test_timeout_duration() {
        let timeout = Timeout::new(Duration::from_secs(5)).unwrap();
        assert_eq!(timeout.duration(), Duration::from_secs(5));
        assert_eq!(timeout.strategy(), TimeoutStrategy::Optimistic);
    }

    #[tokio::test(start_paused = true)]
    async fn test_with_timeout_success() {
        let result = with_timeout(Duration::from_secs(1), async {
            tokio::time::sleep(Duration::from_millis(10)).await;
            42
        })
        .await;

        assert_eq!(result.ok(), Some(42));
    }

    #[tokio::test(start_paused = true)]
    async fn test_with_timeout_exceeded() {
        let result = with_timeout(Duration::from_millis(10), async {
            tokio::time::sleep(Duration::from_millis(50)).await;
            42
        })
        .await;

        assert!(matches!(result, Err(ResilienceError::Timeout(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn test_optimistic_rejects_slow_operation() {
        let timeout = Timeout::new(Duration::from_secs(2)).unwrap();
        let done = Arc::new(AtomicBool::new(false));

        let start = tokio::time::Instant::now();
        let result = timeout
            .execute(sleeping(30.0, done.clone()), ExecutionContext::new())
            .await;

        assert!(matches!(result, Err(ResilienceError::Timeout(_))));
        assert!(start.elapsed() < Duration::from_secs(3));
        assert!(!done.load(Ordering::SeqCst));
    }

    #[tokio::test(start_paused = true)]
    async fn test_optimistic_leaves_operation_running() {
        let timeout = Timeout::new(Duration::from_secs(2)).unwrap();
        let done = Arc::new(AtomicBool::new(false));

        let result = timeout
            .execute(sleeping(30.0, done.clone()), ExecutionContext::new())
            .await;
        assert!(result.is_err());

        tokio::time::sleep(Duration::from_secs(30)).await;
        assert!(done.load(Ordering::SeqCst));
    }

    #[tokio::test(start_paused = true)]
    async fn test_fast_operation_passes() {
        let timeout = Timeout::new(Duration::from_secs(2)).unwrap();
        let done = Arc::new(AtomicBool::new(false));

        let result = timeout
            .execute(sleeping(0.1, done.clone()), ExecutionContext::new())
            .await;

        assert_eq!(result.ok(), Some(42));
        assert!(done.load(Ordering::SeqCst));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cooperative_signals_operation() {
        let timeout = Timeout::new(Duration::from_secs(1))
            .unwrap()
            .with_strategy(TimeoutStrategy::Cooperative);
        let observed = Arc::new(AtomicBool::new(false));
        let flag = observed.clone();

        let op = Operation::new(move |ctx: ExecutionContext| {
            let flag = flag.clone();
            async move {
                ctx.cancellation().cancelled().await;
                flag.store(true, Ordering::SeqCst);
                Err(ResilienceError::Cancelled)
            }
        });

        let outer = ExecutionContext::new();
        let result: Outcome<i32> = timeout.execute(op, outer.clone()).await;

        assert!(matches!(result, Err(ResilienceError::Timeout(_))));
        assert!(observed.load(Ordering::SeqCst));
        assert!(!outer.is_cancelled());
    }

    #[tokio::test(start_paused = true)]
    async fn test_on_timeout_hook() {
        let fired = Arc::new(AtomicUsize::new(0));
        let counter = fired.clone();
        let timeout = Timeout::new(Duration::from_millis(100))
            .unwrap()
            .on_timeout(move |d| {
                assert_eq!(d, Duration::from_millis(100));
                counter.fetch_add(1, Ordering::SeqCst);
            });

        let _ = timeout
            .execute(
                sleeping(1.0, Arc::new(AtomicBool::new(false))),
                ExecutionContext::new(),
            )
            .await;

        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }
}
