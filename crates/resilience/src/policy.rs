// crates/resilience/src/policy.rs
//! The shared policy contract

use crate::context::ExecutionContext;
use crate::error::Outcome;
use futures::future::BoxFuture;
use std::future::Future;
use std::sync::Arc;

type OperationFn<T> = dyn Fn(ExecutionContext) -> BoxFuture<'static, Outcome<T>> + Send + Sync;

/// A unit of work wrapped by policies
///
/// An operation may be invoked any number of times (retries) and is cheap to
/// clone.
pub struct Operation<T> {
    f: Arc<OperationFn<T>>,
}

impl<T: Send + 'static> Operation<T> {
    /// Creates an operation from an async closure
    pub fn new<F, Fut>(f: F) -> Self
    where
        F: Fn(ExecutionContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Outcome<T>> + Send + 'static,
    {
        Self {
            f: Arc::new(move |ctx: ExecutionContext| -> BoxFuture<'static, Outcome<T>> {
                Box::pin(f(ctx))
            }),
        }
    }

    /// Creates an operation from a synchronous closure
    pub fn from_fn<F>(f: F) -> Self
    where
        F: Fn() -> Outcome<T> + Send + Sync + 'static,
    {
        Self {
            f: Arc::new(move |_ctx: ExecutionContext| -> BoxFuture<'static, Outcome<T>> {
                let outcome = f();
                Box::pin(async move { outcome })
            }),
        }
    }

    /// Invokes the operation once
    pub fn call(&self, ctx: ExecutionContext) -> BoxFuture<'static, Outcome<T>> {
        (self.f)(ctx)
    }
}

impl<T> Clone for Operation<T> {
    fn clone(&self) -> Self {
        Self {
            f: Arc::clone(&self.f),
        }
    }
}

impl<T> std::fmt::Debug for Operation<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Operation")
    }
}

/// A composable wrapper adding one resilience behavior to an operation
///
/// Implementations keep their state behind `Arc`, so the returned future
/// owns everything it needs.
pub trait Policy<T>: Send + Sync + 'static {
    /// Executes the operation under this policy
    fn execute(&self, operation: Operation<T>, ctx: ExecutionContext)
        -> BoxFuture<'static, Outcome<T>>;

    /// Short name used in logs
    fn name(&self) -> &'static str;
}

impl<T, P> Policy<T> for Arc<P>
where
    P: Policy<T> + ?Sized,
{
    fn execute(
        &self,
        operation: Operation<T>,
        ctx: ExecutionContext,
    ) -> BoxFuture<'static, Outcome<T>> {
        (**self).execute(operation, ctx)
    }

    fn name(&self) -> &'static str {
        (**self).name()
    }
}

/// Identity policy: runs the operation unmodified
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOpPolicy;

impl NoOpPolicy {
    /// Creates a no-op policy
    pub fn new() -> Self {
        Self
    }
}

impl<T: Send + 'static> Policy<T> for NoOpPolicy {
    fn execute(
        &self,
        operation: Operation<T>,
        ctx: ExecutionContext,
    ) -> BoxFuture<'static, Outcome<T>> {
        operation.call(ctx)
    }

    fn name(&self) -> &'static str {
        "noop"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ResilienceError;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn test_noop_returns_outcome_verbatim() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let op = Operation::from_fn(move || {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(2)
        });

        let value = NoOpPolicy::new().execute(op, ExecutionContext::new()).await;
        assert_eq!(value.ok(), Some(2));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_noop_passes_failure_through() {
        let op = Operation::<i32>::from_fn(|| Err(ResilienceError::message("boom")));
        let result = NoOpPolicy.execute(op, ExecutionContext::new()).await;
        assert!(matches!(result, Err(ResilienceError::Operation(_))));
    }

    #[tokio::test]
    async fn test_operation_receives_context() {
        let op = Operation::new(|ctx: ExecutionContext| async move {
            Ok(ctx.cache_key().unwrap_or_default().to_string())
        });
        let ctx = ExecutionContext::new().with_cache_key("k1");
        assert_eq!(op.call(ctx).await.ok().as_deref(), Some("k1"));
    }

    #[tokio::test]
    async fn test_arc_policy_delegates() {
        let policy: Arc<dyn Policy<i32>> = Arc::new(NoOpPolicy);
        assert_eq!(policy.name(), "noop");
        let result = policy
            .execute(Operation::from_fn(|| Ok(5)), ExecutionContext::new())
            .await;
        assert_eq!(result.ok(), Some(5));
    }
}
