// crates/resilience/src/fallback.rs
//! Fallback: substitute a recovery outcome for matched failures

use crate::context::ExecutionContext;
use crate::error::{ErrorKind, Outcome, ResilienceError};
use crate::policy::{Operation, Policy};
use futures::future::BoxFuture;
use std::future::Future;
use std::sync::Arc;

type ErrorPredicate = Arc<dyn Fn(&ResilienceError) -> bool + Send + Sync>;
type ResultPredicate<T> = Arc<dyn Fn(&T) -> bool + Send + Sync>;
type Substitute<T> =
    Arc<dyn Fn(FallbackCause<T>, ExecutionContext) -> BoxFuture<'static, Outcome<T>> + Send + Sync>;
type FallbackHook<T> = Arc<dyn Fn(&FallbackCause<T>) + Send + Sync>;

/// What triggered a fallback
#[derive(Debug)]
pub enum FallbackCause<T> {
    /// The inner call failed with a handled error
    Error(ResilienceError),
    /// The inner call succeeded with an unwanted value
    Result(T),
}

impl<T> FallbackCause<T> {
    /// Returns the handled error, if the cause was a failure
    pub fn error(&self) -> Option<&ResilienceError> {
        match self {
            FallbackCause::Error(e) => Some(e),
            FallbackCause::Result(_) => None,
        }
    }
}

/// Recovers from failures by running a substitute
///
/// By default every failure except cancellation is handled. Failures the
/// predicate rejects propagate unchanged.
pub struct FallbackPolicy<T> {
    substitute: Substitute<T>,
    handles: ErrorPredicate,
    handles_result: Option<ResultPredicate<T>>,
    on_fallback: Option<FallbackHook<T>>,
}

impl<T: Send + 'static> FallbackPolicy<T> {
    /// Falls back to a fixed value
    pub fn value(value: T) -> Self
    where
        T: Clone + Sync,
    {
        Self::with(move |_cause, _ctx| {
            let value = value.clone();
            async move { Ok(value) }
        })
    }

    /// Falls back to a substitute operation
    pub fn with<F, Fut>(substitute: F) -> Self
    where
        F: Fn(FallbackCause<T>, ExecutionContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Outcome<T>> + Send + 'static,
    {
        Self {
            substitute: Arc::new(
                move |cause: FallbackCause<T>, ctx: ExecutionContext| -> BoxFuture<'static, Outcome<T>> {
                    Box::pin(substitute(cause, ctx))
                },
            ),
            handles: Arc::new(|e| !e.is_cancelled()),
            handles_result: None,
            on_fallback: None,
        }
    }
}

impl<T> FallbackPolicy<T> {
    /// Only falls back for errors matching the predicate
    pub fn handle_error<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&ResilienceError) -> bool + Send + Sync + 'static,
    {
        self.handles = Arc::new(predicate);
        self
    }

    /// Only falls back for the listed error kinds
    pub fn handle_kinds(self, kinds: &[ErrorKind]) -> Self {
        let kinds = kinds.to_vec();
        self.handle_error(move |e| kinds.contains(&e.kind()))
    }

    /// Also falls back when a successful value matches the predicate
    pub fn handle_result<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&T) -> bool + Send + Sync + 'static,
    {
        self.handles_result = Some(Arc::new(predicate));
        self
    }

    /// Called with the cause before the substitute runs
    pub fn on_fallback<F>(mut self, hook: F) -> Self
    where
        F: Fn(&FallbackCause<T>) + Send + Sync + 'static,
    {
        self.on_fallback = Some(Arc::new(hook));
        self
    }

    fn should_handle(&self, outcome: &Outcome<T>) -> bool {
        match outcome {
            Ok(value) => self
                .handles_result
                .as_ref()
                .is_some_and(|predicate| predicate(value)),
            Err(e) => (self.handles)(e),
        }
    }
}

impl<T> Clone for FallbackPolicy<T> {
    fn clone(&self) -> Self {
        Self {
            substitute: Arc::clone(&self.substitute),
            handles: Arc::clone(&self.handles),
            handles_result: self.handles_result.clone(),
            on_fallback: self.on_fallback.clone(),
        }
    }
}

impl<T> std::fmt::Debug for FallbackPolicy<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FallbackPolicy")
            .field("handles_result", &self.handles_result.is_some())
            .finish()
    }
}

impl<T: Send + 'static> Policy<T> for FallbackPolicy<T> {
    fn execute(
        &self,
        operation: Operation<T>,
        ctx: ExecutionContext,
    ) -> BoxFuture<'static, Outcome<T>> {
        let policy = self.clone();
        Box::pin(async move {
            let outcome = operation.call(ctx.clone()).await;
            if !policy.should_handle(&outcome) {
                return outcome;
            }

            let cause = match outcome {
                Ok(value) => FallbackCause::Result(value),
                Err(e) => FallbackCause::Error(e),
            };
            match cause.error() {
                Some(e) => log::info!("[{}] falling back after: {}", ctx.correlation_id(), e),
                None => log::info!("[{}] falling back on unwanted result", ctx.correlation_id()),
            }
            if let Some(hook) = &policy.on_fallback {
                hook(&cause);
            }

            (policy.substitute)(cause, ctx).await
        })
    }

    fn name(&self) -> &'static str {
        "fallback"
    }
}
