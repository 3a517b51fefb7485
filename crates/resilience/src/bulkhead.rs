// crates/resilience/src/bulkhead.rs
//! Bulkhead isolation: bounded concurrency with a bounded wait queue

use crate::context::ExecutionContext;
use crate::error::{BuildError, Outcome, ResilienceError};
use crate::policy::{Operation, Policy};
use futures::future::BoxFuture;
use std::sync::Arc;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

/// Limits concurrent executions and queues a bounded number of callers
///
/// Admission takes a permit from a semaphore sized `max_concurrency +
/// max_queue` without waiting, so overflow is rejected immediately. Admitted
/// callers then wait in FIFO order for one of `max_concurrency` execution
/// permits.
#[derive(Debug, Clone)]
pub struct Bulkhead {
    max_concurrency: usize,
    max_queue: usize,
    admission: Arc<Semaphore>,
    execution: Arc<Semaphore>,
}

impl Bulkhead {
    /// Creates a new bulkhead
    pub fn new(max_concurrency: usize, max_queue: usize) -> Result<Self, BuildError> {
        if max_concurrency == 0 {
            return Err(BuildError::new(
                "bulkhead",
                "max concurrency must be at least 1",
            ));
        }

        let admitted = max_concurrency
            .checked_add(max_queue)
            .filter(|total| *total <= Semaphore::MAX_PERMITS)
            .ok_or_else(|| {
                BuildError::new(
                    "bulkhead",
                    format!(
                        "max concurrency plus max queue must not exceed {}",
                        Semaphore::MAX_PERMITS
                    ),
                )
            })?;

        Ok(Self {
            max_concurrency,
            max_queue,
            admission: Arc::new(Semaphore::new(admitted)),
            execution: Arc::new(Semaphore::new(max_concurrency)),
        })
    }

    /// Returns the maximum number of concurrent executions
    pub fn max_concurrency(&self) -> usize {
        self.max_concurrency
    }

    /// Returns the maximum number of queued callers
    pub fn max_queue(&self) -> usize {
        self.max_queue
    }

    /// Number of free execution slots
    pub fn available_execution_slots(&self) -> usize {
        self.execution.available_permits()
    }

    /// Number of free queue slots
    pub fn available_queue_slots(&self) -> usize {
        self.max_queue.saturating_sub(self.queued_count())
    }

    /// Number of callers currently executing
    pub fn active_count(&self) -> usize {
        self.max_concurrency - self.execution.available_permits()
    }

    /// Number of callers waiting for an execution slot
    pub fn queued_count(&self) -> usize {
        let admitted = self.max_concurrency + self.max_queue - self.admission.available_permits();
        admitted.saturating_sub(self.active_count())
    }

    fn rejected(&self) -> ResilienceError {
        ResilienceError::BulkheadRejected {
            max_concurrency: self.max_concurrency,
            max_queue: self.max_queue,
        }
    }

    async fn acquire(
        &self,
        ctx: &ExecutionContext,
    ) -> Result<(OwnedSemaphorePermit, OwnedSemaphorePermit), ResilienceError> {
        if ctx.is_cancelled() {
            return Err(ResilienceError::Cancelled);
        }

        let admission = Arc::clone(&self.admission)
            .try_acquire_owned()
            .map_err(|_| {
                log::warn!(
                    "[{}] bulkhead full ({} active, {} queued), rejecting",
                    ctx.correlation_id(),
                    self.max_concurrency,
                    self.max_queue
                );
                self.rejected()
            })?;

        let execution = tokio::select! {
            biased;
            _ = ctx.cancellation().cancelled() => {
                log::debug!("[{}] cancelled while queued in bulkhead", ctx.correlation_id());
                return Err(ResilienceError::Cancelled);
            }
            permit = Arc::clone(&self.execution).acquire_owned() => {
                permit.map_err(|_| self.rejected())?
            }
        };

        Ok((execution, admission))
    }
}

impl<T: Send + 'static> Policy<T> for Bulkhead {
    fn execute(
        &self,
        operation: Operation<T>,
        ctx: ExecutionContext,
    ) -> BoxFuture<'static, Outcome<T>> {
        let bulkhead = self.clone();
        Box::pin(async move {
            let _permits = bulkhead.acquire(&ctx).await?;
            operation.call(ctx).await
        })
    }

    fn name(&self) -> &'static str {
        "bulkhead"
    }
}
