// crates/resilience/src/pipeline.rs
//! Ordered composition of policies

use crate::context::ExecutionContext;
use crate::error::Outcome;
use crate::policy::{Operation, Policy};
use futures::future::BoxFuture;
use std::future::Future;
use std::sync::Arc;

/// Policies applied as nested layers, first element outermost
///
/// The first policy sees the call first and the outcome last. Order is kept
/// exactly as given. An empty pipeline runs the operation unmodified.
pub struct PolicyPipeline<T> {
    policies: Vec<Arc<dyn Policy<T>>>,
}

impl<T: Send + 'static> PolicyPipeline<T> {
    /// Creates an empty pipeline
    pub fn new() -> Self {
        Self {
            policies: Vec::new(),
        }
    }

    /// Appends a policy as the new innermost layer
    pub fn push<P>(mut self, policy: P) -> Self
    where
        P: Policy<T>,
    {
        self.policies.push(Arc::new(policy));
        self
    }

    /// Number of layers
    pub fn len(&self) -> usize {
        self.policies.len()
    }

    /// Returns true if the pipeline has no layers
    pub fn is_empty(&self) -> bool {
        self.policies.is_empty()
    }

    /// Layer names, outermost first
    pub fn names(&self) -> Vec<&'static str> {
        self.policies.iter().map(|p| p.name()).collect()
    }

    /// Executes an async closure through every layer
    pub async fn execute_fn<F, Fut>(&self, f: F, ctx: ExecutionContext) -> Outcome<T>
    where
        F: Fn(ExecutionContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Outcome<T>> + Send + 'static,
    {
        self.execute(Operation::new(f), ctx).await
    }
}

impl<T: Send + 'static> Default for PolicyPipeline<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Clone for PolicyPipeline<T> {
    fn clone(&self) -> Self {
        Self {
            policies: self.policies.clone(),
        }
    }
}

impl<T: 'static> std::fmt::Debug for PolicyPipeline<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let names: Vec<_> = self.policies.iter().map(|p| p.name()).collect();
        f.debug_struct("PolicyPipeline")
            .field("policies", &names)
            .finish()
    }
}

impl<T> From<Vec<Arc<dyn Policy<T>>>> for PolicyPipeline<T> {
    fn from(policies: Vec<Arc<dyn Policy<T>>>) -> Self {
        Self { policies }
    }
}

/// Builds a pipeline from policies in the given order
pub fn wrap<T>(policies: Vec<Arc<dyn Policy<T>>>) -> PolicyPipeline<T> {
    PolicyPipeline::from(policies)
}

impl<T: Send + 'static> Policy<T> for PolicyPipeline<T> {
    fn execute(
        &self,
        operation: Operation<T>,
        ctx: ExecutionContext,
    ) -> BoxFuture<'static, Outcome<T>> {
        // Each layer becomes the operation of the layer outside it.
        let composed = self.policies.iter().rev().fold(operation, |inner, policy| {
            let policy = Arc::clone(policy);
            Operation::new(move |ctx| policy.execute(inner.clone(), ctx))
        });
        composed.call(ctx)
    }

    fn name(&self) -> &'static str {
        "pipeline"
    }
}
