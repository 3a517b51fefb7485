// crates/resilience/src/context.rs
//! Per-call execution context and cancellation

use futures::future::BoxFuture;
use std::sync::Arc;
use tokio::sync::watch;
use uuid::Uuid;

#[derive(Debug)]
struct SignalInner {
    tx: watch::Sender<bool>,
    parent: Option<CancellationSignal>,
}

/// Cloneable cancellation signal
///
/// All clones observe the same flag. A child signal is cancelled when either
/// it or any of its ancestors is cancelled; cancelling a child never affects
/// the parent.
#[derive(Debug, Clone)]
pub struct CancellationSignal {
    inner: Arc<SignalInner>,
}

impl CancellationSignal {
    /// Creates a signal that is not cancelled
    pub fn new() -> Self {
        Self::with_parent(None)
    }

    fn with_parent(parent: Option<CancellationSignal>) -> Self {
        let (tx, _rx) = watch::channel(false);
        Self {
            inner: Arc::new(SignalInner { tx, parent }),
        }
    }

    /// Creates a child signal linked to this one
    pub fn child(&self) -> Self {
        Self::with_parent(Some(self.clone()))
    }

    /// Requests cancellation
    pub fn cancel(&self) {
        self.inner.tx.send_replace(true);
    }

    /// Returns true if this signal or an ancestor was cancelled
    pub fn is_cancelled(&self) -> bool {
        *self.inner.tx.borrow()
            || self
                .inner
                .parent
                .as_ref()
                .is_some_and(|parent| parent.is_cancelled())
    }

    /// Resolves once cancellation is requested
    pub fn cancelled(&self) -> BoxFuture<'static, ()> {
        let this = self.clone();
        Box::pin(async move {
            let mut rx = this.inner.tx.subscribe();
            let own = async move {
                // The sender lives as long as `this`, so this only returns on cancel.
                let _ = rx.wait_for(|cancelled| *cancelled).await;
            };

            match this.inner.parent.clone() {
                Some(parent) => {
                    tokio::select! {
                        _ = own => {}
                        _ = parent.cancelled() => {}
                    }
                }
                None => own.await,
            }
        })
    }
}

impl Default for CancellationSignal {
    fn default() -> Self {
        Self::new()
    }
}

/// Context carried through every policy layer for a single call
#[derive(Debug, Clone)]
pub struct ExecutionContext {
    correlation_id: Uuid,
    cache_key: Option<String>,
    cancellation: CancellationSignal,
}

impl ExecutionContext {
    /// Creates a context with a fresh correlation id and no cache key
    pub fn new() -> Self {
        Self {
            correlation_id: Uuid::new_v4(),
            cache_key: None,
            cancellation: CancellationSignal::new(),
        }
    }

    /// Sets the cache key
    pub fn with_cache_key(mut self, key: impl Into<String>) -> Self {
        self.cache_key = Some(key.into());
        self
    }

    /// Sets the cancellation signal
    pub fn with_cancellation(mut self, signal: CancellationSignal) -> Self {
        self.cancellation = signal;
        self
    }

    /// Sets the correlation id
    pub fn with_correlation_id(mut self, id: Uuid) -> Self {
        self.correlation_id = id;
        self
    }

    /// Derives a context whose cancellation signal is a child of this one
    pub fn child(&self) -> Self {
        Self {
            correlation_id: self.correlation_id,
            cache_key: self.cache_key.clone(),
            cancellation: self.cancellation.child(),
        }
    }

    /// Returns the correlation id
    pub fn correlation_id(&self) -> Uuid {
        self.correlation_id
    }

    /// Returns the cache key, if any
    pub fn cache_key(&self) -> Option<&str> {
        self.cache_key.as_deref()
    }

    /// Returns the cancellation signal
    pub fn cancellation(&self) -> &CancellationSignal {
        &self.cancellation
    }

    /// Returns true if cancellation was requested
    pub fn is_cancelled(&self) -> bool {
        self.cancellation.is_cancelled()
    }
}

impl Default for ExecutionContext {
    fn default() -> Self {
        Self::new()
    }
}
