// crates/resilience/src/lib.rs
//! Resilience policies for fault-tolerant operations
//!
//! Every policy implements [`Policy`] and can be used alone or composed
//! into a [`PolicyPipeline`]:
//! - Retry with fixed, exponential or custom wait schedules
//! - Circuit breaker (consecutive failures or failure ratio)
//! - Timeout (optimistic or cooperative)
//! - Bulkhead isolation
//! - Rate limiting
//! - Result caching
//! - Fallback
//!
//! # Example
//!
//! ```rust
//! use rampart_resilience::{
//!     CircuitBreaker, CircuitBreakerConfig, ExecutionContext, FallbackPolicy, Operation, Policy,
//!     PolicyPipeline, RetryPolicy,
//! };
//! use std::time::Duration;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let breaker = CircuitBreaker::new(CircuitBreakerConfig::new(5, Duration::from_secs(60)))
//!     .expect("valid breaker");
//!
//! let pipeline = PolicyPipeline::<u32>::new()
//!     .push(FallbackPolicy::value(0))
//!     .push(RetryPolicy::new(3).immediate())
//!     .push(breaker);
//!
//! let outcome = pipeline
//!     .execute(Operation::from_fn(|| Ok(7)), ExecutionContext::new())
//!     .await;
//! assert_eq!(outcome.ok(), Some(7));
//! # }
//! ```

mod bulkhead;
mod cache;
mod circuit_breaker;
mod clock;
mod context;
mod error;
mod fallback;
mod pipeline;
mod policy;
mod rate_limiter;
mod retry;
mod timeout;

pub use bulkhead::Bulkhead;
pub use cache::{CachePolicy, CacheProvider, MemoryCacheProvider, Ttl};
pub use circuit_breaker::{
    BreakInfo, CircuitBreaker, CircuitBreakerConfig, CircuitState, FailureMode,
};
pub use clock::{Clock, ManualClock, SystemClock};
pub use context::{CancellationSignal, ExecutionContext};
pub use error::{BoxError, BuildError, ErrorKind, Outcome, ResilienceError, ResilienceResult};
pub use fallback::{FallbackCause, FallbackPolicy};
pub use pipeline::{wrap, PolicyPipeline};
pub use policy::{NoOpPolicy, Operation, Policy};
pub use rate_limiter::RateLimiter;
pub use retry::{RetryPolicy, WaitSchedule};
pub use timeout::{with_timeout, Timeout, TimeoutStrategy};
