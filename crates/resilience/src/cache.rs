// crates/resilience/src/cache.rs
//! Result memoization keyed by the execution context

use crate::clock::{self, Clock};
use crate::context::ExecutionContext;
use crate::error::Outcome;
use crate::policy::{Operation, Policy};
use futures::future::BoxFuture;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::Instant;

type KeyStrategy = Arc<dyn Fn(&ExecutionContext) -> Option<String> + Send + Sync>;

/// How long a cached value stays valid
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ttl {
    /// Expires a fixed duration after it was stored
    Relative(Duration),
    /// Expires a fixed duration after it was last read or stored
    Sliding(Duration),
}

impl Ttl {
    fn duration(&self) -> Duration {
        match self {
            Ttl::Relative(d) | Ttl::Sliding(d) => *d,
        }
    }
}

/// Storage backing a [`CachePolicy`]
///
/// Providers may be shared between policies to share memoized results.
pub trait CacheProvider<T>: Send + Sync {
    /// Returns the live value for `key`, if any
    fn get(&self, key: &str) -> Option<T>;

    /// Stores `value` under `key`
    fn put(&self, key: &str, value: T, ttl: Ttl);

    /// Removes `key`
    fn remove(&self, key: &str);
}

#[derive(Debug)]
struct CacheEntry<T> {
    value: T,
    expires_at: Instant,
    sliding: Option<Duration>,
}

/// In-memory cache provider with lazy expiry
#[derive(Debug)]
pub struct MemoryCacheProvider<T> {
    entries: Arc<Mutex<HashMap<String, CacheEntry<T>>>>,
    clock: Arc<dyn Clock>,
}

fn lock_entries<T>(
    entries: &Mutex<HashMap<String, CacheEntry<T>>>,
) -> MutexGuard<'_, HashMap<String, CacheEntry<T>>> {
    entries.lock().unwrap_or_else(|e| e.into_inner())
}

fn purge<T>(entries: &Mutex<HashMap<String, CacheEntry<T>>>, now: Instant) -> usize {
    let mut entries = lock_entries(entries);
    let before = entries.len();
    entries.retain(|_, entry| now < entry.expires_at);
    before - entries.len()
}

impl<T> MemoryCacheProvider<T> {
    /// Creates an empty provider
    pub fn new() -> Self {
        Self {
            entries: Arc::new(Mutex::new(HashMap::new())),
            clock: clock::system(),
        }
    }

    /// Uses the given clock instead of the system clock
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Number of stored entries, including expired ones not yet evicted
    pub fn len(&self) -> usize {
        lock_entries(&self.entries).len()
    }

    /// Returns true if nothing is stored
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Evicts every expired entry, returning how many were removed
    pub fn purge_expired(&self) -> usize {
        purge(&self.entries, self.clock.now())
    }
}

impl<T: Send + 'static> MemoryCacheProvider<T> {
    /// Spawns a task that evicts expired entries every `every`
    ///
    /// The task stops once the provider is dropped. Returns `None` when called
    /// outside a tokio runtime or with a zero interval.
    pub fn spawn_sweeper(&self, every: Duration) -> Option<JoinHandle<()>> {
        if every.is_zero() {
            return None;
        }
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            log::warn!("No tokio runtime available, cache sweeper not started");
            return None;
        };

        let entries: Weak<Mutex<HashMap<String, CacheEntry<T>>>> = Arc::downgrade(&self.entries);
        let clock = Arc::clone(&self.clock);

        Some(runtime.spawn(async move {
            let mut interval = tokio::time::interval(every);
            interval.tick().await;
            loop {
                interval.tick().await;
                let Some(entries) = entries.upgrade() else {
                    break;
                };
                let removed = purge(&entries, clock.now());
                if removed > 0 {
                    log::debug!("Cache sweep evicted {} expired entries", removed);
                }
            }
        }))
    }
}

impl<T> Default for MemoryCacheProvider<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Clone + Send> CacheProvider<T> for MemoryCacheProvider<T> {
    fn get(&self, key: &str) -> Option<T> {
        let now = self.clock.now();
        let mut entries = lock_entries(&self.entries);

        match entries.get_mut(key) {
            Some(entry) if now < entry.expires_at => {
                if let Some(window) = entry.sliding {
                    entry.expires_at = now + window;
                }
                Some(entry.value.clone())
            }
            Some(_) => {
                entries.remove(key);
                None
            }
            None => None,
        }
    }

    fn put(&self, key: &str, value: T, ttl: Ttl) {
        let now = self.clock.now();
        let entry = CacheEntry {
            value,
            expires_at: now + ttl.duration(),
            sliding: match ttl {
                Ttl::Sliding(d) => Some(d),
                Ttl::Relative(_) => None,
            },
        };
        lock_entries(&self.entries).insert(key.to_string(), entry);
    }

    fn remove(&self, key: &str) {
        lock_entries(&self.entries).remove(key);
    }
}

type BuildLocks = Arc<Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>>;

/// Drops the per-key build lock from the map once nobody else holds it
struct BuildLockHandle {
    locks: BuildLocks,
    key: String,
    lock: Arc<tokio::sync::Mutex<()>>,
}

impl BuildLockHandle {
    fn acquire(locks: &BuildLocks, key: &str) -> Self {
        let lock = {
            let mut map = locks.lock().unwrap_or_else(|e| e.into_inner());
            Arc::clone(map.entry(key.to_string()).or_default())
        };
        Self {
            locks: Arc::clone(locks),
            key: key.to_string(),
            lock,
        }
    }
}

impl Drop for BuildLockHandle {
    fn drop(&mut self) {
        let mut map = self.locks.lock().unwrap_or_else(|e| e.into_inner());
        // The map and this handle are the only owners left.
        if Arc::strong_count(&self.lock) == 2 {
            map.remove(&self.key);
        }
    }
}

/// Memoizes successful outcomes for the context's cache key
///
/// Calls without a key bypass the cache. Concurrent misses on the same key
/// are serialized so the operation runs once per key and expiry.
pub struct CachePolicy<T> {
    provider: Arc<dyn CacheProvider<T>>,
    ttl: Ttl,
    key_strategy: KeyStrategy,
    build_locks: BuildLocks,
}

impl<T> CachePolicy<T> {
    /// Creates a cache policy with a relative time-to-live
    pub fn new(provider: Arc<dyn CacheProvider<T>>, ttl: Duration) -> Self {
        Self::with_ttl(provider, Ttl::Relative(ttl))
    }

    /// Creates a cache policy with an explicit ttl strategy
    pub fn with_ttl(provider: Arc<dyn CacheProvider<T>>, ttl: Ttl) -> Self {
        Self {
            provider,
            ttl,
            key_strategy: Arc::new(|ctx| ctx.cache_key().map(str::to_string)),
            build_locks: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Derives the cache key from the context with a custom function
    pub fn with_key_strategy<F>(mut self, strategy: F) -> Self
    where
        F: Fn(&ExecutionContext) -> Option<String> + Send + Sync + 'static,
    {
        self.key_strategy = Arc::new(strategy);
        self
    }

    /// Returns the ttl strategy
    pub fn ttl(&self) -> Ttl {
        self.ttl
    }
}

impl<T> Clone for CachePolicy<T> {
    fn clone(&self) -> Self {
        Self {
            provider: Arc::clone(&self.provider),
            ttl: self.ttl,
            key_strategy: Arc::clone(&self.key_strategy),
            build_locks: Arc::clone(&self.build_locks),
        }
    }
}

impl<T> std::fmt::Debug for CachePolicy<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CachePolicy").field("ttl", &self.ttl).finish()
    }
}

impl<T: Clone + Send + 'static> CachePolicy<T> {
    async fn run(&self, operation: Operation<T>, ctx: ExecutionContext) -> Outcome<T> {
        let Some(key) = (self.key_strategy)(&ctx) else {
            return operation.call(ctx).await;
        };

        if let Some(value) = self.provider.get(&key) {
            log::debug!("[{}] cache hit for '{}'", ctx.correlation_id(), key);
            return Ok(value);
        }

        let handle = BuildLockHandle::acquire(&self.build_locks, &key);
        let _building = handle.lock.lock().await;

        // Another caller may have stored the value while we waited.
        if let Some(value) = self.provider.get(&key) {
            log::debug!("[{}] cache hit for '{}'", ctx.correlation_id(), key);
            return Ok(value);
        }

        log::debug!("[{}] cache miss for '{}'", ctx.correlation_id(), key);
        let outcome = operation.call(ctx).await;
        if let Ok(value) = &outcome {
            self.provider.put(&key, value.clone(), self.ttl);
        }
        outcome
    }
}

impl<T: Clone + Send + 'static> Policy<T> for CachePolicy<T> {
    fn execute(
        &self,
        operation: Operation<T>,
        ctx: ExecutionContext,
    ) -> BoxFuture<'static, Outcome<T>> {
        let policy = self.clone();
        Box::pin(async move { policy.run(operation, ctx).await })
    }

    fn name(&self) -> &'static str {
        "cache"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::error::ResilienceError;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn provider(clock: &ManualClock) -> Arc<MemoryCacheProvider<u32>> {
        Arc::new(MemoryCacheProvider::new().with_clock(Arc::new(clock.clone())))
    }

    fn counting(calls: &Arc<AtomicUsize>) -> Operation<u32> {
        let calls = calls.clone();
        Operation::from_fn(move || {
            let n = calls.fetch_add(1, Ordering::SeqCst) as u32;
            Ok(1000 + n)
        })
    }

    #[tokio::test]
    async fn test_second_call_served_from_cache() {
        let clock = ManualClock::new();
        let policy = CachePolicy::new(provider(&clock), Duration::from_secs(60));
        let calls = Arc::new(AtomicUsize::new(0));
        let ctx = ExecutionContext::new().with_cache_key("number");

        let first = policy.execute(counting(&calls), ctx.clone()).await.unwrap();
        clock.advance(Duration::from_secs(59));
        let second = policy.execute(counting(&calls), ctx.clone()).await.unwrap();

        assert_eq!(first, second);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_expired_entry_invokes_again() {
        let clock = ManualClock::new();
        let policy = CachePolicy::new(provider(&clock), Duration::from_secs(60));
        let calls = Arc::new(AtomicUsize::new(0));
        let ctx = ExecutionContext::new().with_cache_key("number");

        let first = policy.execute(counting(&calls), ctx.clone()).await.unwrap();
        clock.advance(Duration::from_secs(60));
        let second = policy.execute(counting(&calls), ctx).await.unwrap();

        assert_ne!(first, second);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_missing_key_bypasses_cache() {
        let clock = ManualClock::new();
        let cache = provider(&clock);
        let policy = CachePolicy::new(cache.clone(), Duration::from_secs(60));
        let calls = Arc::new(AtomicUsize::new(0));

        for _ in 0..3 {
            policy
                .execute(counting(&calls), ExecutionContext::new())
                .await
                .unwrap();
        }

        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn test_failures_are_not_cached() {
        let clock = ManualClock::new();
        let policy = CachePolicy::new(provider(&clock), Duration::from_secs(60));
        let ctx = ExecutionContext::new().with_cache_key("flaky");

        let failing = Operation::<u32>::from_fn(|| Err(ResilienceError::message("down")));
        assert!(policy.execute(failing, ctx.clone()).await.is_err());

        let calls = Arc::new(AtomicUsize::new(0));
        assert!(policy.execute(counting(&calls), ctx).await.is_ok());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_sliding_ttl_extends_on_read() {
        let clock = ManualClock::new();
        let cache = provider(&clock);

        cache.put("k", 7, Ttl::Sliding(Duration::from_secs(10)));
        clock.advance(Duration::from_secs(8));
        assert_eq!(cache.get("k"), Some(7));
        clock.advance(Duration::from_secs(8));
        assert_eq!(cache.get("k"), Some(7));
        clock.advance(Duration::from_secs(10));
        assert_eq!(cache.get("k"), None);
    }

    #[tokio::test]
    async fn test_shared_provider_shares_results() {
        let clock = ManualClock::new();
        let cache = provider(&clock);
        let a = CachePolicy::new(cache.clone(), Duration::from_secs(60));
        let b = CachePolicy::new(cache.clone(), Duration::from_secs(60));
        let calls = Arc::new(AtomicUsize::new(0));
        let ctx = ExecutionContext::new().with_cache_key("shared");

        let first = a.execute(counting(&calls), ctx.clone()).await.unwrap();
        let second = b.execute(counting(&calls), ctx).await.unwrap();

        assert_eq!(first, second);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_misses_build_once() {
        let policy = CachePolicy::new(
            Arc::new(MemoryCacheProvider::<u32>::new()),
            Duration::from_secs(60),
        );
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let slow = Operation::new(move |_ctx| {
            let counter = counter.clone();
            async move {
                tokio::time::sleep(Duration::from_millis(50)).await;
                Ok(counter.fetch_add(1, Ordering::SeqCst) as u32)
            }
        });

        let handles: Vec<_> = (0..5)
            .map(|_| {
                tokio::spawn(policy.execute(
                    slow.clone(),
                    ExecutionContext::new().with_cache_key("slow"),
                ))
            })
            .collect();

        for handle in handles {
            assert_eq!(handle.await.unwrap().unwrap(), 0);
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(policy.build_locks.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_purge_expired() {
        let clock = ManualClock::new();
        let cache = provider(&clock);
        cache.put("a", 1, Ttl::Relative(Duration::from_secs(1)));
        cache.put("b", 2, Ttl::Relative(Duration::from_secs(10)));

        clock.advance(Duration::from_secs(5));
        assert_eq!(cache.purge_expired(), 1);
        assert_eq!(cache.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_sweeper_evicts_in_background() {
        let cache = MemoryCacheProvider::<u32>::new();
        cache.put("a", 1, Ttl::Relative(Duration::from_secs(1)));
        let sweeper = cache.spawn_sweeper(Duration::from_secs(5)).unwrap();

        tokio::time::sleep(Duration::from_secs(6)).await;
        assert!(cache.is_empty());

        drop(cache);
        tokio::time::sleep(Duration::from_secs(6)).await;
        assert!(sweeper.is_finished());
    }

    #[test]
    fn test_sweeper_needs_runtime() {
        let cache = MemoryCacheProvider::<u32>::new();
        assert!(cache.spawn_sweeper(Duration::from_secs(1)).is_none());
    }

    #[tokio::test]
    async fn test_custom_key_strategy() {
        let clock = ManualClock::new();
        let policy = CachePolicy::new(provider(&clock), Duration::from_secs(60))
            .with_key_strategy(|ctx| Some(format!("user:{}", ctx.cache_key().unwrap_or("anon"))));
        let calls = Arc::new(AtomicUsize::new(0));

        policy
            .execute(counting(&calls), ExecutionContext::new())
            .await
            .unwrap();
        policy
            .execute(counting(&calls), ExecutionContext::new())
            .await
            .unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
