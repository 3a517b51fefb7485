// crates/resilience/examples/resilience_demo.rs
//! Demonstration of resilience policies

use rampart_resilience::{
    Bulkhead, CachePolicy, CircuitBreaker, CircuitBreakerConfig, ExecutionContext,
    FallbackPolicy, MemoryCacheProvider, Operation, Policy, PolicyPipeline, RateLimiter,
    ResilienceError, RetryPolicy, Timeout,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

#[tokio::main]
async fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    println!("Resilience Policies Demo");
    println!("========================\n");

    demo_retry().await;
    println!();
    demo_circuit_breaker().await;
    println!();
    demo_rate_limiter().await;
    println!();
    demo_timeout().await;
    println!();
    demo_bulkhead().await;
    println!();
    demo_cache().await;
    println!();
    demo_pipeline().await;
}

fn flaky(fail_first: usize) -> Operation<u32> {
    let attempt = Arc::new(AtomicUsize::new(0));
    Operation::from_fn(move || {
        let n = attempt.fetch_add(1, Ordering::SeqCst) + 1;
        println!("  Attempt {}", n);
        if n <= fail_first {
            Err(ResilienceError::message("Simulated failure"))
        } else {
            Ok(42)
        }
    })
}

async fn demo_retry() {
    println!("1. Retry");
    println!("--------");

    let policy = RetryPolicy::new(3)
        .with_initial_delay(Duration::from_millis(100))
        .with_multiplier(2.0)
        .on_retry(|attempt, delay| println!("  Retry #{} in {:?}", attempt, delay));

    match policy.execute(flaky(2), ExecutionContext::new()).await {
        Ok(value) => println!("✓ Success after retries: {}", value),
        Err(e) => println!("✗ Failed: {}", e),
    }
}

async fn demo_circuit_breaker() {
    println!("2. Circuit Breaker");
    println!("------------------");

    let config = CircuitBreakerConfig::new(3, Duration::from_millis(100));
    let breaker = match CircuitBreaker::new(config) {
        Ok(breaker) => breaker
            .on_break(|info| println!("  Circuit opened after {} failures", info.failures))
            .on_reset(|| println!("  Circuit closed")),
        Err(e) => {
            println!("✗ {}", e);
            return;
        }
    };

    let failing = Operation::<u32>::from_fn(|| Err(ResilienceError::message("Service unavailable")));
    for i in 1..=5 {
        match breaker.execute(failing.clone(), ExecutionContext::new()).await {
            Ok(_) => println!("  Request {}: ✓ Success", i),
            Err(e) => println!("  Request {}: ✗ {}", i, e),
        }
    }
    println!("  Circuit state: {:?}", breaker.state());

    tokio::time::sleep(Duration::from_millis(150)).await;
    println!("  Waited for break duration...");
    println!("  Circuit state: {:?}", breaker.state());

    match breaker
        .execute(Operation::from_fn(|| Ok(42)), ExecutionContext::new())
        .await
    {
        Ok(_) => println!("  Trial call: ✓ Request succeeded"),
        Err(e) => println!("  Trial call: ✗ {}", e),
    }
    println!("  Circuit state: {:?}", breaker.state());
}

async fn demo_rate_limiter() {
    println!("3. Rate Limiter");
    println!("---------------");

    let limiter = match RateLimiter::new(5, Duration::from_secs(1)) {
        Ok(limiter) => limiter,
        Err(e) => {
            println!("✗ {}", e);
            return;
        }
    };
    println!("  Limit: {} requests per second", limiter.max_requests());

    for i in 1..=7 {
        match limiter
            .execute(Operation::from_fn(|| Ok(())), ExecutionContext::new())
            .await
        {
            Ok(()) => println!("  Request {}: ✓ Allowed", i),
            Err(e) => println!("  Request {}: ✗ {}", i, e),
        }
    }
}

fn sleeper(duration: Duration) -> Operation<u32> {
    Operation::new(move |_ctx| async move {
        tokio::time::sleep(duration).await;
        Ok(42)
    })
}

async fn demo_timeout() {
    println!("4. Timeout");
    println!("----------");

    let timeout = match Timeout::new(Duration::from_millis(50)) {
        Ok(timeout) => timeout,
        Err(e) => {
            println!("✗ {}", e);
            return;
        }
    };

    match timeout
        .execute(sleeper(Duration::from_millis(10)), ExecutionContext::new())
        .await
    {
        Ok(value) => println!("  Fast operation: ✓ Completed: {}", value),
        Err(e) => println!("  Fast operation: ✗ {}", e),
    }

    match timeout
        .execute(sleeper(Duration::from_millis(100)), ExecutionContext::new())
        .await
    {
        Ok(value) => println!("  Slow operation: ✓ Completed: {}", value),
        Err(e) => println!("  Slow operation: ✗ {}", e),
    }
}

async fn demo_bulkhead() {
    println!("5. Bulkhead");
    println!("-----------");

    let bulkhead = match Bulkhead::new(2, 1) {
        Ok(bulkhead) => bulkhead,
        Err(e) => {
            println!("✗ {}", e);
            return;
        }
    };

    let calls: Vec<_> = (0..4)
        .map(|_| {
            tokio::spawn(
                bulkhead.execute(sleeper(Duration::from_millis(50)), ExecutionContext::new()),
            )
        })
        .collect();

    for (i, call) in calls.into_iter().enumerate() {
        match call.await {
            Ok(Ok(_)) => println!("  Call {}: ✓ Completed", i + 1),
            Ok(Err(e)) => println!("  Call {}: ✗ {}", i + 1, e),
            Err(e) => println!("  Call {}: ✗ task failed: {}", i + 1, e),
        }
    }
}

async fn demo_cache() {
    println!("6. Cache");
    println!("--------");

    let cache = CachePolicy::new(
        Arc::new(MemoryCacheProvider::new()),
        Duration::from_secs(60),
    );
    let builds = Arc::new(AtomicUsize::new(0));
    let counter = builds.clone();
    let lookup = Operation::from_fn(move || Ok(counter.fetch_add(1, Ordering::SeqCst) as u32));

    for i in 1..=3 {
        let ctx = ExecutionContext::new().with_cache_key("account:42");
        match cache.execute(lookup.clone(), ctx).await {
            Ok(value) => println!("  Lookup {}: value {}", i, value),
            Err(e) => println!("  Lookup {}: ✗ {}", i, e),
        }
    }
    println!("  Operation invoked {} time(s)", builds.load(Ordering::SeqCst));
}

async fn demo_pipeline() {
    println!("7. Pipeline (fallback → retry → timeout)");
    println!("----------------------------------------");

    let timeout = match Timeout::new(Duration::from_millis(20)) {
        Ok(timeout) => timeout,
        Err(e) => {
            println!("✗ {}", e);
            return;
        }
    };
    let pipeline = PolicyPipeline::new()
        .push(FallbackPolicy::value(0u32).on_fallback(|_| println!("  Falling back")))
        .push(RetryPolicy::new(3).with_initial_delay(Duration::from_millis(10)))
        .push(timeout);

    match pipeline
        .execute(sleeper(Duration::from_millis(100)), ExecutionContext::new())
        .await
    {
        Ok(value) => println!("✓ Pipeline result: {}", value),
        Err(e) => println!("✗ Pipeline failed: {}", e),
    }
}
