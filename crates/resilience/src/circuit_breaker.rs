// crates/resilience/src/circuit_breaker.rs
//! Circuit breaker pattern implementation

use crate::clock::{self, Clock};
use crate::context::ExecutionContext;
use crate::error::{BuildError, Outcome, ResilienceError, ResilienceResult};
use crate::policy::{Operation, Policy};
use futures::future::BoxFuture;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::time::Instant;

type ErrorPredicate = Arc<dyn Fn(&ResilienceError) -> bool + Send + Sync>;
type BreakHook = Arc<dyn Fn(&BreakInfo) + Send + Sync>;
type StateHook = Arc<dyn Fn() + Send + Sync>;

/// Circuit breaker states
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    /// Circuit is closed, requests flow normally
    Closed,
    /// Circuit is open, requests are rejected
    Open,
    /// Circuit is half-open, a single trial request tests if service recovered
    HalfOpen,
}

/// How failures are evaluated while the circuit is closed
#[derive(Debug, Clone, PartialEq)]
pub enum FailureMode {
    /// Break after `failure_threshold` consecutive failures
    Consecutive,
    /// Break when the failure ratio over `window` reaches `ratio`, once at
    /// least `min_throughput` calls were observed in that window
    Ratio {
        ratio: f64,
        window: Duration,
        min_throughput: usize,
    },
}

/// Circuit breaker configuration
#[derive(Debug, Clone)]
pub struct CircuitBreakerConfig {
    /// Number of consecutive failures before opening the circuit
    failure_threshold: usize,
    /// Duration the circuit stays open before admitting a trial
    break_duration: Duration,
    mode: FailureMode,
}

impl CircuitBreakerConfig {
    /// Creates a new configuration
    pub fn new(failure_threshold: usize, break_duration: Duration) -> Self {
        Self {
            failure_threshold,
            break_duration,
            mode: FailureMode::Consecutive,
        }
    }

    /// Breaks on failure ratio over a sliding window instead of a count
    pub fn with_failure_ratio(
        mut self,
        ratio: f64,
        window: Duration,
        min_throughput: usize,
    ) -> Self {
        self.mode = FailureMode::Ratio {
            ratio,
            window,
            min_throughput,
        };
        self
    }

    /// Returns the failure threshold
    pub fn failure_threshold(&self) -> usize {
        self.failure_threshold
    }

    /// Returns the break duration
    pub fn break_duration(&self) -> Duration {
        self.break_duration
    }

    /// Returns the failure evaluation mode
    pub fn mode(&self) -> &FailureMode {
        &self.mode
    }

    fn validate(&self) -> Result<(), BuildError> {
        if self.break_duration.is_zero() {
            return Err(BuildError::new(
                "circuit breaker",
                "break duration must be greater than zero",
            ));
        }

        match self.mode {
            FailureMode::Consecutive if self.failure_threshold == 0 => Err(BuildError::new(
                "circuit breaker",
                "failure threshold must be at least 1",
            )),
            FailureMode::Ratio {
                ratio,
                window,
                min_throughput,
            } => {
                if !(ratio > 0.0 && ratio <= 1.0) {
                    Err(BuildError::new(
                        "circuit breaker",
                        format!("failure ratio must be in (0, 1], got {}", ratio),
                    ))
                } else if window.is_zero() {
                    Err(BuildError::new(
                        "circuit breaker",
                        "sampling window must be greater than zero",
                    ))
                } else if min_throughput == 0 {
                    Err(BuildError::new(
                        "circuit breaker",
                        "minimum throughput must be at least 1",
                    ))
                } else {
                    Ok(())
                }
            }
            FailureMode::Consecutive => Ok(()),
        }
    }
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self::new(5, Duration::from_secs(60))
    }
}

/// Details passed to the break hook
#[derive(Debug, Clone)]
pub struct BreakInfo {
    /// Failures counted when the circuit opened
    pub failures: usize,
    /// How long the circuit stays open
    pub break_duration: Duration,
    /// Failure that tripped the circuit, if any
    pub last_error: Option<String>,
}

enum Transition {
    Broke(BreakInfo),
    Reset,
    HalfOpened,
}

/// Circuit breaker state
#[derive(Debug)]
struct CircuitBreakerState {
    state: CircuitState,
    failure_count: usize,
    opened_at: Option<Instant>,
    trial_in_flight: bool,
    isolated: bool,
    samples: VecDeque<(Instant, bool)>,
}

impl CircuitBreakerState {
    fn closed() -> Self {
        Self {
            state: CircuitState::Closed,
            failure_count: 0,
            opened_at: None,
            trial_in_flight: false,
            isolated: false,
            samples: VecDeque::new(),
        }
    }
}

/// Circuit breaker implementation
#[derive(Clone)]
pub struct CircuitBreaker {
    config: CircuitBreakerConfig,
    state: Arc<Mutex<CircuitBreakerState>>,
    clock: Arc<dyn Clock>,
    handles: ErrorPredicate,
    on_break: Option<BreakHook>,
    on_reset: Option<StateHook>,
    on_half_open: Option<StateHook>,
}

impl CircuitBreaker {
    /// Creates a new circuit breaker
    pub fn new(config: CircuitBreakerConfig) -> Result<Self, BuildError> {
        config.validate()?;

        Ok(Self {
            config,
            state: Arc::new(Mutex::new(CircuitBreakerState::closed())),
            clock: clock::system(),
            handles: Arc::new(|e| !e.is_cancelled()),
            on_break: None,
            on_reset: None,
            on_half_open: None,
        })
    }

    /// Uses the given clock instead of the system clock
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Decides which errors count as failures (default: everything except cancellation)
    pub fn handle_error<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&ResilienceError) -> bool + Send + Sync + 'static,
    {
        self.handles = Arc::new(predicate);
        self
    }

    /// Called after the circuit opens
    pub fn on_break<F>(mut self, hook: F) -> Self
    where
        F: Fn(&BreakInfo) + Send + Sync + 'static,
    {
        self.on_break = Some(Arc::new(hook));
        self
    }

    /// Called after the circuit closes again
    pub fn on_reset<F>(mut self, hook: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.on_reset = Some(Arc::new(hook));
        self
    }

    /// Called when the break duration elapses and a trial becomes possible
    pub fn on_half_open<F>(mut self, hook: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.on_half_open = Some(Arc::new(hook));
        self
    }

    /// Returns the configuration
    pub fn config(&self) -> &CircuitBreakerConfig {
        &self.config
    }

    fn lock(&self) -> MutexGuard<'_, CircuitBreakerState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Moves Open to HalfOpen once the break duration has elapsed
    fn refresh(&self, state: &mut CircuitBreakerState, now: Instant) -> Option<Transition> {
        if state.state != CircuitState::Open || state.isolated {
            return None;
        }

        let opened_at = state.opened_at?;
        if now.duration_since(opened_at) >= self.config.break_duration {
            state.state = CircuitState::HalfOpen;
            state.trial_in_flight = false;
            Some(Transition::HalfOpened)
        } else {
            None
        }
    }

    fn notify(&self, transition: Option<Transition>) {
        match transition {
            Some(Transition::Broke(info)) => {
                log::warn!(
                    "Circuit opened after {} failures, breaking for {:?}",
                    info.failures,
                    info.break_duration
                );
                if let Some(hook) = &self.on_break {
                    hook(&info);
                }
            }
            Some(Transition::Reset) => {
                log::info!("Circuit closed");
                if let Some(hook) = &self.on_reset {
                    hook();
                }
            }
            Some(Transition::HalfOpened) => {
                log::debug!("Circuit half-open, admitting a trial call");
                if let Some(hook) = &self.on_half_open {
                    hook();
                }
            }
            None => {}
        }
    }

    /// Gets the current state
    pub fn state(&self) -> CircuitState {
        let now = self.clock.now();
        let (current, transition) = {
            let mut state = self.lock();
            let transition = self.refresh(&mut state, now);
            (state.state, transition)
        };
        self.notify(transition);
        current
    }

    /// Gets the number of failures currently counted
    pub fn failure_count(&self) -> usize {
        self.lock().failure_count
    }

    /// Checks if a request can proceed
    ///
    /// In the half-open state the first caller is admitted as the trial and
    /// every other caller is rejected until the trial reports back.
    pub fn can_proceed(&self) -> ResilienceResult<()> {
        self.admit().map(|_| ())
    }

    /// Admits a call, returning whether it is the half-open trial
    fn admit(&self) -> ResilienceResult<bool> {
        let now = self.clock.now();
        let (result, transition) = {
            let mut state = self.lock();
            let transition = self.refresh(&mut state, now);

            let result = match state.state {
                CircuitState::Closed => Ok(false),
                CircuitState::HalfOpen if !state.trial_in_flight => {
                    state.trial_in_flight = true;
                    Ok(true)
                }
                CircuitState::HalfOpen => Err(ResilienceError::CircuitBreakerOpen {
                    failures: state.failure_count,
                    remaining: Duration::ZERO,
                }),
                CircuitState::Open => {
                    let remaining = if state.isolated {
                        self.config.break_duration
                    } else {
                        state
                            .opened_at
                            .map(|opened| {
                                self.config
                                    .break_duration
                                    .saturating_sub(now.duration_since(opened))
                            })
                            .unwrap_or(Duration::ZERO)
                    };
                    Err(ResilienceError::CircuitBreakerOpen {
                        failures: state.failure_count,
                        remaining,
                    })
                }
            };
            (result, transition)
        };

        self.notify(transition);
        if result.is_err() {
            log::debug!("Circuit breaker rejected call");
        }
        result
    }

    /// Records a successful operation
    pub fn record_success(&self) {
        self.on_success(true);
    }

    /// Records a failed operation
    pub fn record_failure(&self) {
        self.on_failure(true, None);
    }

    fn on_success(&self, trial: bool) {
        let now = self.clock.now();
        let transition = {
            let mut state = self.lock();
            match state.state {
                CircuitState::HalfOpen if trial => {
                    state.state = CircuitState::Closed;
                    state.failure_count = 0;
                    state.trial_in_flight = false;
                    state.opened_at = None;
                    state.samples.clear();
                    Some(Transition::Reset)
                }
                CircuitState::Closed => {
                    match self.config.mode {
                        FailureMode::Consecutive => state.failure_count = 0,
                        FailureMode::Ratio { window, .. } => {
                            state.samples.push_back((now, true));
                            Self::prune(&mut state, now, window);
                        }
                    }
                    None
                }
                _ => None,
            }
        };
        self.notify(transition);
    }

    fn on_failure(&self, trial: bool, error: Option<&ResilienceError>) {
        let now = self.clock.now();
        let transition = {
            let mut state = self.lock();
            match state.state {
                CircuitState::HalfOpen if trial => {
                    state.state = CircuitState::Open;
                    state.opened_at = Some(now);
                    state.trial_in_flight = false;
                    state.failure_count += 1;
                    Some(Transition::Broke(BreakInfo {
                        failures: state.failure_count,
                        break_duration: self.config.break_duration,
                        last_error: error.map(|e| e.to_string()),
                    }))
                }
                CircuitState::Closed => {
                    let should_break = match self.config.mode {
                        FailureMode::Consecutive => {
                            state.failure_count += 1;
                            state.failure_count >= self.config.failure_threshold
                        }
                        FailureMode::Ratio {
                            ratio,
                            window,
                            min_throughput,
                        } => {
                            state.samples.push_back((now, false));
                            Self::prune(&mut state, now, window);
                            let total = state.samples.len();
                            total >= min_throughput
                                && state.failure_count as f64 / total as f64 >= ratio
                        }
                    };

                    if should_break {
                        state.state = CircuitState::Open;
                        state.opened_at = Some(now);
                        Some(Transition::Broke(BreakInfo {
                            failures: state.failure_count,
                            break_duration: self.config.break_duration,
                            last_error: error.map(|e| e.to_string()),
                        }))
                    } else {
                        None
                    }
                }
                _ => None,
            }
        };
        self.notify(transition);
    }

    /// Releases an abandoned or unhandled trial without changing state
    fn release_trial(&self) {
        let mut state = self.lock();
        if state.state == CircuitState::HalfOpen {
            state.trial_in_flight = false;
        }
    }

    fn prune(state: &mut CircuitBreakerState, now: Instant, window: Duration) {
        while let Some(&(at, _)) = state.samples.front() {
            if now.duration_since(at) > window {
                state.samples.pop_front();
            } else {
                break;
            }
        }
        state.failure_count = state.samples.iter().filter(|(_, ok)| !ok).count();
    }

    /// Holds the circuit open until [`reset`](Self::reset) is called
    pub fn isolate(&self) {
        let now = self.clock.now();
        let transition = {
            let mut state = self.lock();
            state.state = CircuitState::Open;
            state.opened_at = Some(now);
            state.isolated = true;
            state.trial_in_flight = false;
            Transition::Broke(BreakInfo {
                failures: state.failure_count,
                break_duration: self.config.break_duration,
                last_error: None,
            })
        };
        self.notify(Some(transition));
    }

    /// Resets the circuit breaker to closed state
    pub fn reset(&self) {
        let transition = {
            let mut state = self.lock();
            let was_closed = state.state == CircuitState::Closed;
            *state = CircuitBreakerState::closed();
            (!was_closed).then_some(Transition::Reset)
        };
        self.notify(transition);
    }
}

impl std::fmt::Debug for CircuitBreaker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CircuitBreaker")
            .field("config", &self.config)
            .field("state", &self.lock().state)
            .finish()
    }
}

/// Releases the trial slot if the trial future is dropped before completing
struct TrialGuard {
    breaker: Option<CircuitBreaker>,
}

impl TrialGuard {
    fn disarm(&mut self) {
        self.breaker = None;
    }
}

impl Drop for TrialGuard {
    fn drop(&mut self) {
        if let Some(breaker) = self.breaker.take() {
            breaker.release_trial();
        }
    }
}

impl<T: Send + 'static> Policy<T> for CircuitBreaker {
    fn execute(
        &self,
        operation: Operation<T>,
        ctx: ExecutionContext,
    ) -> BoxFuture<'static, Outcome<T>> {
        let breaker = self.clone();
        Box::pin(async move {
            let trial = breaker.admit()?;
            let mut guard = TrialGuard {
                breaker: trial.then(|| breaker.clone()),
            };

            let outcome = operation.call(ctx).await;
            guard.disarm();

            match &outcome {
                Ok(_) => breaker.on_success(trial),
                Err(e) if (breaker.handles)(e) => breaker.on_failure(trial, Some(e)),
                Err(_) if trial => breaker.release_trial(),
                Err(_) => {}
            }
            outcome
        })
    }

    fn name(&self) -> &'static str {
        "circuit_breaker"
    }
}
