//! Circuit breaker configuration section

use crate::validation::{ConfigSection, ValidationError, Validator};
use rampart_resilience::{BuildError, CircuitBreaker, CircuitBreakerConfig};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// How failures trip the circuit
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum BreakerMode {
    /// Break after `failure_threshold` consecutive failures
    #[default]
    Consecutive,
    /// Break when the failure ratio over the sampling window reaches `failure_ratio`
    Ratio,
}

/// Circuit breaker settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct CircuitBreakerSettings {
    /// Consecutive failures before the circuit opens
    pub failure_threshold: usize,

    /// How long the circuit stays open, in milliseconds
    pub break_duration_ms: u64,

    /// Failure evaluation mode
    pub mode: BreakerMode,

    /// Failure ratio that opens the circuit in ratio mode (0.01 - 1.0)
    pub failure_ratio: f64,

    /// Sampling window for ratio mode, in milliseconds
    pub sampling_window_ms: u64,

    /// Calls required in the window before ratio mode can break
    pub min_throughput: usize,
}

impl Default for CircuitBreakerSettings {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            break_duration_ms: 60_000,
            mode: BreakerMode::Consecutive,
            failure_ratio: 0.5,
            sampling_window_ms: 10_000,
            min_throughput: 10,
        }
    }
}

impl CircuitBreakerSettings {
    /// Builds a circuit breaker
    pub fn build(&self) -> Result<CircuitBreaker, BuildError> {
        let mut config = CircuitBreakerConfig::new(
            self.failure_threshold,
            Duration::from_millis(self.break_duration_ms),
        );
        if self.mode == BreakerMode::Ratio {
            config = config.with_failure_ratio(
                self.failure_ratio,
                Duration::from_millis(self.sampling_window_ms),
                self.min_throughput,
            );
        }
        CircuitBreaker::new(config)
    }
}

impl ConfigSection for CircuitBreakerSettings {
    fn validate(&self) -> Result<(), Vec<ValidationError>> {
        let mut checks = vec![Validator::at_least(
            self.break_duration_ms,
            1,
            "circuit_breaker.break_duration_ms",
        )];
        match self.mode {
            BreakerMode::Consecutive => checks.push(Validator::in_range(
                self.failure_threshold,
                1,
                10_000,
                "circuit_breaker.failure_threshold",
            )),
            BreakerMode::Ratio => {
                checks.push(Validator::in_range(
                    self.failure_ratio,
                    0.01,
                    1.0,
                    "circuit_breaker.failure_ratio",
                ));
                checks.push(Validator::at_least(
                    self.sampling_window_ms,
                    1,
                    "circuit_breaker.sampling_window_ms",
                ));
                checks.push(Validator::at_least(
                    self.min_throughput,
                    1,
                    "circuit_breaker.min_throughput",
                ));
            }
        }
        Validator::collect_errors(checks)
    }

    fn merge(&mut self, other: Self) {
        self.failure_threshold = other.failure_threshold;
        self.break_duration_ms = other.break_duration_ms;
        self.mode = other.mode;
        self.failure_ratio = other.failure_ratio;
        self.sampling_window_ms = other.sampling_window_ms;
        self.min_throughput = other.min_throughput;
    }

    fn section_name(&self) -> &'static str {
        "circuit_breaker"
    }
}
