//! Retry configuration section

use crate::validation::{ConfigSection, ValidationError, Validator};
use rampart_resilience::{RetryPolicy, WaitSchedule};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Wait strategy between attempts
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum Backoff {
    /// Re-attempt immediately
    None,
    /// Wait for each entry of `delays_ms`, repeating the last one
    Fixed,
    /// Exponential backoff from `initial_delay_ms` up to `max_delay_ms`
    #[default]
    Exponential,
}

/// Retry settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RetrySettings {
    /// Attempts including the first call (1-100)
    pub max_attempts: usize,

    /// Retry until the caller cancels, ignoring `max_attempts`
    pub forever: bool,

    /// Wait strategy
    pub backoff: Backoff,

    /// Delays for `Backoff::Fixed`
    pub delays_ms: Vec<u64>,

    /// First exponential delay in milliseconds
    pub initial_delay_ms: u64,

    /// Exponential delay cap in milliseconds
    pub max_delay_ms: u64,

    /// Exponential growth factor (1.0 - 10.0)
    pub multiplier: f64,

    /// Spread exponential delays
    pub jitter: bool,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            forever: false,
            backoff: Backoff::Exponential,
            delays_ms: Vec::new(),
            initial_delay_ms: 100,
            max_delay_ms: 30_000,
            multiplier: 2.0,
            jitter: true,
        }
    }
}

impl RetrySettings {
    /// Returns the wait schedule these settings describe
    pub fn schedule(&self) -> WaitSchedule {
        match self.backoff {
            Backoff::None => WaitSchedule::None,
            Backoff::Fixed => WaitSchedule::Fixed(
                self.delays_ms
                    .iter()
                    .map(|ms| Duration::from_millis(*ms))
                    .collect(),
            ),
            Backoff::Exponential => WaitSchedule::Exponential {
                initial_delay: Duration::from_millis(self.initial_delay_ms),
                max_delay: Duration::from_millis(self.max_delay_ms),
                multiplier: self.multiplier,
                use_jitter: self.jitter,
            },
        }
    }

    /// Builds a retry policy
    pub fn build<T>(&self) -> RetryPolicy<T> {
        let policy = if self.forever {
            RetryPolicy::forever()
        } else {
            RetryPolicy::new(self.max_attempts)
        };
        policy.with_schedule(self.schedule())
    }
}

impl ConfigSection for RetrySettings {
    fn validate(&self) -> Result<(), Vec<ValidationError>> {
        let mut checks = vec![
            Validator::in_range(self.multiplier, 1.0, 10.0, "retry.multiplier"),
            Validator::ordered(
                self.initial_delay_ms,
                self.max_delay_ms,
                "retry.initial_delay_ms",
                "retry.max_delay_ms",
            ),
        ];
        if !self.forever {
            checks.push(Validator::in_range(
                self.max_attempts,
                1,
                100,
                "retry.max_attempts",
            ));
        }
        if self.backoff == Backoff::Fixed {
            checks.push(Validator::not_empty(&self.delays_ms, "retry.delays_ms"));
        }
        Validator::collect_errors(checks)
    }

    fn merge(&mut self, other: Self) {
        self.max_attempts = other.max_attempts;
        self.forever = other.forever;
        self.backoff = other.backoff;
        self.delays_ms = other.delays_ms;
        self.initial_delay_ms = other.initial_delay_ms;
        self.max_delay_ms = other.max_delay_ms;
        self.multiplier = other.multiplier;
        self.jitter = other.jitter;
    }

    fn section_name(&self) -> &'static str {
        "retry"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_valid() {
        let config = RetrySettings::default();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_invalid_attempts() {
        let config = RetrySettings {
            max_attempts: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_forever_ignores_attempts() {
        let config = RetrySettings {
            max_attempts: 0,
            forever: true,
            ..Default::default()
        };
        assert!(config.validate().is_ok());
        assert_eq!(config.build::<()>().max_attempts(), None);
    }

    #[test]
    fn test_fixed_requires_delays() {
        let config = RetrySettings {
            backoff: Backoff::Fixed,
            ..Default::default()
        };
        let errors = config.validate().unwrap_err();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].field, "retry.delays_ms");
    }

    #[test]
    fn test_fixed_schedule_built() {
        let config = RetrySettings {
            backoff: Backoff::Fixed,
            delays_ms: vec![100, 250],
            max_attempts: 4,
            ..Default::default()
        };
        let policy = config.build::<()>();
        assert_eq!(policy.max_attempts(), Some(4));
        assert_eq!(policy.delay_for_attempt(1), Duration::from_millis(100));
        assert_eq!(policy.delay_for_attempt(2), Duration::from_millis(250));
        assert_eq!(policy.delay_for_attempt(3), Duration::from_millis(250));
    }

    #[test]
    fn test_multiple_validation_errors() {
        let config = RetrySettings {
            max_attempts: 500,
            multiplier: 0.5,
            initial_delay_ms: 5_000,
            max_delay_ms: 1_000,
            ..Default::default()
        };
        assert_eq!(config.validate().unwrap_err().len(), 3);
    }

    #[test]
    fn test_merge() {
        let mut base = RetrySettings::default();
        let other = RetrySettings {
            max_attempts: 7,
            jitter: false,
            ..Default::default()
        };

        base.merge(other);
        assert_eq!(base.max_attempts, 7);
        assert!(!base.jitter);
    }
}
