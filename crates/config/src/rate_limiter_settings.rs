//! Rate limiter configuration section

use crate::validation::{ConfigSection, ValidationError, Validator};
use rampart_resilience::{BuildError, RateLimiter};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Rate limiter settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct RateLimiterSettings {
    /// Executions permitted per window
    pub max_requests: usize,

    /// Window length in milliseconds
    pub window_ms: u64,

    /// Bucket capacity; defaults to `max_requests`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub burst: Option<usize>,
}

impl Default for RateLimiterSettings {
    fn default() -> Self {
        Self {
            max_requests: 100,
            window_ms: 1_000,
            burst: None,
        }
    }
}

impl RateLimiterSettings {
    /// Builds a rate limiter
    pub fn build(&self) -> Result<RateLimiter, BuildError> {
        let limiter = RateLimiter::new(self.max_requests, Duration::from_millis(self.window_ms))?;
        match self.burst {
            Some(burst) => limiter.with_burst(burst),
            None => Ok(limiter),
        }
    }
}

impl ConfigSection for RateLimiterSettings {
    fn validate(&self) -> Result<(), Vec<ValidationError>> {
        let mut checks = vec![
            Validator::at_least(self.max_requests, 1, "rate_limiter.max_requests"),
            Validator::at_least(self.window_ms, 1, "rate_limiter.window_ms"),
        ];
        if let Some(burst) = self.burst {
            checks.push(Validator::at_least(burst, 1, "rate_limiter.burst"));
        }
        Validator::collect_errors(checks)
    }

    fn merge(&mut self, other: Self) {
        self.max_requests = other.max_requests;
        self.window_ms = other.window_ms;
        if other.burst.is_some() {
            self.burst = other.burst;
        }
    }

    fn section_name(&self) -> &'static str {
        "rate_limiter"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_valid() {
        assert!(RateLimiterSettings::default().validate().is_ok());
    }

    #[test]
    fn test_invalid_values() {
        let config = RateLimiterSettings {
            max_requests: 0,
            window_ms: 0,
            burst: Some(0),
        };
        assert_eq!(config.validate().unwrap_err().len(), 3);
    }

    #[test]
    fn test_build_with_burst() {
        let limiter = RateLimiterSettings {
            max_requests: 20,
            window_ms: 1_000,
            burst: Some(5),
        }
        .build()
        .unwrap();
        assert_eq!(limiter.max_requests(), 20);
        assert_eq!(limiter.capacity(), 5);
    }

    #[test]
    fn test_merge_keeps_burst_when_unset() {
        let mut base = RateLimiterSettings {
            burst: Some(8),
            ..Default::default()
        };
        base.merge(RateLimiterSettings {
            max_requests: 50,
            ..Default::default()
        });
        assert_eq!(base.max_requests, 50);
        assert_eq!(base.burst, Some(8));
    }
}
