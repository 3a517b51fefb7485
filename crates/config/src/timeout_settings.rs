//! Timeout configuration section

use crate::validation::{ConfigSection, ValidationError, Validator};
use rampart_resilience::{BuildError, Timeout, TimeoutStrategy};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Timeout enforcement, mirrored for serialization
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum TimeoutMode {
    /// Signal cancellation and wait for the operation
    Cooperative,
    /// Abandon the operation at the deadline
    #[default]
    Optimistic,
}

impl From<TimeoutMode> for TimeoutStrategy {
    fn from(mode: TimeoutMode) -> Self {
        match mode {
            TimeoutMode::Cooperative => TimeoutStrategy::Cooperative,
            TimeoutMode::Optimistic => TimeoutStrategy::Optimistic,
        }
    }
}

/// Timeout settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct TimeoutSettings {
    /// Deadline in milliseconds (1 - 3,600,000)
    pub duration_ms: u64,

    /// Enforcement strategy
    pub strategy: TimeoutMode,
}

impl Default for TimeoutSettings {
    fn default() -> Self {
        Self {
            duration_ms: 30_000,
            strategy: TimeoutMode::Optimistic,
        }
    }
}

impl TimeoutSettings {
    /// Builds a timeout policy
    pub fn build(&self) -> Result<Timeout, BuildError> {
        Ok(Timeout::new(Duration::from_millis(self.duration_ms))?.with_strategy(self.strategy.into()))
    }
}

impl ConfigSection for TimeoutSettings {
    fn validate(&self) -> Result<(), Vec<ValidationError>> {
        Validator::collect_errors(vec![Validator::in_range(
            self.duration_ms,
            1,
            3_600_000,
            "timeout.duration_ms",
        )])
    }

    fn merge(&mut self, other: Self) {
        self.duration_ms = other.duration_ms;
        self.strategy = other.strategy;
    }

    fn section_name(&self) -> &'static str {
        "timeout"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_valid() {
        assert!(TimeoutSettings::default().validate().is_ok());
    }

    #[test]
    fn test_zero_duration_invalid() {
        let config = TimeoutSettings {
            duration_ms: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
        assert!(config.build().is_err());
    }

    #[test]
    fn test_build_cooperative() {
        let config = TimeoutSettings {
            duration_ms: 250,
            strategy: TimeoutMode::Cooperative,
        };
        let timeout = config.build().unwrap();
        assert_eq!(timeout.duration(), Duration::from_millis(250));
        assert_eq!(timeout.strategy(), TimeoutStrategy::Cooperative);
    }

    #[test]
    fn test_merge() {
        let mut base = TimeoutSettings::default();
        base.merge(TimeoutSettings {
            duration_ms: 10,
            strategy: TimeoutMode::Cooperative,
        });
        assert_eq!(base.duration_ms, 10);
        assert_eq!(base.strategy, TimeoutMode::Cooperative);
    }
}
