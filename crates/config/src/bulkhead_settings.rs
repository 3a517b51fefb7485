//! Bulkhead configuration section

use crate::validation::{ConfigSection, ValidationError, Validator};
use rampart_resilience::{BuildError, Bulkhead};
use serde::{Deserialize, Serialize};

/// Bulkhead settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct BulkheadSettings {
    /// Concurrent executions (1 - 10,000)
    pub max_concurrency: usize,

    /// Callers allowed to wait for a slot (0 - 100,000)
    pub max_queue: usize,
}

impl Default for BulkheadSettings {
    fn default() -> Self {
        Self {
            max_concurrency: 10,
            max_queue: 20,
        }
    }
}

impl BulkheadSettings {
    /// Builds a bulkhead
    pub fn build(&self) -> Result<Bulkhead, BuildError> {
        Bulkhead::new(self.max_concurrency, self.max_queue)
    }
}

impl ConfigSection for BulkheadSettings {
    fn validate(&self) -> Result<(), Vec<ValidationError>> {
        Validator::collect_errors(vec![
            Validator::in_range(self.max_concurrency, 1, 10_000, "bulkhead.max_concurrency"),
            Validator::in_range(self.max_queue, 0, 100_000, "bulkhead.max_queue"),
        ])
    }

    fn merge(&mut self, other: Self) {
        self.max_concurrency = other.max_concurrency;
        self.max_queue = other.max_queue;
    }

    fn section_name(&self) -> &'static str {
        "bulkhead"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_valid() {
        assert!(BulkheadSettings::default().validate().is_ok());
    }

    #[test]
    fn test_zero_concurrency_invalid() {
        let config = BulkheadSettings {
            max_concurrency: 0,
            max_queue: 5,
        };
        assert!(config.validate().is_err());
        assert!(config.build().is_err());
    }

    #[test]
    fn test_build() {
        let bulkhead = BulkheadSettings {
            max_concurrency: 3,
            max_queue: 6,
        }
        .build()
        .unwrap();
        assert_eq!(bulkhead.max_concurrency(), 3);
        assert_eq!(bulkhead.max_queue(), 6);
    }
}
