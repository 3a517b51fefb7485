//! Cache configuration section

use crate::validation::{ConfigSection, ValidationError, Validator};
use rampart_resilience::Ttl;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Cache settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct CacheSettings {
    /// Time-to-live in milliseconds
    pub ttl_ms: u64,

    /// Extend the ttl on every hit
    pub sliding: bool,

    /// Background eviction interval in milliseconds; 0 evicts lazily only
    pub sweep_interval_ms: u64,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            ttl_ms: 60_000,
            sliding: false,
            sweep_interval_ms: 0,
        }
    }
}

impl CacheSettings {
    /// Returns the ttl strategy
    pub fn ttl(&self) -> Ttl {
        let duration = Duration::from_millis(self.ttl_ms);
        if self.sliding {
            Ttl::Sliding(duration)
        } else {
            Ttl::Relative(duration)
        }
    }

    /// Returns the sweep interval, if background eviction is enabled
    pub fn sweep_interval(&self) -> Option<Duration> {
        (self.sweep_interval_ms > 0).then(|| Duration::from_millis(self.sweep_interval_ms))
    }
}

impl ConfigSection for CacheSettings {
    fn validate(&self) -> Result<(), Vec<ValidationError>> {
        Validator::collect_errors(vec![Validator::at_least(self.ttl_ms, 1, "cache.ttl_ms")])
    }

    fn merge(&mut self, other: Self) {
        self.ttl_ms = other.ttl_ms;
        self.sliding = other.sliding;
        self.sweep_interval_ms = other.sweep_interval_ms;
    }

    fn section_name(&self) -> &'static str {
        "cache"
    }
}
