//! Rampart Configuration System
//!
//! Describes resilience pipelines in TOML and turns them into running
//! policies. Each policy has its own section implementing `ConfigSection`;
//! the `pipeline` list names which sections to apply and in what order.
//!
//! # Architecture
//!
//! - **Trait-based**: Each policy section is a type implementing `ConfigSection`
//! - **Ordered**: The first policy in `pipeline` is the outermost layer
//! - **Atomic writes**: Config files are never left in a corrupted state
//! - **Zero panics**: All errors are handled via Result types
//!
//! # Example
//!
//! ```rust
//! use rampart_config::{ConfigLoader, PipelineBuilder};
//!
//! let config = ConfigLoader::from_toml_str(
//!     r#"
//!     pipeline = ["retry", "timeout"]
//!
//!     [retry]
//!     max_attempts = 4
//!     backoff = "none"
//!
//!     [timeout]
//!     duration_ms = 500
//!     "#,
//! )
//! .expect("valid config");
//!
//! let pipeline = PipelineBuilder::<String>::new(config)
//!     .build()
//!     .expect("pipeline builds");
//! assert_eq!(pipeline.names(), vec!["retry", "timeout"]);
//! ```

mod builder;
mod error;
mod loader;
mod validation;

// Policy sections
mod bulkhead_settings;
mod cache_settings;
mod circuit_breaker_settings;
mod rate_limiter_settings;
mod retry_settings;
mod timeout_settings;

pub use builder::PipelineBuilder;
pub use error::{ConfigError, ConfigResult, ValidationError};
pub use loader::ConfigLoader;
pub use validation::{ConfigSection, Validator};

pub use bulkhead_settings::BulkheadSettings;
pub use cache_settings::CacheSettings;
pub use circuit_breaker_settings::{BreakerMode, CircuitBreakerSettings};
pub use rate_limiter_settings::RateLimiterSettings;
pub use retry_settings::{Backoff, RetrySettings};
pub use timeout_settings::{TimeoutMode, TimeoutSettings};

use serde::{Deserialize, Serialize};

/// Current config file format version
pub const CONFIG_VERSION: u32 = 1;

/// A policy that can appear in the pipeline
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum PolicyKind {
    Retry,
    CircuitBreaker,
    Timeout,
    Bulkhead,
    RateLimiter,
    Cache,
}

impl PolicyKind {
    /// Section name used in the config file
    pub fn as_str(&self) -> &'static str {
        match self {
            PolicyKind::Retry => "retry",
            PolicyKind::CircuitBreaker => "circuit_breaker",
            PolicyKind::Timeout => "timeout",
            PolicyKind::Bulkhead => "bulkhead",
            PolicyKind::RateLimiter => "rate_limiter",
            PolicyKind::Cache => "cache",
        }
    }
}

impl std::fmt::Display for PolicyKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Root configuration structure
///
/// Sections are optional; only those named in `pipeline` are required. A
/// file only contains the sections it spells out, while `Config::default()`
/// carries a retry, circuit breaker and timeout pipeline.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Config {
    /// Config file format version
    #[serde(default = "default_version")]
    pub version: u32,

    /// Policies to apply, outermost first
    #[serde(default)]
    pub pipeline: Vec<PolicyKind>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry: Option<RetrySettings>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub circuit_breaker: Option<CircuitBreakerSettings>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout: Option<TimeoutSettings>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bulkhead: Option<BulkheadSettings>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rate_limiter: Option<RateLimiterSettings>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cache: Option<CacheSettings>,
}

fn default_version() -> u32 {
    CONFIG_VERSION
}

fn validate_section<S: ConfigSection>(section: &Option<S>, errors: &mut Vec<ValidationError>) {
    let Some(section) = section else {
        return;
    };
    if let Err(mut e) = section.validate() {
        log::debug!("[{}] has {} invalid field(s)", section.section_name(), e.len());
        errors.append(&mut e);
    }
}

fn merge_section<S: ConfigSection>(base: &mut Option<S>, other: Option<S>) {
    if let Some(other) = other {
        match base {
            Some(current) => current.merge(other),
            None => *base = Some(other),
        }
    }
}

impl Config {
    /// Creates a new config with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns true if the section for `kind` is present
    pub fn has_section(&self, kind: PolicyKind) -> bool {
        match kind {
            PolicyKind::Retry => self.retry.is_some(),
            PolicyKind::CircuitBreaker => self.circuit_breaker.is_some(),
            PolicyKind::Timeout => self.timeout.is_some(),
            PolicyKind::Bulkhead => self.bulkhead.is_some(),
            PolicyKind::RateLimiter => self.rate_limiter.is_some(),
            PolicyKind::Cache => self.cache.is_some(),
        }
    }

    /// Returns the first pipeline entry without a section
    pub fn missing_section(&self) -> Option<PolicyKind> {
        self.pipeline
            .iter()
            .copied()
            .find(|kind| !self.has_section(*kind))
    }

    /// Validates the entire configuration
    ///
    /// Returns all validation errors found across all sections.
    pub fn validate(&self) -> Result<(), Vec<ValidationError>> {
        let mut errors = Vec::new();

        for kind in &self.pipeline {
            if !self.has_section(*kind) {
                errors.push(ValidationError::with_value(
                    "pipeline",
                    format!("lists a policy without a [{}] section", kind),
                    kind,
                ));
            }
        }

        validate_section(&self.retry, &mut errors);
        validate_section(&self.circuit_breaker, &mut errors);
        validate_section(&self.timeout, &mut errors);
        validate_section(&self.bulkhead, &mut errors);
        validate_section(&self.rate_limiter, &mut errors);
        validate_section(&self.cache, &mut errors);

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    /// Merges this config with another, preferring values from `other`
    ///
    /// A non-empty `pipeline` in `other` replaces this one. Sections present
    /// in `other` are merged into (or added to) this config.
    pub fn merge(&mut self, other: Config) {
        if !other.pipeline.is_empty() {
            self.pipeline = other.pipeline;
        }
        merge_section(&mut self.retry, other.retry);
        merge_section(&mut self.circuit_breaker, other.circuit_breaker);
        merge_section(&mut self.timeout, other.timeout);
        merge_section(&mut self.bulkhead, other.bulkhead);
        merge_section(&mut self.rate_limiter, other.rate_limiter);
        merge_section(&mut self.cache, other.cache);
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            version: CONFIG_VERSION,
            pipeline: vec![
                PolicyKind::Retry,
                PolicyKind::CircuitBreaker,
                PolicyKind::Timeout,
            ],
            retry: Some(RetrySettings::default()),
            circuit_breaker: Some(CircuitBreakerSettings::default()),
            timeout: Some(TimeoutSettings::default()),
            bulkhead: None,
            rate_limiter: None,
            cache: None,
        }
    }
}
