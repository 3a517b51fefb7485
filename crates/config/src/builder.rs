//! Builds policy pipelines from configuration

use crate::{Config, ConfigError, ConfigResult, PolicyKind};
use rampart_resilience::{
    CachePolicy, CacheProvider, Clock, MemoryCacheProvider, Policy, PolicyPipeline,
};
use std::sync::Arc;

/// Turns a [`Config`] into a [`PolicyPipeline`]
///
/// Policies are layered in exactly the order listed in `pipeline`.
pub struct PipelineBuilder<T> {
    config: Config,
    cache_provider: Option<Arc<dyn CacheProvider<T>>>,
    clock: Option<Arc<dyn Clock>>,
}

impl<T: Clone + Send + 'static> PipelineBuilder<T> {
    /// Creates a builder for the given config
    pub fn new(config: Config) -> Self {
        Self {
            config,
            cache_provider: None,
            clock: None,
        }
    }

    /// Uses a shared cache provider instead of a fresh in-memory one
    pub fn with_cache_provider(mut self, provider: Arc<dyn CacheProvider<T>>) -> Self {
        self.cache_provider = Some(provider);
        self
    }

    /// Uses the given clock for time-based policies
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Returns the config being built
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Validates the config and builds the pipeline
    pub fn build(&self) -> ConfigResult<PolicyPipeline<T>> {
        if let Some(kind) = self.config.missing_section() {
            return Err(ConfigError::MissingSection(kind));
        }
        if let Err(errors) = self.config.validate() {
            return Err(ConfigError::from_validation(&errors));
        }

        let mut policies: Vec<Arc<dyn Policy<T>>> = Vec::with_capacity(self.config.pipeline.len());
        for kind in &self.config.pipeline {
            policies.push(self.build_policy(*kind)?);
        }

        log::info!(
            "Built pipeline: [{}]",
            self.config
                .pipeline
                .iter()
                .map(|k| k.as_str())
                .collect::<Vec<_>>()
                .join(" -> ")
        );
        Ok(PolicyPipeline::from(policies))
    }

    fn build_policy(&self, kind: PolicyKind) -> ConfigResult<Arc<dyn Policy<T>>> {
        let missing = || ConfigError::MissingSection(kind);

        let policy: Arc<dyn Policy<T>> = match kind {
            PolicyKind::Retry => {
                let settings = self.config.retry.as_ref().ok_or_else(missing)?;
                Arc::new(settings.build::<T>())
            }
            PolicyKind::CircuitBreaker => {
                let settings = self.config.circuit_breaker.as_ref().ok_or_else(missing)?;
                let mut breaker = settings.build()?;
                if let Some(clock) = &self.clock {
                    breaker = breaker.with_clock(Arc::clone(clock));
                }
                Arc::new(breaker)
            }
            PolicyKind::Timeout => {
                let settings = self.config.timeout.as_ref().ok_or_else(missing)?;
                Arc::new(settings.build()?)
            }
            PolicyKind::Bulkhead => {
                let settings = self.config.bulkhead.as_ref().ok_or_else(missing)?;
                Arc::new(settings.build()?)
            }
            PolicyKind::RateLimiter => {
                let settings = self.config.rate_limiter.as_ref().ok_or_else(missing)?;
                let mut limiter = settings.build()?;
                if let Some(clock) = &self.clock {
                    limiter = limiter.with_clock(Arc::clone(clock));
                }
                Arc::new(limiter)
            }
            PolicyKind::Cache => {
                let settings = self.config.cache.as_ref().ok_or_else(missing)?;
                let provider = match &self.cache_provider {
                    Some(provider) => Arc::clone(provider),
                    None => {
                        let mut memory = MemoryCacheProvider::new();
                        if let Some(clock) = &self.clock {
                            memory = memory.with_clock(Arc::clone(clock));
                        }
                        if let Some(every) = settings.sweep_interval() {
                            memory.spawn_sweeper(every);
                        }
                        Arc::new(memory) as Arc<dyn CacheProvider<T>>
                    }
                };
                Arc::new(CachePolicy::with_ttl(provider, settings.ttl()))
            }
        };

        log::debug!("Built {} policy", kind);
        Ok(policy)
    }
}
