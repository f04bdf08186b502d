//! Verifier configuration.
//!
//! Explicit config object with environment-variable readers; constructed once
//! per process lifetime and handed to the service. No ambient state.

use std::time::Duration;

/// Tunables for the verification engine.
#[derive(Debug, Clone)]
pub struct VerifierConfig {
    /// Descriptor cache time-to-live
    pub cache_ttl: Duration,
    /// Descriptor cache capacity
    pub cache_capacity: usize,
    /// Retries per collaborator call after the initial attempt
    pub max_retries: u32,
    /// Deadline for a single verification attempt
    pub verify_timeout: Duration,
    /// Overall deadline for a batch run; `None` lets every entry finish
    pub batch_timeout: Option<Duration>,
    /// Parallel verification workers for batch runs
    pub worker_count: usize,
    /// Candidate cap for unconstrained searches (bounded-cost guard)
    pub max_candidates: usize,
    /// Score distance within which top candidates count as tied
    pub tie_margin: f64,
    /// Cap on a single listing page
    pub list_page_cap: usize,
    /// Cap on criteria-search results
    pub search_result_cap: usize,
}

impl Default for VerifierConfig {
    fn default() -> Self {
        Self {
            cache_ttl: Duration::from_secs(300),
            cache_capacity: 1024,
            max_retries: 3,
            verify_timeout: Duration::from_secs(30),
            batch_timeout: None,
            worker_count: 4,
            max_candidates: 100,
            tie_margin: 0.0,
            list_page_cap: 1000,
            search_result_cap: 200,
        }
    }
}

impl VerifierConfig {
    /// Read configuration from `TRAILPROOF_*` environment variables, keeping
    /// defaults for anything unset or unparseable.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            cache_ttl: env_secs("TRAILPROOF_CACHE_TTL").unwrap_or(defaults.cache_ttl),
            cache_capacity: env_parse("TRAILPROOF_CACHE_CAPACITY")
                .unwrap_or(defaults.cache_capacity),
            max_retries: env_parse("TRAILPROOF_MAX_RETRIES").unwrap_or(defaults.max_retries),
            verify_timeout: env_secs("TRAILPROOF_TIMEOUT").unwrap_or(defaults.verify_timeout),
            batch_timeout: env_secs("TRAILPROOF_BATCH_TIMEOUT").or(defaults.batch_timeout),
            worker_count: env_parse("TRAILPROOF_WORKERS")
                .filter(|&w: &usize| w > 0)
                .unwrap_or(defaults.worker_count),
            max_candidates: env_parse("TRAILPROOF_MAX_CANDIDATES")
                .filter(|&c: &usize| c > 0)
                .unwrap_or(defaults.max_candidates),
            tie_margin: env_parse("TRAILPROOF_TIE_MARGIN")
                .filter(|m: &f64| *m >= 0.0)
                .unwrap_or(defaults.tie_margin),
            list_page_cap: defaults.list_page_cap,
            search_result_cap: defaults.search_result_cap,
        }
    }
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok().and_then(|v| v.parse().ok())
}

fn env_secs(name: &str) -> Option<Duration> {
    env_parse::<u64>(name).map(Duration::from_secs)
}
