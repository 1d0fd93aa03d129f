//! Research run configuration

use crate::scoring::ScoringPolicy;
use crate::strategy::SearchStrategy;
use crate::{ResearchError, ResearchResult};
use delve_core::{load_toml, save_toml, RetryConfig};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Configuration of a single research run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResearchConfig {
    /// Hard cap on the number of rounds
    pub max_iterations: usize,
    /// Confidence at which the run stops early, in (0, 1]
    pub confidence_threshold: f64,
    /// Searches issued per decision
    pub search_iterations_per_round: usize,
    /// Fan-out hint for the decision step
    pub questions_per_search: usize,
    /// How a round's searches are executed
    pub strategy: SearchStrategy,
    /// Confidence scoring policy
    pub scoring: ScoringPolicy,
    /// Candidates below this confidence are retired, in [0, 1)
    pub prune_threshold: f64,
    /// Scale applied to candidate deltas not backed by a known fact, in [0, 1]
    pub unsupported_delta_weight: f64,
    /// Concurrency limit for the parallel strategy
    pub max_concurrent_searches: usize,
    /// Per-search timeout
    pub search_timeout_ms: Option<u64>,
    /// Whole-run timeout; the run ends as cancelled when it expires
    pub run_timeout_ms: Option<u64>,
    /// Retry policy for individual searches
    pub search_retry: RetryConfig,
}

impl Default for ResearchConfig {
    fn default() -> Self {
        Self {
            max_iterations: 5,
            confidence_threshold: 0.7,
            search_iterations_per_round: 3,
            questions_per_search: 3,
            strategy: SearchStrategy::Standard,
            scoring: ScoringPolicy::default(),
            prune_threshold: 0.02,
            unsupported_delta_weight: 0.5,
            max_concurrent_searches: 4,
            search_timeout_ms: Some(30_000),
            run_timeout_ms: None,
            search_retry: RetryConfig {
                max_attempts: 2,
                initial_delay_ms: 250,
                max_delay_ms: 2_000,
                backoff_multiplier: 2.0,
                jitter: true,
            },
        }
    }
}

impl ResearchConfig {
    /// Load configuration from a TOML file and validate it
    pub fn from_file<P: AsRef<Path>>(path: P) -> ResearchResult<Self> {
        let config: ResearchConfig = load_toml(path)?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to a TOML file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> ResearchResult<()> {
        save_toml(self, path)?;
        Ok(())
    }

    /// Check every option against its declared domain
    pub fn validate(&self) -> ResearchResult<()> {
        if self.max_iterations == 0 {
            return Err(ResearchError::configuration(
                "max_iterations",
                "must be a positive integer",
            ));
        }

        if !self.confidence_threshold.is_finite()
            || self.confidence_threshold <= 0.0
            || self.confidence_threshold > 1.0
        {
            return Err(ResearchError::configuration(
                "confidence_threshold",
                format!("must be in (0, 1], got {}", self.confidence_threshold),
            ));
        }

        if self.search_iterations_per_round == 0 {
            return Err(ResearchError::configuration(
                "search_iterations_per_round",
                "must be a positive integer",
            ));
        }

        if self.questions_per_search == 0 {
            return Err(ResearchError::configuration(
                "questions_per_search",
                "must be a positive integer",
            ));
        }

        if !(0.0..1.0).contains(&self.prune_threshold) {
            return Err(ResearchError::configuration(
                "prune_threshold",
                format!("must be in [0, 1), got {}", self.prune_threshold),
            ));
        }

        if !(0.0..=1.0).contains(&self.unsupported_delta_weight) {
            return Err(ResearchError::configuration(
                "unsupported_delta_weight",
                format!("must be in [0, 1], got {}", self.unsupported_delta_weight),
            ));
        }

        if self.max_concurrent_searches == 0 {
            return Err(ResearchError::configuration(
                "max_concurrent_searches",
                "must be a positive integer",
            ));
        }

        if self.search_timeout_ms == Some(0) {
            return Err(ResearchError::configuration(
                "search_timeout_ms",
                "must be positive when set",
            ));
        }

        if self.run_timeout_ms == Some(0) {
            return Err(ResearchError::configuration(
                "run_timeout_ms",
                "must be positive when set",
            ));
        }

        self.scoring.validate()?;

        self.search_retry
            .validate()
            .map_err(|e| ResearchError::configuration("search_retry", e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn field_of(result: ResearchResult<()>) -> String {
        match result {
            Err(ResearchError::Configuration { field, .. }) => field,
            other => panic!("expected configuration error, got {other:?}"),
        }
    }

    #[test]
    fn test_default_config_is_valid() {
        assert!(ResearchConfig::default().validate().is_ok());
    }

    #[test]
    fn test_rejects_out_of_domain_options() {
        let base = ResearchConfig::default();

        let config = ResearchConfig {
            max_iterations: 0,
            ..base.clone()
        };
        assert_eq!(field_of(config.validate()), "max_iterations");

        for threshold in [0.0, -0.1, 1.5, f64::NAN] {
            let config = ResearchConfig {
                confidence_threshold: threshold,
                ..base.clone()
            };
            assert_eq!(field_of(config.validate()), "confidence_threshold");
        }

        let config = ResearchConfig {
            search_iterations_per_round: 0,
            ..base.clone()
        };
        assert_eq!(field_of(config.validate()), "search_iterations_per_round");

        let config = ResearchConfig {
            questions_per_search: 0,
            ..base.clone()
        };
        assert_eq!(field_of(config.validate()), "questions_per_search");

        let config = ResearchConfig {
            prune_threshold: 1.0,
            ..base.clone()
        };
        assert_eq!(field_of(config.validate()), "prune_threshold");

        let config = ResearchConfig {
            run_timeout_ms: Some(0),
            ..base.clone()
        };
        assert_eq!(field_of(config.validate()), "run_timeout_ms");

        let mut config = base;
        config.search_retry.max_attempts = 0;
        assert_eq!(field_of(config.validate()), "search_retry");
    }

    #[test]
    fn test_threshold_of_one_is_allowed() {
        let config = ResearchConfig {
            confidence_threshold: 1.0,
            ..ResearchConfig::default()
        };
        assert!(config.validate().is_ok());
    }
}
