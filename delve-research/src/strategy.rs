//! Search strategies and round execution

use crate::backend::SearchBackend;
use crate::cancel::RunGuard;
use crate::config::ResearchConfig;
use crate::types::{QueryOutcome, SearchQuery, SearchResult};
use crate::{ResearchError, ResearchResult};
use delve_core::{retry_async, with_timeout};
use futures::future::BoxFuture;
use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, warn};

/// Results kept per query by [`SearchStrategy::Rapid`]
pub const RAPID_RESULT_LIMIT: usize = 3;

/// How the searches of one round are executed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchStrategy {
    /// One query after another, keeping every result
    #[default]
    Standard,
    /// One query after another, keeping only the top results of each
    Rapid,
    /// All queries of the round concurrently
    Parallel,
    /// One query after another, each source contributing once per round
    SourceBased,
}

impl SearchStrategy {
    pub fn runs_concurrently(&self) -> bool {
        matches!(self, SearchStrategy::Parallel)
    }

    pub fn result_limit(&self) -> Option<usize> {
        match self {
            SearchStrategy::Rapid => Some(RAPID_RESULT_LIMIT),
            _ => None,
        }
    }

    pub fn dedups_sources(&self) -> bool {
        matches!(self, SearchStrategy::SourceBased)
    }
}

impl std::fmt::Display for SearchStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SearchStrategy::Standard => write!(f, "standard"),
            SearchStrategy::Rapid => write!(f, "rapid"),
            SearchStrategy::Parallel => write!(f, "parallel"),
            SearchStrategy::SourceBased => write!(f, "source_based"),
        }
    }
}

/// Executes a round's queries against the search backend
pub(crate) struct StrategyExecutor<'a> {
    backend: &'a Arc<dyn SearchBackend>,
    config: &'a ResearchConfig,
}

impl<'a> StrategyExecutor<'a> {
    pub(crate) fn new(backend: &'a Arc<dyn SearchBackend>, config: &'a ResearchConfig) -> Self {
        Self { backend, config }
    }

    /// Run every query, returning outcomes ordered by query index
    ///
    /// Returns `None` when the run is cancelled; in-flight searches are dropped
    /// and nothing from the round is kept.
    pub(crate) async fn execute(
        &self,
        queries: &[SearchQuery],
        guard: &RunGuard,
    ) -> Option<Vec<QueryOutcome>> {
        let strategy = self.config.strategy;
        debug!(
            strategy = %strategy,
            queries = queries.len(),
            "Executing search round"
        );

        let mut outcomes = if strategy.runs_concurrently() {
            let searches = stream::iter(queries.iter().cloned().enumerate())
                .map(|(index, query)| self.search_one(index, query))
                .buffered(self.config.max_concurrent_searches.max(1))
                .collect::<Vec<_>>();
            guard.race(searches).await?
        } else {
            let mut outcomes = Vec::with_capacity(queries.len());
            for (index, query) in queries.iter().cloned().enumerate() {
                if guard.is_cancelled() {
                    return None;
                }
                outcomes.push(guard.race(self.search_one(index, query)).await?);
            }
            outcomes
        };

        if let Some(limit) = strategy.result_limit() {
            for outcome in &mut outcomes {
                outcome.results.truncate(limit);
            }
        }

        if strategy.dedups_sources() {
            let mut seen = HashSet::new();
            for outcome in &mut outcomes {
                outcome
                    .results
                    .retain(|result| seen.insert(result.source.clone()));
            }
        }

        Some(outcomes)
    }

    async fn search_one(&self, index: usize, query: SearchQuery) -> QueryOutcome {
        match search_with_policy(self.backend, &query, self.config).await {
            Ok(results) => QueryOutcome {
                index,
                query,
                results,
                error: None,
            },
            Err(error) => {
                warn!(query = %query.text, error = %error, "Search failed, recording empty result");
                QueryOutcome {
                    index,
                    query,
                    results: Vec::new(),
                    error: Some(error.to_string()),
                }
            }
        }
    }
}

/// One search call wrapped in the configured timeout and retry policy
async fn search_with_policy(
    backend: &Arc<dyn SearchBackend>,
    query: &SearchQuery,
    config: &ResearchConfig,
) -> ResearchResult<Vec<SearchResult>> {
    let strategy = config.strategy;
    let timeout_ms = config.search_timeout_ms;

    let operation = || -> BoxFuture<'static, ResearchResult<Vec<SearchResult>>> {
        let backend = Arc::clone(backend);
        let query = query.clone();
        Box::pin(async move {
            match timeout_ms {
                Some(ms) => with_timeout(backend.search(&query, strategy), ms, "search")
                    .await
                    .map_err(ResearchError::from)
                    .and_then(|result| result),
                None => backend.search(&query, strategy).await,
            }
        })
    };

    retry_async(operation, &config.search_retry, "search").await
}

/// Short deterministic description of a query's results
pub(crate) fn summarize_results(outcome: &QueryOutcome) -> String {
    if let Some(error) = &outcome.error {
        return format!("search failed: {}", error);
    }
    if outcome.results.is_empty() {
        return "no results".to_string();
    }

    let mut sources: Vec<&str> = Vec::new();
    for result in &outcome.results {
        if !sources.contains(&result.source.as_str()) {
            sources.push(&result.source);
        }
    }
    let shown: Vec<&str> = sources.iter().take(3).copied().collect();
    let more = sources.len().saturating_sub(shown.len());
    let mut summary = format!(
        "{} result{} from {}",
        outcome.results.len(),
        if outcome.results.len() == 1 { "" } else { "s" },
        shown.join(", ")
    );
    if more > 0 {
        summary.push_str(&format!(" and {} more", more));
    }
    summary
}
