//! Query planning: ordering, deduplication and fallback generation

use crate::config::ResearchConfig;
use crate::state::{normalize_text, KnowledgeState};
use crate::types::*;
use std::cmp::Ordering;
use std::collections::HashSet;
use tracing::debug;

/// Queries the engine should issue next
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Plan {
    Queries(Vec<SearchQuery>),
    NoFurtherAction,
}

impl Plan {
    pub fn queries(&self) -> &[SearchQuery] {
        match self {
            Plan::Queries(queries) => queries,
            Plan::NoFurtherAction => &[],
        }
    }
}

/// Turns a backend decision into the round's queries
///
/// Proposals are ordered by what they target: open uncertainties first
/// (heaviest first), then the topic, then candidate exploration (weakest
/// candidate first). Anything already in the search history, or repeated
/// within the round, is dropped before truncation.
#[derive(Debug, Clone, Default)]
pub struct ResearchPlanner;

impl ResearchPlanner {
    pub fn new() -> Self {
        Self
    }

    /// Plan the next round
    ///
    /// `decision` is `None` when the reasoning backend failed to decide; the
    /// planner then generates queries from the state alone.
    pub fn plan(
        &self,
        state: &KnowledgeState,
        decision: Option<Decision>,
        config: &ResearchConfig,
    ) -> Plan {
        let proposed = match decision {
            Some(Decision::NoFurtherAction) => {
                debug!("Reasoning backend signalled no further action");
                return Plan::NoFurtherAction;
            }
            Some(Decision::Search(queries))
                if queries.iter().any(|q| !q.text.trim().is_empty()) =>
            {
                queries
            }
            _ => {
                let fallback = self.fallback_queries(state, config);
                debug!(count = fallback.len(), "Using fallback queries");
                fallback
            }
        };

        let queries = self.select(state, proposed, config.search_iterations_per_round);
        if queries.is_empty() {
            debug!("Every candidate query was already issued");
            Plan::NoFurtherAction
        } else {
            Plan::Queries(queries)
        }
    }

    /// Order, deduplicate and truncate proposed queries
    fn select(
        &self,
        state: &KnowledgeState,
        mut proposed: Vec<SearchQuery>,
        limit: usize,
    ) -> Vec<SearchQuery> {
        // Stable sort keeps the backend's order among equal ranks.
        proposed.sort_by(|a, b| compare_targets(state, &a.target, &b.target));

        let mut seen = HashSet::new();
        proposed
            .into_iter()
            .filter(|query| {
                let key = normalize_text(&query.text);
                !key.is_empty() && !state.has_searched(&key) && seen.insert(key)
            })
            .take(limit)
            .collect()
    }

    /// Queries derived from the state when the backend proposes none
    ///
    /// Evidence uncertainties are searched by their question; a round-failure
    /// uncertainty retries the queries that failed, while attempts remain.
    fn fallback_queries(&self, state: &KnowledgeState, config: &ResearchConfig) -> Vec<SearchQuery> {
        let mut open: Vec<(f64, SearchQuery)> = Vec::new();
        for uncertainty in state.uncertainties() {
            match uncertainty.origin {
                UncertaintyOrigin::Evidence if !state.has_searched(&uncertainty.question) => {
                    open.push((
                        uncertainty.weight,
                        SearchQuery::for_uncertainty(
                            uncertainty.question.clone(),
                            uncertainty.question.clone(),
                        ),
                    ));
                }
                UncertaintyOrigin::SearchFailure => {
                    for query in state.retryable_queries(&uncertainty.question) {
                        open.push((
                            uncertainty.weight,
                            SearchQuery::for_uncertainty(query, uncertainty.question.clone()),
                        ));
                    }
                }
                _ => {}
            }
        }
        if !open.is_empty() {
            open.sort_by(|a, b| b.0.total_cmp(&a.0));
            return open.into_iter().map(|(_, query)| query).collect();
        }

        if state.confidence() < config.confidence_threshold {
            let mut candidates: Vec<&CandidateAnswer> = state.candidate_answers().iter().collect();
            candidates.sort_by(|a, b| a.confidence.total_cmp(&b.confidence));
            let exploratory: Vec<SearchQuery> = candidates
                .into_iter()
                .map(|c| {
                    SearchQuery::for_candidate(format!("{} {}", c.answer, state.query()), c.answer.clone())
                })
                .filter(|query| !state.has_searched(&query.text))
                .collect();
            if !exploratory.is_empty() {
                return exploratory;
            }
        }

        if !state.has_searched(state.query()) {
            return vec![SearchQuery::topic(state.query())];
        }

        Vec::new()
    }
}

fn target_rank(state: &KnowledgeState, target: &QueryTarget) -> (u8, f64) {
    match target {
        QueryTarget::Uncertainty(question) => (
            0,
            -state.find_uncertainty(question).map_or(0.0, |u| u.weight),
        ),
        QueryTarget::Topic => (1, 0.0),
        QueryTarget::Candidate(answer) => (
            2,
            state.find_candidate(answer).map_or(1.0, |c| c.confidence),
        ),
    }
}

fn compare_targets(state: &KnowledgeState, a: &QueryTarget, b: &QueryTarget) -> Ordering {
    let (rank_a, key_a) = target_rank(state, a);
    let (rank_b, key_b) = target_rank(state, b);
    rank_a.cmp(&rank_b).then(key_a.total_cmp(&key_b))
}
