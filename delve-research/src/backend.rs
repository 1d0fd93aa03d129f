//! Collaborator contracts consumed by the research engine
//!
//! The engine never talks to an LLM or a search engine directly. Both are
//! reached through these traits so that providers can be swapped and tests
//! can script responses.

use crate::state::KnowledgeState;
use crate::strategy::SearchStrategy;
use crate::types::{Decision, DecisionRequest, QueryOutcome, SearchQuery, SearchResult, StateDelta};
use crate::ResearchResult;
use async_trait::async_trait;

/// Reasoning backend (typically an LLM) driving the decide/update/assess/synthesize steps
///
/// Every call may fail; the engine downgrades failures to uncertainties or
/// neutral values instead of aborting the run.
#[async_trait]
pub trait ReasoningBackend: Send + Sync {
    /// Propose the next searches, or signal that no productive query remains
    async fn decide(
        &self,
        state: &KnowledgeState,
        request: &DecisionRequest,
    ) -> ResearchResult<Decision>;

    /// Interpret a round's search outcomes as changes to the knowledge state
    async fn update(
        &self,
        state: &KnowledgeState,
        outcomes: &[QueryOutcome],
    ) -> ResearchResult<StateDelta>;

    /// Confidence adjustment the backend suggests for the current state
    async fn assess(&self, _state: &KnowledgeState) -> ResearchResult<f64> {
        Ok(0.0)
    }

    /// Optional narrative prose for the final report
    async fn synthesize(&self, _state: &KnowledgeState) -> ResearchResult<Option<String>> {
        Ok(None)
    }

    /// Name used in logs
    fn name(&self) -> &str {
        "reasoning"
    }
}

/// Search backend executing a single query
#[async_trait]
pub trait SearchBackend: Send + Sync {
    async fn search(
        &self,
        query: &SearchQuery,
        strategy: SearchStrategy,
    ) -> ResearchResult<Vec<SearchResult>>;

    /// Name used in logs
    fn name(&self) -> &str {
        "search"
    }
}
