//! Types shared between the convergence loop and its collaborators

use crate::strategy::SearchStrategy;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A piece of evidence extracted from search results, with provenance
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Fact {
    /// The fact content
    pub content: String,
    /// Source reference the fact was extracted from
    pub source: String,
    /// Iteration in which the fact was learned (1-based)
    pub iteration: usize,
}

/// Why an uncertainty was raised
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UncertaintyOrigin {
    /// Raised by the reasoning backend while interpreting evidence
    Evidence,
    /// Every search of a round failed
    SearchFailure,
    /// The reasoning backend could not interpret a round's results
    ReasoningFailure,
}

/// An open question the loop has not yet resolved with evidence
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Uncertainty {
    pub question: String,
    /// Importance in [0, 1]; higher weights are targeted first
    pub weight: f64,
    /// Iteration in which the uncertainty was raised
    pub raised_at: usize,
    pub origin: UncertaintyOrigin,
}

/// A provisional answer to the research question
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateAnswer {
    pub answer: String,
    /// Confidence in [0, 1]
    pub confidence: f64,
    /// Iteration in which the candidate was first proposed
    pub first_seen: usize,
    /// Normalized contents of the key facts supporting this candidate
    pub supporting_facts: Vec<String>,
}

impl CandidateAnswer {
    /// Number of key facts supporting this candidate
    pub fn support(&self) -> usize {
        self.supporting_facts.len()
    }
}

/// One issued search, kept for deduplication and citation assembly
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchRecord {
    pub iteration: usize,
    pub query: String,
    pub strategy: SearchStrategy,
    pub results_summary: String,
    pub result_count: usize,
    /// Sources returned for this query, in result order
    pub sources: Vec<String>,
    pub failed: bool,
}

/// What a query is meant to investigate
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryTarget {
    /// The research question as a whole
    #[default]
    Topic,
    /// A specific open uncertainty
    Uncertainty(String),
    /// Evidence for or against a candidate answer
    Candidate(String),
}

/// A search query proposed during the decision phase
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchQuery {
    pub text: String,
    #[serde(default)]
    pub target: QueryTarget,
}

impl SearchQuery {
    pub fn topic(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            target: QueryTarget::Topic,
        }
    }

    pub fn for_uncertainty(text: impl Into<String>, question: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            target: QueryTarget::Uncertainty(question.into()),
        }
    }

    pub fn for_candidate(text: impl Into<String>, answer: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            target: QueryTarget::Candidate(answer.into()),
        }
    }
}

/// A single search hit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResult {
    /// Source reference (URL, document id, ...)
    pub source: String,
    /// Extracted snippet
    pub snippet: String,
    /// Optional structured fields
    #[serde(default)]
    pub fields: BTreeMap<String, String>,
}

impl SearchResult {
    pub fn new(source: impl Into<String>, snippet: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            snippet: snippet.into(),
            fields: BTreeMap::new(),
        }
    }
}

/// The outcome of one query within a round
#[derive(Debug, Clone, PartialEq)]
pub struct QueryOutcome {
    /// Position of the query within its round
    pub index: usize,
    pub query: SearchQuery,
    pub results: Vec<SearchResult>,
    /// Set when the search failed; `results` is then empty
    pub error: Option<String>,
}

impl QueryOutcome {
    pub fn failed(&self) -> bool {
        self.error.is_some()
    }
}

/// Hints passed to the reasoning backend when it decides the next searches
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecisionRequest {
    /// Searches that will be issued this round at most
    pub max_queries: usize,
    /// Fan-out hint: sub-questions to consider per search
    pub questions_per_search: usize,
    pub iteration: usize,
}

/// What the reasoning backend wants to do next
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    /// Issue these searches; an empty list lets the planner choose
    Search(Vec<SearchQuery>),
    /// No productive query can be formed
    NoFurtherAction,
}

/// A fact the reasoning backend extracted from search results
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FactDraft {
    pub content: String,
    #[serde(default)]
    pub source: String,
    /// Uncertainty this fact fully resolves
    #[serde(default)]
    pub resolves: Option<String>,
}

/// A gap the reasoning backend noticed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UncertaintyDraft {
    pub question: String,
    #[serde(default = "default_uncertainty_weight")]
    pub weight: f64,
}

fn default_uncertainty_weight() -> f64 {
    0.5
}

/// A confidence adjustment for a candidate answer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateUpdate {
    pub answer: String,
    pub confidence_delta: f64,
    /// Contents of key facts backing the adjustment
    #[serde(default)]
    pub supporting_facts: Vec<String>,
}

/// Changes the reasoning backend derived from a round's results
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StateDelta {
    pub facts: Vec<FactDraft>,
    pub uncertainties: Vec<UncertaintyDraft>,
    /// Questions of uncertainties that are now resolved
    pub resolved: Vec<String>,
    pub candidates: Vec<CandidateUpdate>,
}

impl StateDelta {
    pub fn is_empty(&self) -> bool {
        self.facts.is_empty()
            && self.uncertainties.is_empty()
            && self.resolved.is_empty()
            && self.candidates.is_empty()
    }
}

/// Phases of a research run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResearchPhase {
    Init,
    Deciding,
    Searching,
    Updating,
    Assessing,
    Synthesizing,
    Done,
}

impl std::fmt::Display for ResearchPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ResearchPhase::Init => write!(f, "init"),
            ResearchPhase::Deciding => write!(f, "deciding"),
            ResearchPhase::Searching => write!(f, "searching"),
            ResearchPhase::Updating => write!(f, "updating"),
            ResearchPhase::Assessing => write!(f, "assessing"),
            ResearchPhase::Synthesizing => write!(f, "synthesizing"),
            ResearchPhase::Done => write!(f, "done"),
        }
    }
}

/// Per-round bookkeeping carried into the report
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoundSummary {
    pub iteration: usize,
    pub queries_issued: usize,
    pub failed_searches: usize,
    pub new_facts: usize,
    pub resolved_uncertainties: usize,
    pub raised_uncertainties: usize,
    pub retired_candidates: usize,
    /// Confidence after assessment; `None` when the round ended before it
    pub confidence: Option<f64>,
    pub productive: bool,
}

impl RoundSummary {
    pub(crate) fn new(iteration: usize) -> Self {
        Self {
            iteration,
            queries_issued: 0,
            failed_searches: 0,
            new_facts: 0,
            resolved_uncertainties: 0,
            raised_uncertainties: 0,
            retired_candidates: 0,
            confidence: None,
            productive: false,
        }
    }
}
