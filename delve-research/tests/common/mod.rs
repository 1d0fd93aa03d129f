//! Scripted collaborators shared by the integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use delve_core::RetryConfig;
use delve_research::*;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Test configuration: no retries, backend-driven confidence
pub fn scripted_config(max_iterations: usize, threshold: f64) -> ResearchConfig {
    ResearchConfig {
        max_iterations,
        confidence_threshold: threshold,
        search_iterations_per_round: 2,
        scoring: ScoringPolicy::Cumulative,
        search_retry: RetryConfig::no_retry(),
        ..ResearchConfig::default()
    }
}

/// Query text proposed by default for a round
pub fn round_query(query: &str, iteration: usize, index: usize) -> String {
    format!("{} r{} q{}", query, iteration, index)
}

/// Reasoning backend replaying fixed responses keyed by iteration
///
/// Without a script entry it proposes `max_queries` fresh queries, turns
/// every snippet into a fact and nudges candidate "answer A".
#[derive(Default)]
pub struct ScriptedReasoner {
    decisions: HashMap<usize, Decision>,
    deltas: HashMap<usize, StateDelta>,
    /// Target confidence per iteration; the assessment returns the difference
    confidences: Vec<f64>,
    fixed_assessment: Option<f64>,
    failing_decide: HashSet<usize>,
    failing_update: HashSet<usize>,
    failing_assess: HashSet<usize>,
    prose: Option<String>,
    pub decide_calls: AtomicUsize,
    pub update_calls: AtomicUsize,
    pub assess_calls: AtomicUsize,
}

impl ScriptedReasoner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_confidences(mut self, confidences: &[f64]) -> Self {
        self.confidences = confidences.to_vec();
        self
    }

    pub fn with_assessment(mut self, delta: f64) -> Self {
        self.fixed_assessment = Some(delta);
        self
    }

    pub fn with_decision(mut self, iteration: usize, decision: Decision) -> Self {
        self.decisions.insert(iteration, decision);
        self
    }

    pub fn with_delta(mut self, iteration: usize, delta: StateDelta) -> Self {
        self.deltas.insert(iteration, delta);
        self
    }

    pub fn failing_decide(mut self, iteration: usize) -> Self {
        self.failing_decide.insert(iteration);
        self
    }

    pub fn failing_update(mut self, iteration: usize) -> Self {
        self.failing_update.insert(iteration);
        self
    }

    pub fn failing_assess(mut self, iteration: usize) -> Self {
        self.failing_assess.insert(iteration);
        self
    }

    pub fn with_prose(mut self, prose: &str) -> Self {
        self.prose = Some(prose.to_string());
        self
    }

    fn default_delta(outcomes: &[QueryOutcome]) -> StateDelta {
        let mut delta = StateDelta::default();
        for outcome in outcomes {
            for result in &outcome.results {
                delta.facts.push(FactDraft {
                    content: result.snippet.clone(),
                    source: result.source.clone(),
                    resolves: None,
                });
            }
        }
        let support = delta.facts.first().map(|f| f.content.clone());
        delta.candidates.push(CandidateUpdate {
            answer: "answer A".to_string(),
            confidence_delta: 0.1,
            supporting_facts: support.into_iter().collect(),
        });
        delta
    }
}

#[async_trait]
impl ReasoningBackend for ScriptedReasoner {
    async fn decide(
        &self,
        state: &KnowledgeState,
        request: &DecisionRequest,
    ) -> ResearchResult<Decision> {
        self.decide_calls.fetch_add(1, Ordering::SeqCst);
        if self.failing_decide.contains(&request.iteration) {
            return Err(ResearchError::collaborator("scripted", "decide unavailable"));
        }
        if let Some(decision) = self.decisions.get(&request.iteration) {
            return Ok(decision.clone());
        }
        Ok(Decision::Search(
            (0..request.max_queries)
                .map(|i| SearchQuery::topic(round_query(state.query(), request.iteration, i)))
                .collect(),
        ))
    }

    async fn update(
        &self,
        state: &KnowledgeState,
        outcomes: &[QueryOutcome],
    ) -> ResearchResult<StateDelta> {
        self.update_calls.fetch_add(1, Ordering::SeqCst);
        let iteration = state.iteration_count();
        if self.failing_update.contains(&iteration) {
            return Err(ResearchError::collaborator("scripted", "update unavailable"));
        }
        Ok(self
            .deltas
            .get(&iteration)
            .cloned()
            .unwrap_or_else(|| Self::default_delta(outcomes)))
    }

    async fn assess(&self, state: &KnowledgeState) -> ResearchResult<f64> {
        self.assess_calls.fetch_add(1, Ordering::SeqCst);
        let iteration = state.iteration_count();
        if self.failing_assess.contains(&iteration) {
            return Err(ResearchError::collaborator("scripted", "assess unavailable"));
        }
        if let Some(delta) = self.fixed_assessment {
            return Ok(delta);
        }
        Ok(self
            .confidences
            .get(iteration - 1)
            .map_or(0.0, |target| target - state.confidence()))
    }

    async fn synthesize(&self, _state: &KnowledgeState) -> ResearchResult<Option<String>> {
        Ok(self.prose.clone())
    }

    fn name(&self) -> &str {
        "scripted"
    }
}

/// Search backend returning fixed results keyed by query text
#[derive(Default)]
pub struct ScriptedSearch {
    results: HashMap<String, Vec<SearchResult>>,
    failing: Vec<String>,
    delays: HashMap<String, u64>,
    default_delay_ms: u64,
    /// Queries that fail on their first attempt only
    flaky: HashSet<String>,
    attempts: Mutex<HashMap<String, usize>>,
    in_flight: AtomicUsize,
    pub max_in_flight: AtomicUsize,
    pub calls: Mutex<Vec<String>>,
}

impl ScriptedSearch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_results(mut self, query: &str, results: Vec<SearchResult>) -> Self {
        self.results.insert(query.to_string(), results);
        self
    }

    /// Fail every query containing `fragment`
    pub fn failing_containing(mut self, fragment: &str) -> Self {
        self.failing.push(fragment.to_string());
        self
    }

    pub fn with_delay(mut self, query: &str, delay_ms: u64) -> Self {
        self.delays.insert(query.to_string(), delay_ms);
        self
    }

    pub fn with_default_delay(mut self, delay_ms: u64) -> Self {
        self.default_delay_ms = delay_ms;
        self
    }

    pub fn flaky(mut self, query: &str) -> Self {
        self.flaky.insert(query.to_string());
        self
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

#[async_trait]
impl SearchBackend for ScriptedSearch {
    async fn search(
        &self,
        query: &SearchQuery,
        _strategy: SearchStrategy,
    ) -> ResearchResult<Vec<SearchResult>> {
        self.calls.lock().unwrap().push(query.text.clone());
        let attempt = {
            let mut attempts = self.attempts.lock().unwrap();
            let count = attempts.entry(query.text.clone()).or_insert(0);
            *count += 1;
            *count
        };

        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        let delay = self
            .delays
            .get(&query.text)
            .copied()
            .unwrap_or(self.default_delay_ms);
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        if self.failing.iter().any(|f| query.text.contains(f.as_str())) {
            return Err(ResearchError::collaborator("scripted-search", "backend down"));
        }
        if self.flaky.contains(&query.text) && attempt == 1 {
            return Err(ResearchError::collaborator("scripted-search", "transient failure"));
        }

        Ok(self.results.get(&query.text).cloned().unwrap_or_else(|| {
            vec![SearchResult::new(
                format!("https://source.test/{}", query.text.replace(' ', "-")),
                format!("evidence for {}", query.text),
            )]
        }))
    }

    fn name(&self) -> &str {
        "scripted-search"
    }
}

pub fn engine(reasoner: ScriptedReasoner, search: ScriptedSearch) -> ResearchEngine {
    ResearchEngine::new(Arc::new(reasoner), Arc::new(search))
}
