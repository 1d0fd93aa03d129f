//! The knowledge-convergence loop

use crate::backend::{ReasoningBackend, SearchBackend};
use crate::cancel::RunGuard;
use crate::config::ResearchConfig;
use crate::observer::{NoopObserver, ProgressEvent, ProgressObserver};
use crate::planner::{Plan, ResearchPlanner};
use crate::report::{ResearchReport, Termination};
use crate::scoring::{ConfidenceScorer, ConfidenceSignals};
use crate::state::KnowledgeState;
use crate::strategy::{summarize_results, StrategyExecutor};
use crate::synthesizer::ResearchSynthesizer;
use crate::types::*;
use crate::{ResearchError, ResearchResult};
use delve_core::performance::measure_async;
use delve_core::{log_operation_start, log_operation_success, process_concurrently};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, info_span, warn, Instrument};
use uuid::Uuid;

/// Drives research runs against a reasoning and a search backend
///
/// The engine holds no per-run state; every run owns its own
/// [`KnowledgeState`], so one engine can serve concurrent runs.
pub struct ResearchEngine {
    reasoner: Arc<dyn ReasoningBackend>,
    search: Arc<dyn SearchBackend>,
    observer: Arc<dyn ProgressObserver>,
    /// Overrides the scoring policy from the run configuration
    scorer: Option<Arc<dyn ConfidenceScorer>>,
    planner: ResearchPlanner,
    synthesizer: ResearchSynthesizer,
}

impl ResearchEngine {
    pub fn new(reasoner: Arc<dyn ReasoningBackend>, search: Arc<dyn SearchBackend>) -> Self {
        Self {
            reasoner,
            search,
            observer: Arc::new(NoopObserver),
            scorer: None,
            planner: ResearchPlanner::new(),
            synthesizer: ResearchSynthesizer::new(),
        }
    }

    pub fn with_observer(mut self, observer: Arc<dyn ProgressObserver>) -> Self {
        self.observer = observer;
        self
    }

    /// Install an external confidence scorer in place of the configured policy
    pub fn with_scorer(mut self, scorer: Arc<dyn ConfidenceScorer>) -> Self {
        self.scorer = Some(scorer);
        self
    }

    /// Run a research loop to completion
    pub async fn run(&self, query: &str, config: &ResearchConfig) -> ResearchResult<ResearchReport> {
        self.run_with_cancellation(query, config, CancellationToken::new())
            .await
    }

    /// Run a research loop that stops at the next phase boundary once `token` is cancelled
    ///
    /// A cancelled run still returns `Ok` with a partial report. Only invalid
    /// configuration and internal invariant violations are errors.
    pub async fn run_with_cancellation(
        &self,
        query: &str,
        config: &ResearchConfig,
        token: CancellationToken,
    ) -> ResearchResult<ResearchReport> {
        config.validate()?;
        let query = query.trim();
        if query.is_empty() {
            return Err(ResearchError::configuration("query", "must not be empty"));
        }

        let run_id = Uuid::new_v4();
        let span = info_span!("research_run", %run_id, strategy = %config.strategy);
        measure_async("research_run", self.converge(query, config, token))
            .instrument(span)
            .await
    }

    /// Run the same query under several configurations concurrently
    ///
    /// Results are returned in the order of `configs`.
    pub async fn evaluate_configs(
        self: &Arc<Self>,
        query: &str,
        configs: Vec<ResearchConfig>,
        max_concurrent: usize,
    ) -> Vec<ResearchResult<ResearchReport>> {
        let engine = Arc::clone(self);
        let query = query.to_string();

        let results = process_concurrently(configs, max_concurrent, move |config| {
            let engine = Arc::clone(&engine);
            let query = query.clone();
            async move { Ok(engine.run(&query, &config).await) }
        })
        .await;

        results
            .into_iter()
            .map(|result| result.map_err(ResearchError::from).and_then(|run| run))
            .collect()
    }

    async fn converge(
        &self,
        query: &str,
        config: &ResearchConfig,
        token: CancellationToken,
    ) -> ResearchResult<ResearchReport> {
        let guard = RunGuard::new(token, config.run_timeout_ms);
        let scorer = self
            .scorer
            .clone()
            .unwrap_or_else(|| config.scoring.build());

        log_operation_start!(
            "research_run",
            query = %query,
            max_iterations = config.max_iterations,
            threshold = config.confidence_threshold,
            scorer = scorer.name(),
            reasoner = self.reasoner.name(),
            search = self.search.name()
        );

        let mut state = KnowledgeState::new(query);
        let mut rounds = Vec::new();
        self.notify(ResearchPhase::Init, &state, config, "Research started");

        let termination = loop {
            if guard.is_cancelled() {
                break Termination::Cancelled;
            }

            let iteration = state.begin_iteration();
            let mut round = RoundSummary::new(iteration);
            let stop = self
                .run_round(&mut state, &mut round, config, &guard, scorer.as_ref())
                .await;
            rounds.push(round);
            if let Some(termination) = stop? {
                break termination;
            }
        };

        info!(
            termination = %termination,
            iterations = state.iteration_count(),
            confidence = state.confidence(),
            "Research loop finished"
        );

        self.notify(ResearchPhase::Synthesizing, &state, config, "Synthesizing report");
        let prose = if termination == Termination::Cancelled {
            None
        } else {
            match guard.race(self.reasoner.synthesize(&state)).await {
                Some(Ok(prose)) => prose,
                Some(Err(error)) => {
                    warn!(error = %error, "Synthesis prose unavailable, using deterministic narrative only");
                    None
                }
                None => None,
            }
        };

        let report = self.synthesizer.synthesize(
            &state,
            config.confidence_threshold,
            termination,
            rounds,
            prose,
        );
        self.notify(ResearchPhase::Done, &state, config, "Research complete");
        log_operation_success!(
            "research_run",
            status = %report.status,
            confidence = report.confidence
        );
        Ok(report)
    }

    /// One decide, search, update, assess pass
    ///
    /// Returns the termination reason when the loop should stop after this round.
    async fn run_round(
        &self,
        state: &mut KnowledgeState,
        round: &mut RoundSummary,
        config: &ResearchConfig,
        guard: &RunGuard,
        scorer: &dyn ConfidenceScorer,
    ) -> ResearchResult<Option<Termination>> {
        let iteration = round.iteration;

        // Deciding
        self.notify(
            ResearchPhase::Deciding,
            state,
            config,
            format!("Planning round {}", iteration),
        );
        let request = DecisionRequest {
            max_queries: config.search_iterations_per_round,
            questions_per_search: config.questions_per_search,
            iteration,
        };
        let decision = match guard.race(self.reasoner.decide(state, &request)).await {
            None => return Ok(Some(Termination::Cancelled)),
            Some(Ok(decision)) => Some(decision),
            Some(Err(error)) => {
                warn!(iteration, error = %error, "Decision failed, falling back to planner");
                None
            }
        };

        let queries = match self.planner.plan(state, decision, config) {
            Plan::NoFurtherAction => {
                info!(iteration, "No productive query remains");
                return Ok(Some(Termination::NoFurtherAction));
            }
            Plan::Queries(queries) => queries,
        };

        // Searching
        if guard.is_cancelled() {
            return Ok(Some(Termination::Cancelled));
        }
        self.notify(
            ResearchPhase::Searching,
            state,
            config,
            format!("Running {} searches", queries.len()),
        );
        let executor = StrategyExecutor::new(&self.search, config);
        let Some(outcomes) = executor.execute(&queries, guard).await else {
            debug!(iteration, "Search round abandoned");
            return Ok(Some(Termination::Cancelled));
        };

        for outcome in &outcomes {
            let mut sources: Vec<String> = Vec::new();
            for result in &outcome.results {
                if !sources.contains(&result.source) {
                    sources.push(result.source.clone());
                }
            }
            round.resolved_uncertainties += state.record_search(SearchRecord {
                iteration,
                query: outcome.query.text.clone(),
                strategy: config.strategy,
                results_summary: summarize_results(outcome),
                result_count: outcome.results.len(),
                sources,
                failed: outcome.failed(),
            });
        }
        round.queries_issued = outcomes.len();
        round.failed_searches = outcomes.iter().filter(|o| o.failed()).count();

        // Updating
        if guard.is_cancelled() {
            return Ok(Some(Termination::Cancelled));
        }
        self.notify(
            ResearchPhase::Updating,
            state,
            config,
            format!("Interpreting {} search outcomes", outcomes.len()),
        );
        if round.failed_searches == outcomes.len() {
            let failed: Vec<String> = outcomes.iter().map(|o| o.query.text.clone()).collect();
            warn!(iteration, "Every search in the round failed");
            if state.raise_search_failure(iteration, &failed) {
                round.raised_uncertainties += 1;
            }
        } else {
            match guard.race(self.reasoner.update(state, &outcomes)).await {
                None => return Ok(Some(Termination::Cancelled)),
                Some(Ok(delta)) => {
                    let applied = state.apply_delta(
                        &delta,
                        config.unsupported_delta_weight,
                        config.prune_threshold,
                    );
                    round.new_facts = applied.new_facts;
                    round.resolved_uncertainties += applied.resolved;
                    round.raised_uncertainties = applied.raised;
                    round.retired_candidates = applied.retired;
                    round.productive = applied.is_productive() || round.resolved_uncertainties > 0;
                }
                Some(Err(error)) => {
                    warn!(iteration, error = %error, "Update failed, round is unproductive");
                    let question = format!(
                        "Round {}: results could not be interpreted for {}",
                        iteration,
                        quoted_queries(&outcomes)
                    );
                    if state.raise_uncertainty(&question, 0.5, UncertaintyOrigin::ReasoningFailure) {
                        round.raised_uncertainties += 1;
                    }
                }
            }
        }

        // Assessing
        if guard.is_cancelled() {
            return Ok(Some(Termination::Cancelled));
        }
        self.notify(
            ResearchPhase::Assessing,
            state,
            config,
            format!("Assessing confidence after round {}", iteration),
        );
        let assessment = match guard.race(self.reasoner.assess(state)).await {
            None => return Ok(Some(Termination::Cancelled)),
            Some(Ok(delta)) => delta,
            Some(Err(error)) => {
                warn!(iteration, error = %error, "Assessment failed, using a neutral delta");
                0.0
            }
        };

        let signals = ConfidenceSignals::from_state(state, assessment);
        let confidence = scorer.score(&signals);
        state.set_confidence(confidence)?;
        round.confidence = Some(confidence);

        info!(
            iteration,
            confidence,
            facts = state.key_facts().len(),
            uncertainties = state.uncertainties().len(),
            candidates = state.candidate_answers().len(),
            "Round complete"
        );

        if confidence >= config.confidence_threshold {
            return Ok(Some(Termination::ConfidenceReached));
        }
        if state.iteration_count() >= config.max_iterations {
            return Ok(Some(Termination::Exhausted));
        }
        Ok(None)
    }

    fn notify(
        &self,
        phase: ResearchPhase,
        state: &KnowledgeState,
        config: &ResearchConfig,
        message: impl Into<String>,
    ) {
        let event = ProgressEvent::new(phase, state.iteration_count(), config.max_iterations, message);
        let observer = &self.observer;
        if catch_unwind(AssertUnwindSafe(|| observer.notify(&event, state))).is_err() {
            warn!(phase = %phase, "Progress observer panicked, notification dropped");
        }
    }
}

fn quoted_queries(outcomes: &[QueryOutcome]) -> String {
    outcomes
        .iter()
        .map(|o| format!("\"{}\"", o.query.text))
        .collect::<Vec<_>>()
        .join(", ")
}
