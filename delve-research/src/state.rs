//! The evolving belief state of one research run

use crate::types::*;
use crate::{ResearchError, ResearchResult};
use serde::Serialize;
use tracing::debug;

/// Normalize text for deduplication: lowercase with collapsed whitespace
pub fn normalize_text(text: &str) -> String {
    text.split_whitespace()
        .map(|word| word.to_lowercase())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Searches of one query, failed ones included, after which it is not reissued
pub const MAX_QUERY_ATTEMPTS: usize = 2;

/// Knowledge accumulated during a single research run
///
/// Only the engine mutates the state; collaborators and observers see it
/// through shared references and the read-only accessors below.
#[derive(Debug, Clone, Serialize)]
pub struct KnowledgeState {
    query: String,
    key_facts: Vec<Fact>,
    uncertainties: Vec<Uncertainty>,
    candidate_answers: Vec<CandidateAnswer>,
    search_history: Vec<SearchRecord>,
    confidence: f64,
    iteration_count: usize,
    resolved_this_round: usize,
    /// Queries behind each open search-failure uncertainty
    #[serde(skip)]
    failed_rounds: Vec<(String, Vec<String>)>,
}

/// What applying a [`StateDelta`] changed
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeltaOutcome {
    pub new_facts: usize,
    pub resolved: usize,
    pub raised: usize,
    pub candidates_touched: usize,
    pub retired: usize,
}

impl DeltaOutcome {
    pub fn is_productive(&self) -> bool {
        self.new_facts > 0 || self.resolved > 0 || self.raised > 0 || self.candidates_touched > 0
    }
}

impl KnowledgeState {
    pub(crate) fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            key_facts: Vec::new(),
            uncertainties: Vec::new(),
            candidate_answers: Vec::new(),
            search_history: Vec::new(),
            confidence: 0.0,
            iteration_count: 0,
            resolved_this_round: 0,
            failed_rounds: Vec::new(),
        }
    }

    pub fn query(&self) -> &str {
        &self.query
    }

    pub fn key_facts(&self) -> &[Fact] {
        &self.key_facts
    }

    pub fn uncertainties(&self) -> &[Uncertainty] {
        &self.uncertainties
    }

    pub fn candidate_answers(&self) -> &[CandidateAnswer] {
        &self.candidate_answers
    }

    pub fn search_history(&self) -> &[SearchRecord] {
        &self.search_history
    }

    pub fn confidence(&self) -> f64 {
        self.confidence
    }

    pub fn iteration_count(&self) -> usize {
        self.iteration_count
    }

    /// Uncertainties resolved since the current round began
    pub fn resolved_this_round(&self) -> usize {
        self.resolved_this_round
    }

    /// Whether an equivalent query needs no further search
    ///
    /// True once the query succeeded, or once it has failed
    /// [`MAX_QUERY_ATTEMPTS`] times.
    pub fn has_searched(&self, query: &str) -> bool {
        let key = normalize_text(query);
        let mut failures = 0;
        for record in &self.search_history {
            if normalize_text(&record.query) == key {
                if !record.failed {
                    return true;
                }
                failures += 1;
            }
        }
        failures >= MAX_QUERY_ATTEMPTS
    }

    /// Queries of a search-failure uncertainty that may still be retried
    pub fn retryable_queries(&self, question: &str) -> Vec<&str> {
        let key = normalize_text(question);
        self.failed_rounds
            .iter()
            .filter(|(q, _)| normalize_text(q) == key)
            .flat_map(|(_, queries)| queries.iter())
            .filter(|query| !self.has_searched(query))
            .map(String::as_str)
            .collect()
    }

    pub fn has_fact(&self, content: &str) -> bool {
        let key = normalize_text(content);
        self.key_facts
            .iter()
            .any(|fact| normalize_text(&fact.content) == key)
    }

    pub fn find_uncertainty(&self, question: &str) -> Option<&Uncertainty> {
        let key = normalize_text(question);
        self.uncertainties
            .iter()
            .find(|u| normalize_text(&u.question) == key)
    }

    pub fn find_candidate(&self, answer: &str) -> Option<&CandidateAnswer> {
        let key = normalize_text(answer);
        self.candidate_answers
            .iter()
            .find(|c| normalize_text(&c.answer) == key)
    }

    /// The accepted answer under the tie-break rules
    ///
    /// Highest confidence wins; ties go to the candidate with more supporting
    /// facts, then to the earliest proposed one.
    pub fn leading_candidate(&self) -> Option<&CandidateAnswer> {
        let mut best: Option<&CandidateAnswer> = None;
        for candidate in &self.candidate_answers {
            best = match best {
                None => Some(candidate),
                Some(current) => {
                    let better = candidate.confidence > current.confidence
                        || (candidate.confidence == current.confidence
                            && candidate.support() > current.support());
                    if better {
                        Some(candidate)
                    } else {
                        Some(current)
                    }
                }
            };
        }
        best
    }

    /// Gap between the two highest candidate confidences
    ///
    /// With a single candidate the gap is its own confidence; with none it is 0.
    pub fn candidate_gap(&self) -> f64 {
        let mut scores: Vec<f64> = self
            .candidate_answers
            .iter()
            .map(|c| c.confidence)
            .collect();
        scores.sort_by(|a, b| b.total_cmp(a));
        match scores.as_slice() {
            [] => 0.0,
            [only] => *only,
            [first, second, ..] => first - second,
        }
    }

    /// Fraction of the round's uncertainties that were resolved
    pub fn resolved_fraction(&self) -> f64 {
        let total = self.resolved_this_round + self.uncertainties.len();
        if total == 0 {
            if self.key_facts.is_empty() {
                0.0
            } else {
                1.0
            }
        } else {
            self.resolved_this_round as f64 / total as f64
        }
    }

    pub(crate) fn begin_iteration(&mut self) -> usize {
        self.iteration_count += 1;
        self.resolved_this_round = 0;
        self.iteration_count
    }

    /// Append a search record; returns how many search-failure
    /// uncertainties a successful retry resolved
    pub(crate) fn record_search(&mut self, record: SearchRecord) -> usize {
        let mut resolved = 0;
        if !record.failed {
            let key = normalize_text(&record.query);
            let (recovered, still_open): (Vec<_>, Vec<_>) = std::mem::take(&mut self.failed_rounds)
                .into_iter()
                .partition(|(_, queries)| queries.iter().any(|q| normalize_text(q) == key));
            self.failed_rounds = still_open;
            for (question, _) in recovered {
                if self.resolve_uncertainty(&question) {
                    resolved += 1;
                }
            }
        }
        self.search_history.push(record);
        resolved
    }

    /// Raise the uncertainty for a round in which every search failed
    pub(crate) fn raise_search_failure(&mut self, iteration: usize, queries: &[String]) -> bool {
        let quoted = queries
            .iter()
            .map(|q| format!("\"{}\"", q))
            .collect::<Vec<_>>()
            .join(", ");
        let question = format!("Round {}: all searches failed for {}", iteration, quoted);
        let raised = self.raise_uncertainty(&question, 1.0, UncertaintyOrigin::SearchFailure);
        if raised {
            self.failed_rounds.push((question, queries.to_vec()));
        }
        raised
    }

    /// Append a fact unless an equivalent one is already known
    pub(crate) fn add_fact(&mut self, draft: &FactDraft) -> bool {
        let content = draft.content.trim();
        if content.is_empty() || self.has_fact(content) {
            return false;
        }

        let source = if draft.source.trim().is_empty() {
            "unknown".to_string()
        } else {
            draft.source.trim().to_string()
        };

        self.key_facts.push(Fact {
            content: content.to_string(),
            source,
            iteration: self.iteration_count,
        });

        // A fact and an uncertainty never share content.
        self.resolve_uncertainty(content);
        if let Some(question) = &draft.resolves {
            self.resolve_uncertainty(question);
        }
        true
    }

    /// Add an open question; returns false if it is known or already answered
    pub(crate) fn raise_uncertainty(
        &mut self,
        question: &str,
        weight: f64,
        origin: UncertaintyOrigin,
    ) -> bool {
        let question = question.trim();
        if question.is_empty() || self.has_fact(question) {
            return false;
        }

        let weight = if weight.is_finite() {
            weight.clamp(0.0, 1.0)
        } else {
            0.0
        };

        let key = normalize_text(question);
        if let Some(existing) = self
            .uncertainties
            .iter_mut()
            .find(|u| normalize_text(&u.question) == key)
        {
            existing.weight = existing.weight.max(weight);
            return false;
        }

        self.uncertainties.push(Uncertainty {
            question: question.to_string(),
            weight,
            raised_at: self.iteration_count,
            origin,
        });
        true
    }

    pub(crate) fn resolve_uncertainty(&mut self, question: &str) -> bool {
        let key = normalize_text(question);
        let before = self.uncertainties.len();
        self.uncertainties
            .retain(|u| normalize_text(&u.question) != key);
        let removed = before - self.uncertainties.len();
        self.resolved_this_round += removed;
        removed > 0
    }

    /// Apply a provenance-weighted confidence delta to a candidate, creating it if needed
    pub(crate) fn update_candidate(&mut self, update: &CandidateUpdate, unsupported_weight: f64) {
        let answer = update.answer.trim();
        if answer.is_empty() || !update.confidence_delta.is_finite() {
            return;
        }

        let support: Vec<String> = update
            .supporting_facts
            .iter()
            .filter(|content| self.has_fact(content))
            .map(|content| normalize_text(content))
            .collect();

        let delta = if support.is_empty() {
            update.confidence_delta * unsupported_weight
        } else {
            update.confidence_delta
        };

        let key = normalize_text(answer);
        let iteration = self.iteration_count;
        match self
            .candidate_answers
            .iter_mut()
            .find(|c| normalize_text(&c.answer) == key)
        {
            Some(candidate) => {
                candidate.confidence = (candidate.confidence + delta).clamp(0.0, 1.0);
                for fact in support {
                    if !candidate.supporting_facts.contains(&fact) {
                        candidate.supporting_facts.push(fact);
                    }
                }
            }
            None => {
                let mut supporting_facts = Vec::new();
                for fact in support {
                    if !supporting_facts.contains(&fact) {
                        supporting_facts.push(fact);
                    }
                }
                self.candidate_answers.push(CandidateAnswer {
                    answer: answer.to_string(),
                    confidence: delta.clamp(0.0, 1.0),
                    first_seen: iteration,
                    supporting_facts,
                });
            }
        }
    }

    /// Retire candidates whose confidence fell below `threshold`
    pub(crate) fn prune_candidates(&mut self, threshold: f64) -> Vec<String> {
        let mut retired = Vec::new();
        self.candidate_answers.retain(|candidate| {
            if candidate.confidence < threshold {
                retired.push(candidate.answer.clone());
                false
            } else {
                true
            }
        });
        retired
    }

    /// Fold a reasoning delta into the state in a fixed order:
    /// facts, resolutions, new uncertainties, candidate updates, pruning.
    pub(crate) fn apply_delta(
        &mut self,
        delta: &StateDelta,
        unsupported_weight: f64,
        prune_threshold: f64,
    ) -> DeltaOutcome {
        let resolved_before = self.resolved_this_round;
        let mut outcome = DeltaOutcome::default();

        for draft in &delta.facts {
            if self.add_fact(draft) {
                outcome.new_facts += 1;
            }
        }

        for question in &delta.resolved {
            self.resolve_uncertainty(question);
        }

        for draft in &delta.uncertainties {
            if self.raise_uncertainty(&draft.question, draft.weight, UncertaintyOrigin::Evidence) {
                outcome.raised += 1;
            }
        }

        for update in &delta.candidates {
            self.update_candidate(update, unsupported_weight);
            outcome.candidates_touched += 1;
        }

        let retired = self.prune_candidates(prune_threshold);
        if !retired.is_empty() {
            debug!(retired = ?retired, "Retired low-confidence candidates");
        }
        outcome.retired = retired.len();
        outcome.resolved = self.resolved_this_round - resolved_before;
        outcome
    }

    /// Store a newly assessed confidence, rejecting values outside [0, 1]
    pub(crate) fn set_confidence(&mut self, confidence: f64) -> ResearchResult<()> {
        if !confidence.is_finite() || !(0.0..=1.0).contains(&confidence) {
            return Err(ResearchError::invariant(format!(
                "confidence {} outside [0, 1] after iteration {}",
                confidence, self.iteration_count
            )));
        }
        self.confidence = confidence;
        Ok(())
    }
}
