//! Report assembly from the final knowledge state

use crate::report::{AcceptedAnswer, ReportStatus, ResearchReport, Termination};
use crate::state::KnowledgeState;
use crate::types::RoundSummary;
use std::fmt::Write;
use tracing::info;

/// Compiles the final knowledge state into a [`ResearchReport`]
///
/// Output depends only on its inputs, so identical runs produce identical
/// reports.
#[derive(Debug, Clone, Default)]
pub struct ResearchSynthesizer;

impl ResearchSynthesizer {
    pub fn new() -> Self {
        Self
    }

    pub fn status(termination: Termination, confidence: f64, threshold: f64) -> ReportStatus {
        if termination == Termination::Cancelled {
            ReportStatus::Cancelled
        } else if confidence >= threshold {
            ReportStatus::Conclusive
        } else {
            ReportStatus::Inconclusive
        }
    }

    /// Build the report; `prose` is optional summary text from the reasoning backend
    pub fn synthesize(
        &self,
        state: &KnowledgeState,
        threshold: f64,
        termination: Termination,
        rounds: Vec<RoundSummary>,
        prose: Option<String>,
    ) -> ResearchReport {
        let status = Self::status(termination, state.confidence(), threshold);
        info!(
            status = %status,
            termination = %termination,
            facts = state.key_facts().len(),
            "Synthesizing research report"
        );

        let accepted_answer = state.leading_candidate().map(|candidate| AcceptedAnswer {
            answer: candidate.answer.clone(),
            confidence: candidate.confidence,
            supporting_facts: candidate.supporting_facts.clone(),
            accepted: status == ReportStatus::Conclusive,
        });

        let insights = self.insights(state, &rounds);
        let follow_up_questions = self.follow_up_questions(state);
        let prose = prose
            .map(|text| text.trim().to_string())
            .filter(|text| !text.is_empty());

        let narrative = self.narrative(
            state,
            status,
            termination,
            threshold,
            accepted_answer.as_ref(),
            prose.as_deref(),
            &insights,
            &follow_up_questions,
        );

        ResearchReport {
            query: state.query().to_string(),
            status,
            termination,
            iteration_count: state.iteration_count(),
            confidence: state.confidence(),
            threshold,
            accepted_answer,
            candidate_answers: state.candidate_answers().to_vec(),
            key_facts: state.key_facts().to_vec(),
            uncertainties: state.uncertainties().to_vec(),
            search_history: state.search_history().to_vec(),
            rounds,
            narrative,
            insights,
            follow_up_questions,
        }
    }

    fn insights(&self, state: &KnowledgeState, rounds: &[RoundSummary]) -> Vec<String> {
        let mut candidates: Vec<_> = state.candidate_answers().iter().collect();
        candidates.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));

        let mut insights: Vec<String> = candidates
            .into_iter()
            .map(|c| {
                format!(
                    "{}: confidence {:.2}, {} supporting fact{}",
                    c.answer,
                    c.confidence,
                    c.support(),
                    if c.support() == 1 { "" } else { "s" }
                )
            })
            .collect();

        let failed: usize = rounds.iter().map(|r| r.failed_searches).sum();
        if failed > 0 {
            insights.push(format!(
                "{} of {} searches failed",
                failed,
                state.search_history().len()
            ));
        }

        let unproductive = rounds.iter().filter(|r| !r.productive).count();
        if unproductive > 0 {
            insights.push(format!(
                "{} round{} produced no new knowledge",
                unproductive,
                if unproductive == 1 { "" } else { "s" }
            ));
        }
        insights
    }

    fn follow_up_questions(&self, state: &KnowledgeState) -> Vec<String> {
        let mut open: Vec<_> = state.uncertainties().iter().collect();
        open.sort_by(|a, b| b.weight.total_cmp(&a.weight));
        open.into_iter().map(|u| u.question.clone()).collect()
    }

    #[allow(clippy::too_many_arguments)]
    fn narrative(
        &self,
        state: &KnowledgeState,
        status: ReportStatus,
        termination: Termination,
        threshold: f64,
        accepted: Option<&AcceptedAnswer>,
        prose: Option<&str>,
        insights: &[String],
        follow_ups: &[String],
    ) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "# Research Report: {}", state.query());
        let _ = writeln!(out);
        let _ = writeln!(
            out,
            "**Status:** {} ({}). Confidence {:.2} against a threshold of {:.2} after {} iteration{}.",
            status,
            termination,
            state.confidence(),
            threshold,
            state.iteration_count(),
            if state.iteration_count() == 1 { "" } else { "s" }
        );
        let _ = writeln!(out);

        let _ = writeln!(out, "## Answer");
        let _ = writeln!(out);
        match accepted {
            Some(answer) if answer.accepted => {
                let _ = writeln!(out, "{} (confidence {:.2})", answer.answer, answer.confidence);
            }
            Some(answer) => {
                let _ = writeln!(
                    out,
                    "No answer was accepted. Leading candidate: {} (confidence {:.2})",
                    answer.answer, answer.confidence
                );
            }
            None => {
                let _ = writeln!(out, "No candidate answer emerged.");
            }
        }
        let _ = writeln!(out);

        if let Some(prose) = prose {
            let _ = writeln!(out, "## Summary");
            let _ = writeln!(out);
            let _ = writeln!(out, "{}", prose);
            let _ = writeln!(out);
        }

        // Citation numbers follow the first appearance of each source.
        let mut sources: Vec<&str> = Vec::new();
        if !state.key_facts().is_empty() {
            let _ = writeln!(out, "## Key Facts");
            let _ = writeln!(out);
            for (i, fact) in state.key_facts().iter().enumerate() {
                let citation = match sources.iter().position(|s| *s == fact.source) {
                    Some(pos) => pos + 1,
                    None => {
                        sources.push(&fact.source);
                        sources.len()
                    }
                };
                let _ = writeln!(out, "{}. {} [{}]", i + 1, fact.content, citation);
            }
            let _ = writeln!(out);
        }

        if !insights.is_empty() {
            let _ = writeln!(out, "## Insights");
            let _ = writeln!(out);
            for insight in insights {
                let _ = writeln!(out, "- {}", insight);
            }
            let _ = writeln!(out);
        }

        if !follow_ups.is_empty() {
            let _ = writeln!(out, "## Follow-up Questions");
            let _ = writeln!(out);
            for question in follow_ups {
                let _ = writeln!(out, "- {}", question);
            }
            let _ = writeln!(out);
        }

        if !sources.is_empty() {
            let _ = writeln!(out, "## Sources");
            let _ = writeln!(out);
            for (i, source) in sources.iter().enumerate() {
                let _ = writeln!(out, "[{}] {}", i + 1, source);
            }
            let _ = writeln!(out);
        }

        if !state.search_history().is_empty() {
            let _ = writeln!(out, "## Search History");
            let _ = writeln!(out);
            for record in state.search_history() {
                let _ = writeln!(
                    out,
                    "- Round {}: \"{}\" ({}): {}",
                    record.iteration, record.query, record.strategy, record.results_summary
                );
            }
        }

        out.trim_end().to_string() + "\n"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{CandidateUpdate, FactDraft, UncertaintyOrigin};

    fn populated_state() -> KnowledgeState {
        let mut state = KnowledgeState::new("Who designed X?");
        state.begin_iteration();
        for (content, source) in [("A wrote the first draft", "s1"), ("A led the team", "s2"), ("B reviewed it", "s1")] {
            state.add_fact(&FactDraft {
                content: content.to_string(),
                source: source.to_string(),
                resolves: None,
            });
        }
        state.raise_uncertainty("Did B contribute code?", 0.4, UncertaintyOrigin::Evidence);
        state.update_candidate(
            &CandidateUpdate {
                answer: "A".to_string(),
                confidence_delta: 0.8,
                supporting_facts: vec!["A wrote the first draft".to_string()],
            },
            0.5,
        );
        state
    }

    #[test]
    fn test_status_rules() {
        assert_eq!(
            ResearchSynthesizer::status(Termination::Cancelled, 1.0, 0.5),
            ReportStatus::Cancelled
        );
        assert_eq!(
            ResearchSynthesizer::status(Termination::Exhausted, 0.9, 0.9),
            ReportStatus::Conclusive
        );
        assert_eq!(
            ResearchSynthesizer::status(Termination::NoFurtherAction, 0.4, 0.9),
            ReportStatus::Inconclusive
        );
    }

    #[test]
    fn test_narrative_sections_and_citations() {
        let mut state = populated_state();
        state.set_confidence(0.8).unwrap();
        let report = ResearchSynthesizer::new().synthesize(
            &state,
            0.7,
            Termination::ConfidenceReached,
            Vec::new(),
            Some("  A designed X.  ".to_string()),
        );

        assert_eq!(report.status, ReportStatus::Conclusive);
        assert!(report.accepted_answer.as_ref().unwrap().accepted);
        assert!(report.narrative.starts_with("# Research Report: Who designed X?"));
        assert!(report.narrative.contains("## Summary\n\nA designed X.\n"));
        assert!(report.narrative.contains("1. A wrote the first draft [1]"));
        assert!(report.narrative.contains("2. A led the team [2]"));
        assert!(report.narrative.contains("3. B reviewed it [1]"));
        assert!(report.narrative.contains("[2] s2"));
        assert_eq!(report.follow_up_questions, vec!["Did B contribute code?"]);
        assert_eq!(report.insights[0], "A: confidence 0.80, 1 supporting fact");
    }

    #[test]
    fn test_inconclusive_report_keeps_leading_candidate() {
        let state = populated_state();
        let report = ResearchSynthesizer::new().synthesize(
            &state,
            0.9,
            Termination::Exhausted,
            Vec::new(),
            None,
        );
        assert_eq!(report.status, ReportStatus::Inconclusive);
        let answer = report.accepted_answer.unwrap();
        assert_eq!(answer.answer, "A");
        assert!(!answer.accepted);
        assert!(report.narrative.contains("No answer was accepted. Leading candidate: A"));
        assert!(!report.narrative.contains("## Summary"));
    }
}
