//! End-to-end behaviour of the convergence loop with scripted collaborators

mod common;

use common::*;
use delve_research::*;
use std::sync::atomic::Ordering;
use std::sync::Arc;

fn assert_close(actual: f64, expected: f64) {
    assert!(
        (actual - expected).abs() < 1e-9,
        "expected {expected}, got {actual}"
    );
}

#[tokio::test]
async fn test_converges_when_confidence_crosses_threshold() {
    let engine = engine(
        ScriptedReasoner::new().with_confidences(&[0.5, 0.75, 0.95]),
        ScriptedSearch::new(),
    );

    let report = engine.run("X", &scripted_config(3, 0.9)).await.unwrap();

    assert_eq!(report.iteration_count, 3);
    assert_close(report.confidence, 0.95);
    assert_eq!(report.status, ReportStatus::Conclusive);
    assert_eq!(report.termination, Termination::ConfidenceReached);
    assert!(report.is_conclusive());

    let per_round: Vec<f64> = report.rounds.iter().filter_map(|r| r.confidence).collect();
    assert_eq!(per_round.len(), 3);
    assert_close(per_round[0], 0.5);
    assert_close(per_round[1], 0.75);

    let answer = report.accepted_answer.as_ref().unwrap();
    assert_eq!(answer.answer, "answer A");
    assert!(answer.accepted);
}

#[tokio::test]
async fn test_exhaustion_yields_inconclusive_report() {
    let engine = engine(
        ScriptedReasoner::new().with_confidences(&[0.3, 0.6, 0.55]),
        ScriptedSearch::new(),
    );

    let report = engine.run("X", &scripted_config(3, 0.9)).await.unwrap();

    assert_eq!(report.iteration_count, 3);
    assert_eq!(report.status, ReportStatus::Inconclusive);
    assert_eq!(report.termination, Termination::Exhausted);
    assert!(report.confidence <= 0.6);
    assert!(!report.accepted_answer.unwrap().accepted);
    assert!(report.narrative.contains("inconclusive"));
}

#[tokio::test]
async fn test_no_further_action_exits_early() {
    let reasoner = Arc::new(
        ScriptedReasoner::new()
            .with_confidences(&[0.4, 0.5, 0.6])
            .with_decision(2, Decision::NoFurtherAction),
    );
    let engine = ResearchEngine::new(reasoner.clone(), Arc::new(ScriptedSearch::new()));

    let report = engine.run("X", &scripted_config(5, 0.9)).await.unwrap();

    assert_eq!(report.iteration_count, 2);
    assert_eq!(report.termination, Termination::NoFurtherAction);
    assert_eq!(report.status, ReportStatus::Inconclusive);
    assert!(report.narrative.starts_with("# Research Report: X"));
    assert_eq!(reasoner.decide_calls.load(Ordering::SeqCst), 2);
    assert_eq!(reasoner.assess_calls.load(Ordering::SeqCst), 1);
    assert_eq!(report.rounds[1].confidence, None);
}

#[tokio::test]
async fn test_confidence_stays_in_bounds_under_default_scoring() {
    for assessment in [-5.0, 0.0, 0.3, 5.0] {
        let engine = engine(
            ScriptedReasoner::new().with_assessment(assessment),
            ScriptedSearch::new(),
        );
        let config = ResearchConfig {
            scoring: ScoringPolicy::default(),
            ..scripted_config(4, 1.0)
        };

        let report = engine.run("bounds", &config).await.unwrap();
        for round in &report.rounds {
            let confidence = round.confidence.unwrap();
            assert!((0.0..=1.0).contains(&confidence), "{confidence}");
        }
        for candidate in &report.candidate_answers {
            assert!((0.0..=1.0).contains(&candidate.confidence));
        }
    }
}

#[tokio::test]
async fn test_iteration_cap_is_never_exceeded() {
    for max_iterations in 1..=4 {
        let engine = engine(ScriptedReasoner::new(), ScriptedSearch::new());
        let report = engine
            .run("cap", &scripted_config(max_iterations, 1.0))
            .await
            .unwrap();

        assert_eq!(report.iteration_count, max_iterations);
        assert_eq!(report.rounds.len(), max_iterations);
        assert_eq!(report.termination, Termination::Exhausted);
    }
}

#[tokio::test]
async fn test_search_history_matches_queries_per_round() {
    let engine = engine(ScriptedReasoner::new(), ScriptedSearch::new());
    let config = ResearchConfig {
        search_iterations_per_round: 3,
        ..scripted_config(3, 1.0)
    };

    let report = engine.run("history", &config).await.unwrap();

    assert_eq!(report.search_history.len(), report.iteration_count * 3);
    let issued: usize = report.rounds.iter().map(|r| r.queries_issued).sum();
    assert_eq!(issued, report.search_history.len());
    assert_eq!(report.search_history[0].query, round_query("history", 1, 0));
    assert_eq!(report.search_history[0].iteration, 1);
}

#[tokio::test]
async fn test_identical_runs_produce_identical_reports() {
    let run = || async {
        let search = ScriptedSearch::new()
            .with_delay(&round_query("same", 1, 0), 30)
            .with_delay(&round_query("same", 2, 1), 20);
        let engine = engine(
            ScriptedReasoner::new().with_confidences(&[0.2, 0.4, 0.6]),
            search,
        );
        let config = ResearchConfig {
            strategy: SearchStrategy::Parallel,
            search_iterations_per_round: 3,
            ..scripted_config(3, 0.9)
        };
        engine.run("same", &config).await.unwrap().to_json().unwrap()
    };

    let first = run().await;
    let second = run().await;
    assert_eq!(first, second);
}

#[tokio::test]
async fn test_repeated_proposals_are_skipped() {
    let repeated = Decision::Search(vec![SearchQuery::topic("only query")]);
    let reasoner = ScriptedReasoner::new()
        .with_decision(1, repeated.clone())
        .with_decision(2, repeated);
    let engine = engine(reasoner, ScriptedSearch::new());

    let report = engine.run("dupes", &scripted_config(5, 1.0)).await.unwrap();

    assert_eq!(report.search_history.len(), 1);
    assert_eq!(report.iteration_count, 2);
    assert_eq!(report.termination, Termination::NoFurtherAction);
}

#[tokio::test]
async fn test_facts_resolve_uncertainties_and_feed_candidates() {
    let round_one = StateDelta {
        uncertainties: vec![UncertaintyDraft {
            question: "Who maintains X?".to_string(),
            weight: 0.8,
        }],
        ..StateDelta::default()
    };
    let round_two = StateDelta {
        facts: vec![FactDraft {
            content: "The X team maintains X".to_string(),
            source: "https://x.test/team".to_string(),
            resolves: Some("who maintains x?".to_string()),
        }],
        candidates: vec![CandidateUpdate {
            answer: "The X team".to_string(),
            confidence_delta: 0.6,
            supporting_facts: vec!["The X team maintains X".to_string()],
        }],
        ..StateDelta::default()
    };
    let reasoner = ScriptedReasoner::new()
        .with_delta(1, round_one)
        .with_delta(2, round_two)
        .with_decision(1, Decision::Search(vec![SearchQuery::topic("X maintainers")]))
        .with_decision(2, Decision::Search(Vec::new()));
    let engine = engine(reasoner, ScriptedSearch::new());

    let report = engine.run("Who maintains X?", &scripted_config(2, 1.0)).await.unwrap();

    // Round two falls back to the open uncertainty.
    assert_eq!(report.search_history[1].query, "Who maintains X?");
    assert!(report.uncertainties.is_empty());
    assert_eq!(report.rounds[1].resolved_uncertainties, 1);
    let candidate = &report.candidate_answers[0];
    assert_close(candidate.confidence, 0.6);
    assert_eq!(candidate.support(), 1);
    assert!(report.narrative.contains("The X team maintains X [1]"));
}

#[tokio::test]
async fn test_backend_prose_lands_in_summary() {
    let engine = engine(
        ScriptedReasoner::new()
            .with_confidences(&[0.95])
            .with_prose("X is well understood."),
        ScriptedSearch::new(),
    );

    let report = engine.run("X", &scripted_config(3, 0.9)).await.unwrap();
    assert!(report.narrative.contains("## Summary\n\nX is well understood."));
}

#[tokio::test]
async fn test_quality_score_tracks_confidence() {
    let engine = engine(
        ScriptedReasoner::new().with_confidences(&[0.25, 0.5]),
        ScriptedSearch::new(),
    );
    let report = engine.run("X", &scripted_config(2, 0.9)).await.unwrap();
    assert_close(report.quality_score(), 0.5);
}
