//! Prompt construction and response parsing for LLM-backed reasoning
//!
//! Prompts ask for a single JSON object; parsers tolerate surrounding prose
//! and code fences by extracting the outermost object.

use crate::state::KnowledgeState;
use crate::types::*;
use crate::{ResearchError, ResearchResult};
use serde::Deserialize;
use std::fmt::Write;

fn describe_state(state: &KnowledgeState) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Research question: \"{}\"", state.query());
    let _ = writeln!(out, "Current confidence: {:.2}", state.confidence());

    let _ = writeln!(out, "\nKnown facts:");
    if state.key_facts().is_empty() {
        let _ = writeln!(out, "(none)");
    }
    for fact in state.key_facts() {
        let _ = writeln!(out, "- {} (source: {})", fact.content, fact.source);
    }

    let _ = writeln!(out, "\nOpen questions:");
    if state.uncertainties().is_empty() {
        let _ = writeln!(out, "(none)");
    }
    for uncertainty in state.uncertainties() {
        let _ = writeln!(out, "- {} (weight {:.2})", uncertainty.question, uncertainty.weight);
    }

    let _ = writeln!(out, "\nCandidate answers:");
    if state.candidate_answers().is_empty() {
        let _ = writeln!(out, "(none)");
    }
    for candidate in state.candidate_answers() {
        let _ = writeln!(
            out,
            "- {} (confidence {:.2}, {} supporting facts)",
            candidate.answer,
            candidate.confidence,
            candidate.support()
        );
    }

    let _ = writeln!(out, "\nQueries already issued:");
    if state.search_history().is_empty() {
        let _ = writeln!(out, "(none)");
    }
    for record in state.search_history() {
        let _ = writeln!(out, "- {}", record.query);
    }
    out
}

pub fn decision_prompt(state: &KnowledgeState, request: &DecisionRequest) -> String {
    format!(
        r#"You are planning the next step of an iterative research process.

{}
Propose at most {} new search queries for round {}. Consider up to {} sub-questions per query.
Prefer queries that resolve the heaviest open question. Never repeat an issued query.
If no productive query remains, set "no_further_action" to true.

Respond with a single JSON object:
{{
  "no_further_action": false,
  "queries": [
    {{"text": "search terms", "uncertainty": "open question it targets or null", "candidate": "candidate answer it tests or null"}}
  ]
}}"#,
        describe_state(state),
        request.max_queries,
        request.iteration,
        request.questions_per_search
    )
}

pub fn update_prompt(state: &KnowledgeState, outcomes: &[QueryOutcome]) -> String {
    let mut results = String::new();
    for outcome in outcomes {
        let _ = writeln!(results, "Query {}: \"{}\"", outcome.index + 1, outcome.query.text);
        if let Some(error) = &outcome.error {
            let _ = writeln!(results, "  (search failed: {})", error);
        }
        for result in &outcome.results {
            let _ = writeln!(results, "  - [{}] {}", result.source, result.snippet);
        }
    }

    format!(
        r#"You are updating the knowledge state of an iterative research process.

{}
New search results:
{}
Extract new facts with their sources, note new open questions, mark answered questions as resolved and adjust candidate answers.
Confidence deltas are in [-1, 1]; cite the exact fact text in "supporting_facts".

Respond with a single JSON object:
{{
  "facts": [{{"content": "...", "source": "...", "resolves": null}}],
  "uncertainties": [{{"question": "...", "weight": 0.5}}],
  "resolved": ["..."],
  "candidates": [{{"answer": "...", "confidence_delta": 0.2, "supporting_facts": ["..."]}}]
}}"#,
        describe_state(state),
        results
    )
}

pub fn assessment_prompt(state: &KnowledgeState) -> String {
    format!(
        r#"You are assessing an iterative research process.

{}
How much should overall confidence in the leading answer change given the evidence? Use a value in [-1, 1].

Respond with a single JSON object: {{"confidence_delta": 0.0}}"#,
        describe_state(state)
    )
}

pub fn synthesis_prompt(state: &KnowledgeState) -> String {
    format!(
        r#"You are writing the summary of a finished research process.

{}
Write two or three paragraphs answering the research question from the known facts only. Plain prose, no headings."#,
        describe_state(state)
    )
}

/// The outermost JSON object in `text`, if any
pub fn extract_json(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    (end > start).then(|| &text[start..=end])
}

#[derive(Debug, Deserialize)]
struct DecisionPayload {
    #[serde(default)]
    no_further_action: bool,
    #[serde(default)]
    queries: Vec<QueryPayload>,
}

#[derive(Debug, Deserialize)]
struct QueryPayload {
    text: String,
    #[serde(default)]
    uncertainty: Option<String>,
    #[serde(default)]
    candidate: Option<String>,
}

impl From<QueryPayload> for SearchQuery {
    fn from(payload: QueryPayload) -> Self {
        match (payload.uncertainty, payload.candidate) {
            (Some(question), _) if !question.trim().is_empty() => {
                SearchQuery::for_uncertainty(payload.text, question)
            }
            (_, Some(answer)) if !answer.trim().is_empty() => {
                SearchQuery::for_candidate(payload.text, answer)
            }
            _ => SearchQuery::topic(payload.text),
        }
    }
}

#[derive(Debug, Deserialize)]
struct AssessmentPayload {
    confidence_delta: f64,
}

fn json_object<'a>(text: &'a str, what: &str) -> ResearchResult<&'a str> {
    extract_json(text).ok_or_else(|| {
        ResearchError::collaborator("llm", format!("no JSON object in {} response", what))
    })
}

pub fn parse_decision(text: &str) -> ResearchResult<Decision> {
    let payload: DecisionPayload = serde_json::from_str(json_object(text, "decision")?)?;
    if payload.no_further_action {
        return Ok(Decision::NoFurtherAction);
    }
    Ok(Decision::Search(
        payload.queries.into_iter().map(SearchQuery::from).collect(),
    ))
}

pub fn parse_delta(text: &str) -> ResearchResult<StateDelta> {
    Ok(serde_json::from_str(json_object(text, "update")?)?)
}

/// Parse an assessment, accepting either the JSON object or a bare number
pub fn parse_assessment(text: &str) -> ResearchResult<f64> {
    let delta = match extract_json(text) {
        Some(json) => serde_json::from_str::<AssessmentPayload>(json)?.confidence_delta,
        None => text.trim().parse::<f64>().map_err(|e| {
            ResearchError::collaborator("llm", format!("unreadable assessment: {}", e))
        })?,
    };
    if !delta.is_finite() {
        return Err(ResearchError::collaborator("llm", "assessment is not a number"));
    }
    Ok(delta.clamp(-1.0, 1.0))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_json_ignores_surrounding_prose() {
        let text = "Sure! ```json\n{\"a\": {\"b\": 1}}\n``` hope that helps";
        assert_eq!(extract_json(text), Some("{\"a\": {\"b\": 1}}"));
        assert_eq!(extract_json("no json here"), None);
        assert_eq!(extract_json("} backwards {"), None);
    }

    #[test]
    fn test_parse_decision() {
        let text = r#"{"queries": [
            {"text": "rust release date", "uncertainty": "When was Rust released?"},
            {"text": "mozilla rust", "candidate": "Mozilla"},
            {"text": "rust history", "uncertainty": null, "candidate": ""}
        ]}"#;
        let Decision::Search(queries) = parse_decision(text).unwrap() else {
            panic!("expected search decision");
        };
        assert_eq!(
            queries,
            vec![
                SearchQuery::for_uncertainty("rust release date", "When was Rust released?"),
                SearchQuery::for_candidate("mozilla rust", "Mozilla"),
                SearchQuery::topic("rust history"),
            ]
        );

        assert_eq!(
            parse_decision(r#"{"no_further_action": true}"#).unwrap(),
            Decision::NoFurtherAction
        );
        assert!(parse_decision("I cannot help").is_err());
    }

    #[test]
    fn test_parse_delta_fills_defaults() {
        let text = r#"Result: {"facts": [{"content": "Rust 1.0 shipped in 2015"}],
            "candidates": [{"answer": "2015", "confidence_delta": 0.4}]}"#;
        let delta = parse_delta(text).unwrap();
        assert_eq!(delta.facts[0].source, "");
        assert!(delta.uncertainties.is_empty());
        assert_eq!(delta.candidates[0].confidence_delta, 0.4);
        assert!(delta.candidates[0].supporting_facts.is_empty());
    }

    #[test]
    fn test_parse_assessment() {
        assert_eq!(parse_assessment(r#"{"confidence_delta": 0.25}"#).unwrap(), 0.25);
        assert_eq!(parse_assessment(" 3.5 ").unwrap(), 1.0);
        assert!(parse_assessment("unsure").is_err());
    }

    #[test]
    fn test_decision_prompt_mentions_history() {
        let mut state = KnowledgeState::new("What is X?");
        state.begin_iteration();
        state.record_search(SearchRecord {
            iteration: 1,
            query: "x definition".to_string(),
            strategy: crate::strategy::SearchStrategy::Standard,
            results_summary: "no results".to_string(),
            result_count: 0,
            sources: Vec::new(),
            failed: false,
        });
        let prompt = decision_prompt(
            &state,
            &DecisionRequest {
                max_queries: 2,
                questions_per_search: 3,
                iteration: 2,
            },
        );
        assert!(prompt.contains("\"What is X?\""));
        assert!(prompt.contains("- x definition"));
        assert!(prompt.contains("at most 2 new search queries for round 2"));
    }
}
