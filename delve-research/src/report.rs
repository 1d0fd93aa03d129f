//! The final research report

use crate::types::*;
use crate::ResearchResult;
use serde::{Deserialize, Serialize};

/// Overall verdict of a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportStatus {
    /// Final confidence reached the threshold
    Conclusive,
    /// The run ended below the threshold
    Inconclusive,
    /// The run was cancelled; the report is partial
    Cancelled,
}

impl std::fmt::Display for ReportStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ReportStatus::Conclusive => write!(f, "conclusive"),
            ReportStatus::Inconclusive => write!(f, "inconclusive"),
            ReportStatus::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// Why the loop stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Termination {
    ConfidenceReached,
    /// Iteration cap reached below the threshold
    Exhausted,
    NoFurtherAction,
    Cancelled,
}

impl std::fmt::Display for Termination {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Termination::ConfidenceReached => write!(f, "confidence threshold reached"),
            Termination::Exhausted => write!(f, "iteration limit reached"),
            Termination::NoFurtherAction => write!(f, "no further productive queries"),
            Termination::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// The leading candidate at termination
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AcceptedAnswer {
    pub answer: String,
    pub confidence: f64,
    pub supporting_facts: Vec<String>,
    /// Whether the answer cleared the confidence threshold
    pub accepted: bool,
}

/// Snapshot of a finished run plus its narrative
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResearchReport {
    pub query: String,
    pub status: ReportStatus,
    pub termination: Termination,
    pub iteration_count: usize,
    pub confidence: f64,
    pub threshold: f64,
    pub accepted_answer: Option<AcceptedAnswer>,
    pub candidate_answers: Vec<CandidateAnswer>,
    pub key_facts: Vec<Fact>,
    pub uncertainties: Vec<Uncertainty>,
    pub search_history: Vec<SearchRecord>,
    pub rounds: Vec<RoundSummary>,
    /// Markdown narrative
    pub narrative: String,
    pub insights: Vec<String>,
    pub follow_up_questions: Vec<String>,
}

impl ResearchReport {
    pub fn is_conclusive(&self) -> bool {
        self.status == ReportStatus::Conclusive
    }

    pub fn is_cancelled(&self) -> bool {
        self.status == ReportStatus::Cancelled
    }

    /// Scalar objective for external parameter search
    ///
    /// The final confidence, or zero for a cancelled run.
    pub fn quality_score(&self) -> f64 {
        match self.status {
            ReportStatus::Cancelled => 0.0,
            _ => self.confidence,
        }
    }

    /// Pretty-printed JSON; identical states give identical output
    pub fn to_json(&self) -> ResearchResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}
