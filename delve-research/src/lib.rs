//! Delve Research - iterative knowledge-convergence research engine
//!
//! A research run repeatedly decides what to search for, executes the
//! searches, folds the results into a [`KnowledgeState`] and assesses how
//! confident the accumulated evidence makes it, until the confidence crosses
//! a threshold, the iteration cap is reached or no productive query remains.
//! The final state is synthesized into a [`ResearchReport`].
//!
//! ## Architecture
//!
//! - **Engine** ([`ResearchEngine`]): owns the loop and the knowledge state
//! - **Planner** ([`ResearchPlanner`]): orders, deduplicates and falls back on queries
//! - **Strategies** ([`SearchStrategy`]): how a round's searches are executed
//! - **Scoring** ([`ConfidenceScorer`]): pluggable confidence policy
//! - **Synthesizer** ([`ResearchSynthesizer`]): deterministic report assembly
//! - **Collaborators** ([`ReasoningBackend`], [`SearchBackend`], [`ProgressObserver`]):
//!   external services consumed through traits

pub mod backend;
pub mod config;
pub mod engine;
#[cfg(feature = "llm")]
pub mod llm;
pub mod observer;
pub mod planner;
pub mod prompts;
pub mod report;
pub mod scoring;
pub mod state;
pub mod strategy;
pub mod synthesizer;
pub mod types;

mod cancel;

pub use backend::{ReasoningBackend, SearchBackend};
pub use config::ResearchConfig;
pub use engine::ResearchEngine;
#[cfg(feature = "llm")]
pub use llm::ChatReasoningBackend;
pub use observer::{ChannelObserver, NoopObserver, ProgressEvent, ProgressObserver, ProgressUpdate};
pub use planner::{Plan, ResearchPlanner};
pub use report::{AcceptedAnswer, ReportStatus, ResearchReport, Termination};
pub use scoring::{
    ConfidenceScorer, ConfidenceSignals, CumulativeScorer, ScoringPolicy, ScoringWeights,
    WeightedScorer,
};
pub use state::{normalize_text, DeltaOutcome, KnowledgeState};
pub use strategy::SearchStrategy;
pub use synthesizer::ResearchSynthesizer;
pub use types::*;

// Re-export so callers can cancel runs without depending on tokio-util directly
pub use tokio_util::sync::CancellationToken;

/// Research-level error type
#[derive(Debug, thiserror::Error)]
pub enum ResearchError {
    #[error("Configuration error ({field}): {message}")]
    Configuration { field: String, message: String },

    #[error("Collaborator error ({backend}): {message}")]
    Collaborator { backend: String, message: String },

    #[error("Invariant violation: {message}")]
    InvariantViolation { message: String },

    #[error("Core error: {0}")]
    Core(#[from] delve_core::DelveError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type ResearchResult<T> = Result<T, ResearchError>;

impl ResearchError {
    /// Create a configuration error for a specific option
    pub fn configuration<F: Into<String>, S: Into<String>>(field: F, message: S) -> Self {
        Self::Configuration {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Create a collaborator error
    pub fn collaborator<B: Into<String>, S: Into<String>>(backend: B, message: S) -> Self {
        Self::Collaborator {
            backend: backend.into(),
            message: message.into(),
        }
    }

    /// Create an invariant violation error
    pub fn invariant<S: Into<String>>(message: S) -> Self {
        Self::InvariantViolation {
            message: message.into(),
        }
    }

    /// Whether the error aborts a run rather than degrading it
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::Configuration { .. } | Self::InvariantViolation { .. }
        )
    }
}
