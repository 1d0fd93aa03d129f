//! Confidence scoring policies
//!
//! The assessment step reduces the knowledge state to [`ConfidenceSignals`]
//! and hands them to a [`ConfidenceScorer`]. The weighting is a tunable
//! policy: external optimizers can sweep [`ScoringWeights`] through the
//! configuration or install their own scorer on the engine.

use crate::state::KnowledgeState;
use crate::{ResearchError, ResearchResult};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Inputs to a confidence scorer, gathered after each update phase
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ConfidenceSignals {
    /// Confidence after the previous assessment
    pub previous: f64,
    /// Gap between the two best candidate confidences
    pub candidate_gap: f64,
    /// Confidence of the leading candidate (0 without candidates)
    ///
    /// Not read by the built-in scorers; external scorers may weigh it.
    pub leading_confidence: f64,
    /// Supporting facts of the leading candidate
    pub leading_support: usize,
    /// Fraction of uncertainties resolved this round
    pub resolved_fraction: f64,
    pub open_uncertainties: usize,
    /// Key facts gathered so far
    pub fact_count: usize,
    /// Adjustment suggested by the reasoning backend
    pub assessment_delta: f64,
}

impl ConfidenceSignals {
    pub fn from_state(state: &KnowledgeState, assessment_delta: f64) -> Self {
        let leader = state.leading_candidate();
        Self {
            previous: state.confidence(),
            candidate_gap: state.candidate_gap(),
            leading_confidence: leader.map_or(0.0, |c| c.confidence),
            leading_support: leader.map_or(0, |c| c.support()),
            resolved_fraction: state.resolved_fraction(),
            open_uncertainties: state.uncertainties().len(),
            fact_count: state.key_facts().len(),
            assessment_delta: if assessment_delta.is_finite() {
                assessment_delta
            } else {
                0.0
            },
        }
    }
}

/// Pluggable confidence policy
///
/// Implementations must return a value in [0, 1]; anything else aborts the
/// run with an invariant violation.
pub trait ConfidenceScorer: Send + Sync {
    fn score(&self, signals: &ConfidenceSignals) -> f64;

    fn name(&self) -> &str;
}

/// Weights of the default evidence-based scorer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringWeights {
    pub gap_weight: f64,
    pub support_weight: f64,
    pub resolution_weight: f64,
    /// Multiplier on the reasoning backend's assessment delta
    pub assessment_weight: f64,
    /// Subtracted per open uncertainty
    pub uncertainty_penalty: f64,
    /// Supporting facts at which the support term saturates
    pub support_saturation: usize,
    /// Weight of the overall key-fact volume
    pub volume_weight: f64,
    /// Key facts at which the volume term saturates
    pub volume_saturation: usize,
}

impl Default for ScoringWeights {
    fn default() -> Self {
        Self {
            gap_weight: 0.35,
            support_weight: 0.3,
            resolution_weight: 0.15,
            assessment_weight: 1.0,
            uncertainty_penalty: 0.05,
            support_saturation: 4,
            volume_weight: 0.1,
            volume_saturation: 8,
        }
    }
}

/// Which scorer a run uses
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ScoringPolicy {
    /// Evidence-weighted score recomputed every round
    Weighted(ScoringWeights),
    /// Previous confidence plus the backend's assessment delta
    Cumulative,
}

impl Default for ScoringPolicy {
    fn default() -> Self {
        ScoringPolicy::Weighted(ScoringWeights::default())
    }
}

impl ScoringPolicy {
    pub fn build(&self) -> Arc<dyn ConfidenceScorer> {
        match self {
            ScoringPolicy::Weighted(weights) => Arc::new(WeightedScorer::new(weights.clone())),
            ScoringPolicy::Cumulative => Arc::new(CumulativeScorer),
        }
    }

    pub fn validate(&self) -> ResearchResult<()> {
        let ScoringPolicy::Weighted(weights) = self else {
            return Ok(());
        };

        let named = [
            ("scoring.gap_weight", weights.gap_weight),
            ("scoring.support_weight", weights.support_weight),
            ("scoring.resolution_weight", weights.resolution_weight),
            ("scoring.assessment_weight", weights.assessment_weight),
            ("scoring.uncertainty_penalty", weights.uncertainty_penalty),
            ("scoring.volume_weight", weights.volume_weight),
        ];
        for (field, value) in named {
            if !value.is_finite() || value < 0.0 {
                return Err(ResearchError::configuration(
                    field,
                    format!("must be a non-negative number, got {}", value),
                ));
            }
        }

        let saturations = [
            ("scoring.support_saturation", weights.support_saturation),
            ("scoring.volume_saturation", weights.volume_saturation),
        ];
        for (field, value) in saturations {
            if value == 0 {
                return Err(ResearchError::configuration(field, "must be a positive integer"));
            }
        }
        Ok(())
    }
}

/// Evidence-weighted scorer
///
/// Non-decreasing in the candidate gap, the leader's support, the key-fact
/// volume and the resolution fraction; each open uncertainty costs a fixed
/// penalty.
#[derive(Debug, Clone)]
pub struct WeightedScorer {
    weights: ScoringWeights,
}

impl WeightedScorer {
    pub fn new(weights: ScoringWeights) -> Self {
        Self { weights }
    }
}

impl ConfidenceScorer for WeightedScorer {
    fn score(&self, signals: &ConfidenceSignals) -> f64 {
        let w = &self.weights;
        let saturation = w.support_saturation.max(1) as f64;
        let support = (signals.leading_support as f64 / saturation).min(1.0);
        let volume = (signals.fact_count as f64 / w.volume_saturation.max(1) as f64).min(1.0);

        let raw = w.gap_weight * signals.candidate_gap
            + w.support_weight * support
            + w.volume_weight * volume
            + w.resolution_weight * signals.resolved_fraction
            + w.assessment_weight * signals.assessment_delta
            - w.uncertainty_penalty * signals.open_uncertainties as f64;

        if raw.is_finite() {
            raw.clamp(0.0, 1.0)
        } else {
            0.0
        }
    }

    fn name(&self) -> &str {
        "weighted"
    }
}

/// Lets the reasoning backend drive confidence through its assessment deltas
#[derive(Debug, Clone, Copy, Default)]
pub struct CumulativeScorer;

impl ConfidenceScorer for CumulativeScorer {
    fn score(&self, signals: &ConfidenceSignals) -> f64 {
        (signals.previous + signals.assessment_delta).clamp(0.0, 1.0)
    }

    fn name(&self) -> &str {
        "cumulative"
    }
}
