//! Progress observation

use crate::state::KnowledgeState;
use crate::types::ResearchPhase;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

/// A progress notification emitted at every phase boundary
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressEvent {
    pub phase: ResearchPhase,
    pub iteration: usize,
    pub max_iterations: usize,
    pub message: String,
    /// Overall progress in [0, 100]
    pub progress: f64,
}

impl ProgressEvent {
    pub(crate) fn new(
        phase: ResearchPhase,
        iteration: usize,
        max_iterations: usize,
        message: impl Into<String>,
    ) -> Self {
        Self {
            phase,
            iteration,
            max_iterations,
            message: message.into(),
            progress: progress_percent(phase, iteration, max_iterations),
        }
    }
}

fn progress_percent(phase: ResearchPhase, iteration: usize, max_iterations: usize) -> f64 {
    let within_round = match phase {
        ResearchPhase::Init => return 0.0,
        ResearchPhase::Synthesizing | ResearchPhase::Done => return 100.0,
        ResearchPhase::Deciding => 0.0,
        ResearchPhase::Searching => 0.25,
        ResearchPhase::Updating => 0.5,
        ResearchPhase::Assessing => 0.75,
    };
    let rounds = max_iterations.max(1) as f64;
    let done = iteration.saturating_sub(1) as f64 + within_round;
    (done / rounds * 100.0).clamp(0.0, 100.0)
}

/// Receives fire-and-forget progress notifications
///
/// Observers only ever see a shared reference to the state. A panic inside
/// `notify` is caught and logged by the engine; it never affects the run.
pub trait ProgressObserver: Send + Sync {
    fn notify(&self, event: &ProgressEvent, state: &KnowledgeState);
}

/// Observer that ignores every notification
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopObserver;

impl ProgressObserver for NoopObserver {
    fn notify(&self, _event: &ProgressEvent, _state: &KnowledgeState) {}
}

/// Snapshot forwarded by [`ChannelObserver`]
#[derive(Debug, Clone, PartialEq)]
pub struct ProgressUpdate {
    pub event: ProgressEvent,
    pub confidence: f64,
    pub fact_count: usize,
    pub open_uncertainties: usize,
}

/// Forwards progress to an unbounded tokio channel
///
/// Sends never block; a dropped receiver silently discards updates.
#[derive(Debug, Clone)]
pub struct ChannelObserver {
    sender: mpsc::UnboundedSender<ProgressUpdate>,
}

impl ChannelObserver {
    pub fn new(sender: mpsc::UnboundedSender<ProgressUpdate>) -> Self {
        Self { sender }
    }

    /// Create an observer together with the receiving end
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<ProgressUpdate>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self::new(sender), receiver)
    }
}

impl ProgressObserver for ChannelObserver {
    fn notify(&self, event: &ProgressEvent, state: &KnowledgeState) {
        let _ = self.sender.send(ProgressUpdate {
            event: event.clone(),
            confidence: state.confidence(),
            fact_count: state.key_facts().len(),
            open_uncertainties: state.uncertainties().len(),
        });
    }
}
