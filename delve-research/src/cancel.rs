//! Cancellation of a run: external token plus optional deadline

use std::future::Future;
use tokio::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone)]
pub(crate) struct RunGuard {
    token: CancellationToken,
    deadline: Option<Instant>,
}

impl RunGuard {
    pub(crate) fn new(token: CancellationToken, timeout_ms: Option<u64>) -> Self {
        Self {
            token,
            deadline: timeout_ms.map(|ms| Instant::now() + Duration::from_millis(ms)),
        }
    }

    pub(crate) fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
            || self
                .deadline
                .is_some_and(|deadline| Instant::now() >= deadline)
    }

    async fn cancelled(&self) {
        match self.deadline {
            Some(deadline) => {
                tokio::select! {
                    _ = self.token.cancelled() => {}
                    _ = tokio::time::sleep_until(deadline) => {}
                }
            }
            None => self.token.cancelled().await,
        }
    }

    /// Drive `future` unless the run is cancelled first
    ///
    /// A cancelled future is dropped and its output never observed.
    pub(crate) async fn race<F: Future>(&self, future: F) -> Option<F::Output> {
        tokio::select! {
            biased;
            _ = self.cancelled() => None,
            output = future => Some(output),
        }
    }
}
