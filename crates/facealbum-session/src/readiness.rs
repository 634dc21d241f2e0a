//! One-shot readiness signal for the face model runtime.
//!
//! Models load once per session. Every caller observes the same signal:
//! either check it without waiting, or await it. Nothing polls.

use std::sync::Arc;
use thiserror::Error;
use tokio::sync::watch;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReadyState {
    Loading,
    Ready,
    Failed(String),
    /// The runtime was torn down.
    Closed,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ReadinessError {
    #[error("model runtime failed to load: {0}")]
    Failed(String),
    #[error("model runtime shut down")]
    Closed,
}

/// Shared handle to the runtime's readiness. Clones observe the same signal.
#[derive(Debug, Clone)]
pub struct ReadinessGate {
    tx: Arc<watch::Sender<ReadyState>>,
}

impl ReadinessGate {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(ReadyState::Loading);
        Self { tx: Arc::new(tx) }
    }

    pub fn state(&self) -> ReadyState {
        self.tx.borrow().clone()
    }

    pub fn is_ready(&self) -> bool {
        *self.tx.borrow() == ReadyState::Ready
    }

    /// Open the gate. Only the first resolution counts.
    pub fn mark_ready(&self) {
        self.resolve(ReadyState::Ready);
    }

    pub fn mark_failed(&self, reason: impl Into<String>) {
        self.resolve(ReadyState::Failed(reason.into()));
    }

    /// Teardown: waiters are released with [`ReadinessError::Closed`].
    pub fn close(&self) {
        self.tx.send_replace(ReadyState::Closed);
    }

    fn resolve(&self, state: ReadyState) {
        let changed = self.tx.send_if_modified(|current| {
            if *current == ReadyState::Loading {
                *current = state;
                true
            } else {
                false
            }
        });
        if !changed {
            tracing::debug!(state = ?self.state(), "readiness already resolved");
        }
    }

    /// Wait until the runtime has resolved one way or the other.
    pub async fn wait(&self) -> Result<(), ReadinessError> {
        let mut rx = self.tx.subscribe();
        let state = rx
            .wait_for(|s| *s != ReadyState::Loading)
            .await
            .map(|s| (*s).clone())
            .unwrap_or(ReadyState::Closed);

        match state {
            ReadyState::Ready => Ok(()),
            ReadyState::Failed(reason) => Err(ReadinessError::Failed(reason)),
            ReadyState::Loading | ReadyState::Closed => Err(ReadinessError::Closed),
        }
    }
}

impl Default for ReadinessGate {
    fn default() -> Self {
        Self::new()
    }
}
