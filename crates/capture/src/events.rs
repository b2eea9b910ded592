//! Session event bus.
//!
//! Type-safe lifecycle events over a tokio broadcast channel. Tests (and
//! any observer) subscribe to watch a session walk its states without
//! instrumenting the pipeline itself.

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::strategy::Attempt;

/// Lifecycle states and notable transitions of one capture session. A
/// session moves launched -> navigated -> strategy-running -> resolved ->
/// torn-down; `TornDown` is reachable from every earlier state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SessionEvent {
    Launched,
    Navigated { url: String },
    StrategyStarted,
    AttemptFinished { attempt: Attempt, found: bool },
    Resolved,
    TornDown,
}

/// Broadcast bus for session events.
pub struct SessionEvents {
    tx: broadcast::Sender<SessionEvent>,
}

impl SessionEvents {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(256);
        Self { tx }
    }

    /// Publish an event. Lagging or absent subscribers are not an error.
    pub fn publish(&self, event: SessionEvent) {
        let _ = self.tx.send(event);
    }

    /// Subscribe to events published after this call.
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.tx.subscribe()
    }
}

impl Default for SessionEvents {
    fn default() -> Self {
        Self::new()
    }
}
