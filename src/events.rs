// src/events.rs

use crate::models::KhatamTarget;
use tokio::sync::broadcast;

/// Notifications published after reading-state mutations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TrackerEvent {
    /// Something in the log, target, bookmarks or notes changed.
    Changed,
    /// The page pointer reached the last page. Carries the target as saved.
    Completed(KhatamTarget),
}

/// Per-instance subscription point shared by the stores that publish [`TrackerEvent`]s.
///
/// Publishing never blocks and is a no-op without subscribers. Slow
/// subscribers see `RecvError::Lagged` instead of holding up writers.
#[derive(Clone, Debug)]
pub struct EventBus {
    tx: broadcast::Sender<TrackerEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn publish(&self, event: TrackerEvent) {
        let _ = self.tx.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<TrackerEvent> {
        self.tx.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(64)
    }
}
