//! Update event tags and the bus carrying them to the rendering layer.
//!
//! Events carry no payload. They are pings: the receiver re-reads
//! authoritative state from the producing component, so dropping a stale
//! notification is always safe.

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::debug;

/// All notifications the engine can send to the rendering layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum UpdateEvent {
    FilesUpdated,
    BranchesUpdated,
    StashesUpdated,
    CommitOutputUpdated,
    PushOutputUpdated,
    PullOutputUpdated,
    StashOutputUpdated,
    BranchOutputUpdated,
    RemoteOutputUpdated,
}

/// Producer side of the single engine-to-renderer channel.
///
/// Cloneable; every background worker holds one. Delivery is best-effort:
/// a producer never blocks on a full channel, because stalling a refresh or
/// an operation to report on it would invert the dependency.
#[derive(Clone)]
pub struct EventBus {
    tx: mpsc::Sender<UpdateEvent>,
}

impl EventBus {
    /// Create the bus and its single receiver.
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<UpdateEvent>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self { tx }, rx)
    }

    /// Deliver an event without blocking. A full channel drops the event;
    /// a closed channel means the rendering layer is gone and nobody cares.
    pub fn emit(&self, event: UpdateEvent) {
        match self.tx.try_send(event) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(event)) => {
                debug!(
                    event = "sync.bus.event_dropped",
                    update = ?event,
                    "Bus full; the receiver will re-read state on its next event"
                );
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                debug!(event = "sync.bus.receiver_gone");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_serde_roundtrip() {
        let event = UpdateEvent::PushOutputUpdated;
        let json = serde_json::to_string(&event).unwrap();
        assert_eq!(json, "\"push-output-updated\"");
        let deserialized: UpdateEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(event, deserialized);
    }

    #[test]
    fn test_all_event_variants_serialize() {
        let events = [
            UpdateEvent::FilesUpdated,
            UpdateEvent::BranchesUpdated,
            UpdateEvent::StashesUpdated,
            UpdateEvent::CommitOutputUpdated,
            UpdateEvent::PushOutputUpdated,
            UpdateEvent::PullOutputUpdated,
            UpdateEvent::StashOutputUpdated,
            UpdateEvent::BranchOutputUpdated,
            UpdateEvent::RemoteOutputUpdated,
        ];
        for event in events {
            let json = serde_json::to_string(&event).unwrap();
            let roundtripped: UpdateEvent = serde_json::from_str(&json).unwrap();
            assert_eq!(event, roundtripped);
        }
    }

    #[tokio::test]
    async fn test_emit_and_receive() {
        let (bus, mut rx) = EventBus::new(4);
        bus.emit(UpdateEvent::FilesUpdated);
        assert_eq!(rx.recv().await, Some(UpdateEvent::FilesUpdated));
    }

    #[tokio::test]
    async fn test_full_bus_drops_without_blocking() {
        let (bus, mut rx) = EventBus::new(1);
        bus.emit(UpdateEvent::FilesUpdated);
        // Channel is full; this must return immediately and drop the event.
        bus.emit(UpdateEvent::BranchesUpdated);

        assert_eq!(rx.recv().await, Some(UpdateEvent::FilesUpdated));
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_emit_after_receiver_dropped_does_not_panic() {
        let (bus, rx) = EventBus::new(1);
        drop(rx);
        bus.emit(UpdateEvent::StashesUpdated);
    }
}
