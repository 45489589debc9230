//! Sync event stream consumed by the UI layer.
//!
//! The engine never presents anything itself: it publishes events on a
//! broadcast channel and the host application decides how (and whether) to
//! surface them. Emitting with no subscribers is fine.

use serde::Serialize;
use tokio::sync::broadcast;

use crate::sync::StatusSnapshot;

/// Events published by the sync engine.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SyncEvent {
    /// Reachability of the order service, emitted every loop tick.
    NetworkStatus { is_online: bool },
    /// Queue counters for UI indicators.
    SyncStatus(StatusSnapshot),
    /// An automatic sync pass pushed `synced` orders through.
    SyncComplete { synced: usize },
    /// An automatic sync pass failed; pending orders stay queued.
    SyncFailed { error: String },
    /// These orders burned through their retry budget and now need a
    /// manual resync.
    RetriesExhausted { sessions: Vec<String> },
    BackupCreated { count: usize },
    BackupCleared,
}

/// Fan-out channel for [`SyncEvent`]s.
pub struct EventBus {
    tx: broadcast::Sender<SyncEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        EventBus { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SyncEvent> {
        self.tx.subscribe()
    }

    /// Publish an event. Dropped silently when nobody is listening.
    pub fn emit(&self, event: SyncEvent) {
        let _ = self.tx.send(event);
    }
}

impl Default for EventBus {
    fn default() -> Self {
        EventBus::new(64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_subscribers_receive_emitted_events() {
        let bus = EventBus::default();
        let mut rx = bus.subscribe();

        bus.emit(SyncEvent::SyncComplete { synced: 3 });
        match rx.try_recv() {
            Ok(SyncEvent::SyncComplete { synced }) => assert_eq!(synced, 3),
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[test]
    fn test_emit_without_subscribers_is_silent() {
        let bus = EventBus::default();
        bus.emit(SyncEvent::BackupCleared);
    }

    #[test]
    fn test_events_serialize_with_type_tag() {
        let json = serde_json::to_value(SyncEvent::NetworkStatus { is_online: false }).unwrap();
        assert_eq!(json.get("type").and_then(|v| v.as_str()), Some("network_status"));
        assert_eq!(json.get("is_online").and_then(|v| v.as_bool()), Some(false));
    }
}
