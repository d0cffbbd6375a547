//! Domain events.
//!
//! Services emit events after their store transaction commits. Delivery is
//! best-effort: emitting never fails and never blocks, and a slow subscriber
//! only loses its own backlog.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use corgi_types::Id;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// Something that happened in the ledger.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    /// Event type name (e.g. "RewardSettled", "BuddyRequested").
    pub event_type: String,
    /// The user the event concerns, if any.
    pub user_id: Option<Id>,
    /// Unix timestamp.
    pub timestamp: u64,
    /// Type-specific payload.
    pub payload: serde_json::Value,
}

impl Event {
    pub fn new(event_type: &str, user_id: Option<Id>, payload: serde_json::Value) -> Self {
        Self {
            event_type: event_type.to_string(),
            user_id,
            timestamp: corgi_db::now(),
            payload,
        }
    }

    pub fn category(&self) -> &'static str {
        categorize_event(&self.event_type)
    }
}

/// Event bus shared by every service. Cloning shares the channel.
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<Event>,
    sequence: Arc<AtomicU64>,
}

impl EventBus {
    /// Create a new event bus with the given buffer capacity.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self {
            sender,
            sequence: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn emit(&self, event: Event) {
        self.sequence.fetch_add(1, Ordering::SeqCst);
        // No subscribers is fine.
        let _ = self.sender.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.sender.subscribe()
    }

    /// Number of events emitted so far.
    pub fn sequence(&self) -> u64 {
        self.sequence.load(Ordering::SeqCst)
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(1000)
    }
}

fn categorize_event(event_type: &str) -> &'static str {
    match event_type {
        s if s.starts_with("Reward") || s.starts_with("Wish") || s.starts_with("Wallet") => {
            "settlement"
        }
        s if s.starts_with("Buddy") || s.starts_with("Sighting") => "social",
        _ => "system",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_bus_emit_subscribe() {
        let bus = EventBus::new(16);
        let mut rx = bus.subscribe();

        bus.emit(Event::new(
            "RewardSettled",
            Some(7),
            serde_json::json!({"amount": "5000000000"}),
        ));

        let event = rx.try_recv().expect("receive event");
        assert_eq!(event.event_type, "RewardSettled");
        assert_eq!(event.user_id, Some(7));
        assert_eq!(bus.sequence(), 1);
    }

    #[test]
    fn test_emit_without_subscribers() {
        let bus = EventBus::new(4);
        bus.emit(Event::new("DaemonStarted", None, serde_json::json!({})));
        assert_eq!(bus.sequence(), 1);
    }

    #[test]
    fn test_categorize_event() {
        assert_eq!(categorize_event("RewardSettled"), "settlement");
        assert_eq!(categorize_event("WishPurchased"), "settlement");
        assert_eq!(categorize_event("BuddyConfirmed"), "social");
        assert_eq!(categorize_event("SightingReported"), "social");
        assert_eq!(categorize_event("DaemonStarted"), "system");
    }
}
