//! EventBus service for plan event streaming and distribution.
//!
//! Provides a broadcast-based event system with sequence numbering and a
//! per-run correlation id. Publishing never blocks the orchestrator; slow
//! subscribers observe `RecvError::Lagged` instead of back-pressuring the run.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::domain::models::PlanEvent;

/// Monotonically increasing sequence number assigned by EventBus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SequenceNumber(pub u64);

impl std::fmt::Display for SequenceNumber {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Event envelope carrying ordering and timing metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanEventEnvelope {
    pub sequence: SequenceNumber,
    pub timestamp: DateTime<Utc>,
    pub run_id: Option<Uuid>,
    pub event: PlanEvent,
}

/// Configuration for the EventBus.
#[derive(Debug, Clone)]
pub struct EventBusConfig {
    /// Channel capacity for the broadcast channel.
    pub channel_capacity: usize,
}

impl Default for EventBusConfig {
    fn default() -> Self {
        Self {
            channel_capacity: 1024,
        }
    }
}

/// Central event bus for broadcasting plan events to multiple consumers.
pub struct EventBus {
    sender: broadcast::Sender<PlanEventEnvelope>,
    sequence: AtomicU64,
    run_id: Mutex<Option<Uuid>>,
}

impl EventBus {
    /// Create a new EventBus with the given configuration.
    pub fn new(config: EventBusConfig) -> Self {
        let (sender, _) = broadcast::channel(config.channel_capacity.max(1));
        Self {
            sender,
            sequence: AtomicU64::new(0),
            run_id: Mutex::new(None),
        }
    }

    /// Shared bus with default configuration.
    pub fn shared() -> Arc<Self> {
        Arc::new(Self::new(EventBusConfig::default()))
    }

    /// Publish an event.
    pub fn publish(&self, event: PlanEvent) {
        let seq = self.sequence.fetch_add(1, Ordering::SeqCst);
        let run_id = self.run_id.lock().map(|guard| *guard).unwrap_or(None);

        tracing::trace!(sequence = seq, event = event.name(), "publishing plan event");

        let envelope = PlanEventEnvelope {
            sequence: SequenceNumber(seq),
            timestamp: Utc::now(),
            run_id,
            event,
        };

        // Broadcast to subscribers (ignore send errors - may have no subscribers)
        let _ = self.sender.send(envelope);
    }

    /// Subscribe to the event stream.
    pub fn subscribe(&self) -> broadcast::Receiver<PlanEventEnvelope> {
        self.sender.subscribe()
    }

    /// Get the current sequence number.
    pub fn current_sequence(&self) -> SequenceNumber {
        SequenceNumber(self.sequence.load(Ordering::SeqCst))
    }

    /// Tag subsequent events with a fresh run id.
    pub fn start_run(&self) -> Uuid {
        let id = Uuid::new_v4();
        if let Ok(mut guard) = self.run_id.lock() {
            *guard = Some(id);
        }
        id
    }

    /// Stop tagging events with a run id.
    pub fn end_run(&self) {
        if let Ok(mut guard) = self.run_id.lock() {
            *guard = None;
        }
    }

    /// Get the number of active subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(EventBusConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_event_bus_sequence_assignment() {
        let bus = EventBus::default();
        assert_eq!(bus.current_sequence().0, 0);

        let mut rx = bus.subscribe();

        bus.publish(PlanEvent::RunCancelled { at_index: 0 });
        let event1 = rx.recv().await.unwrap();
        assert_eq!(event1.sequence.0, 0);

        bus.publish(PlanEvent::RunCancelled { at_index: 1 });
        let event2 = rx.recv().await.unwrap();
        assert_eq!(event2.sequence.0, 1);

        assert_eq!(bus.current_sequence().0, 2);
    }

    #[tokio::test]
    async fn test_event_bus_run_correlation() {
        let bus = EventBus::default();
        let mut rx = bus.subscribe();

        bus.publish(PlanEvent::RunCancelled { at_index: 0 });
        assert!(rx.recv().await.unwrap().run_id.is_none());

        let run_id = bus.start_run();
        bus.publish(PlanEvent::RunCancelled { at_index: 0 });
        assert_eq!(rx.recv().await.unwrap().run_id, Some(run_id));

        bus.end_run();
        bus.publish(PlanEvent::RunCancelled { at_index: 0 });
        assert!(rx.recv().await.unwrap().run_id.is_none());
    }

    #[test]
    fn test_publish_without_subscribers_is_harmless() {
        let bus = EventBus::default();
        bus.publish(PlanEvent::RunCancelled { at_index: 0 });
        assert_eq!(bus.subscriber_count(), 0);
        assert_eq!(bus.current_sequence().0, 1);
    }
}
