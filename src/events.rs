//! In-process event bus.
//!
//! Every subscriber owns an unbounded queue. Publishing never blocks and
//! never waits on a slow consumer; subscribers whose receiving half has
//! been dropped are pruned on the next publish.

use std::collections::HashMap;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use uuid::Uuid;

use crate::record::{AgentRecord, HealthStatus};

/// Kind of a registry event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    /// A new agent was registered.
    AgentRegistered,
    /// An existing agent's record changed.
    AgentUpdated,
    /// An agent was removed.
    AgentDeregistered,
    /// An agent's health status changed.
    AgentHealthChanged,
    /// An agent's trust score changed.
    TrustScoreChanged,
}

/// A registry event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    /// What happened.
    pub kind: EventKind,
    /// Event payload.
    pub data: Value,
    /// When it happened.
    pub timestamp: DateTime<Utc>,
}

impl Event {
    /// Creates an event stamped now.
    #[must_use]
    pub fn new(kind: EventKind, data: Value) -> Self {
        Self {
            kind,
            data,
            timestamp: Utc::now(),
        }
    }

    /// `agent_registered` or `agent_updated` carrying the full record.
    #[must_use]
    pub fn record_changed(kind: EventKind, record: &AgentRecord) -> Self {
        let data = serde_json::to_value(record).unwrap_or_else(|_| json!({ "id": record.id }));
        Self::new(kind, data)
    }

    /// `agent_deregistered`.
    #[must_use]
    pub fn deregistered(agent_id: &str) -> Self {
        Self::new(EventKind::AgentDeregistered, json!({ "agent_id": agent_id }))
    }

    /// `agent_health_changed`.
    #[must_use]
    pub fn health_changed(agent_id: &str, old: HealthStatus, new: HealthStatus) -> Self {
        Self::new(
            EventKind::AgentHealthChanged,
            json!({ "agent_id": agent_id, "old_status": old, "new_status": new }),
        )
    }

    /// `trust_score_changed`.
    #[must_use]
    pub fn trust_changed(agent_id: &str, old: f64, new: f64, reason: &str) -> Self {
        Self::new(
            EventKind::TrustScoreChanged,
            json!({
                "agent_id": agent_id,
                "old_score": old,
                "new_score": new,
                "reason": reason,
            }),
        )
    }

    /// Returns the `agent_id` (or record `id`) the event is about.
    #[must_use]
    pub fn agent_id(&self) -> Option<&str> {
        self.data
            .get("agent_id")
            .or_else(|| self.data.get("id"))
            .and_then(Value::as_str)
    }
}

/// Receiving end of a subscription.
#[derive(Debug)]
pub struct Subscription {
    id: Uuid,
    receiver: UnboundedReceiver<Event>,
}

impl Subscription {
    /// Returns the subscription ID.
    #[must_use]
    pub const fn id(&self) -> Uuid {
        self.id
    }

    /// Waits for the next event. Returns `None` once unsubscribed and drained.
    pub async fn recv(&mut self) -> Option<Event> {
        self.receiver.recv().await
    }

    /// Returns the next queued event without waiting.
    pub fn try_recv(&mut self) -> Option<Event> {
        self.receiver.try_recv().ok()
    }

    /// Drains every queued event.
    pub fn drain(&mut self) -> Vec<Event> {
        std::iter::from_fn(|| self.try_recv()).collect()
    }
}

/// Fan-out event bus shared as `Arc<EventBus>`.
#[derive(Debug, Default)]
pub struct EventBus {
    subscribers: Mutex<HashMap<Uuid, UnboundedSender<Event>>>,
}

impl EventBus {
    /// Creates an empty bus.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a new subscriber.
    ///
    /// # Panics
    ///
    /// Panics if the subscriber lock is poisoned.
    #[must_use]
    pub fn subscribe(&self) -> Subscription {
        let (sender, receiver) = mpsc::unbounded_channel();
        let id = Uuid::new_v4();
        self.subscribers
            .lock()
            .expect("lock poisoned")
            .insert(id, sender);
        Subscription { id, receiver }
    }

    /// Removes a subscriber. Events already queued stay readable.
    ///
    /// # Panics
    ///
    /// Panics if the subscriber lock is poisoned.
    pub fn unsubscribe(&self, subscription: &Subscription) {
        self.subscribers
            .lock()
            .expect("lock poisoned")
            .remove(&subscription.id);
    }

    /// Delivers `event` to every live subscriber and returns how many got it.
    ///
    /// # Panics
    ///
    /// Panics if the subscriber lock is poisoned.
    pub fn publish(&self, event: &Event) -> usize {
        let mut subscribers = self.subscribers.lock().expect("lock poisoned");
        subscribers.retain(|_, sender| sender.send(event.clone()).is_ok());
        tracing::trace!(kind = ?event.kind, delivered = subscribers.len(), "event published");
        subscribers.len()
    }

    /// Returns the number of registered subscribers.
    ///
    /// # Panics
    ///
    /// Panics if the subscriber lock is poisoned.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.lock().expect("lock poisoned").len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_subscriber_gets_every_event() {
        let bus = EventBus::new();
        let mut a = bus.subscribe();
        let mut b = bus.subscribe();

        let delivered = bus.publish(&Event::deregistered("x"));

        assert_eq!(delivered, 2);
        assert_eq!(a.try_recv().unwrap().kind, EventKind::AgentDeregistered);
        assert_eq!(b.try_recv().unwrap().agent_id(), Some("x"));
    }

    #[test]
    fn dropped_subscribers_are_pruned() {
        let bus = EventBus::new();
        let kept = bus.subscribe();
        drop(bus.subscribe());

        assert_eq!(bus.subscriber_count(), 2);
        assert_eq!(bus.publish(&Event::deregistered("x")), 1);
        assert_eq!(bus.subscriber_count(), 1);
        drop(kept);
    }

    #[test]
    fn unsubscribe_stops_delivery() {
        let bus = EventBus::new();
        let mut sub = bus.subscribe();
        bus.publish(&Event::deregistered("first"));
        bus.unsubscribe(&sub);
        bus.publish(&Event::deregistered("second"));

        let events = sub.drain();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].agent_id(), Some("first"));
    }

    #[tokio::test]
    async fn recv_ends_after_unsubscribe() {
        let bus = EventBus::new();
        let mut sub = bus.subscribe();
        bus.unsubscribe(&sub);

        assert!(sub.recv().await.is_none());
    }

    #[test]
    fn event_kind_wire_names() {
        let text = serde_json::to_string(&EventKind::AgentHealthChanged).unwrap();
        assert_eq!(text, "\"agent_health_changed\"");
    }
}
