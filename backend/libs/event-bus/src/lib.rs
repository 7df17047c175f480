//! In-process domain event bus
//!
//! Decouples the services that produce reading-platform events (book
//! finished, goal completed, interaction recorded) from the services that
//! react to them, without either side importing the other's storage.
//!
//! # Architecture
//!
//! ```text
//! reading flow:
//!   1. Mark book as completed in its own store
//!   2. Publish to the bus:
//!      publish(DomainEvent::new(EventType::BookCompleted, data, user_id, "reading-service"))
//!      ↓
//! EventBus (synchronous fan-out, subscription order)
//!      ↓
//! recommendation-service subscribers:
//!   3. Enqueue a vector refresh for the finished book
//!   4. Invalidate the user's cached recommendation stats
//! ```
//!
//! Delivery is best-effort: a handler that returns an error or panics is
//! logged and counted, and the remaining handlers still run. The bus holds
//! no state besides its subscriber registry; consumers persist what they
//! need.

use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, RwLock};
use tracing::{debug, warn};
use uuid::Uuid;

mod stats;

pub use stats::{BusStats, StatsSnapshot};

/// Domain event categories carried by the bus.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum EventType {
    BookCompleted,
    ReadingGoalProgressed,
    ReadingGoalCompleted,
    InteractionRecorded,
    RecommendationsGenerated,
    ProfileUpdated,
    Custom(String),
}

impl std::fmt::Display for EventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EventType::BookCompleted => write!(f, "book.completed"),
            EventType::ReadingGoalProgressed => write!(f, "goal.progressed"),
            EventType::ReadingGoalCompleted => write!(f, "goal.completed"),
            EventType::InteractionRecorded => write!(f, "interaction.recorded"),
            EventType::RecommendationsGenerated => write!(f, "recommendations.generated"),
            EventType::ProfileUpdated => write!(f, "profile.updated"),
            EventType::Custom(s) => write!(f, "{}", s),
        }
    }
}

impl From<&str> for EventType {
    fn from(s: &str) -> Self {
        match s {
            "book.completed" => EventType::BookCompleted,
            "goal.progressed" => EventType::ReadingGoalProgressed,
            "goal.completed" => EventType::ReadingGoalCompleted,
            "interaction.recorded" => EventType::InteractionRecorded,
            "recommendations.generated" => EventType::RecommendationsGenerated,
            "profile.updated" => EventType::ProfileUpdated,
            custom => EventType::Custom(custom.to_string()),
        }
    }
}

/// Transient event message. Not persisted by the bus itself.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DomainEvent {
    pub event_id: Uuid,
    pub event_type: EventType,
    pub data: serde_json::Value,
    pub user_id: Option<Uuid>,
    pub source_service: String,
    pub timestamp: DateTime<Utc>,
}

impl DomainEvent {
    pub fn new(
        event_type: EventType,
        data: serde_json::Value,
        user_id: Option<Uuid>,
        source_service: impl Into<String>,
    ) -> Self {
        Self {
            event_id: Uuid::new_v4(),
            event_type,
            data,
            user_id,
            source_service: source_service.into(),
            timestamp: Utc::now(),
        }
    }
}

/// Handler signature: synchronous, fallible. Handlers that need async work
/// should hand it off (e.g. `tokio::spawn`) rather than block the publisher.
pub type Handler = Arc<dyn Fn(&DomainEvent) -> anyhow::Result<()> + Send + Sync>;

struct Subscription {
    name: String,
    handler: Handler,
}

/// Outcome of a single publish: how many handlers ran, how many failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeliveryReport {
    pub delivered: usize,
    pub failed: usize,
}

impl DeliveryReport {
    pub fn handled(&self) -> usize {
        self.delivered + self.failed
    }
}

/// Synchronous in-process publish/subscribe bus.
pub struct EventBus {
    subscribers: RwLock<HashMap<EventType, Vec<Subscription>>>,
    stats: BusStats,
}

static GLOBAL_BUS: Lazy<EventBus> = Lazy::new(EventBus::new);

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl EventBus {
    pub fn new() -> Self {
        Self {
            subscribers: RwLock::new(HashMap::new()),
            stats: BusStats::default(),
        }
    }

    /// Process-wide bus instance, initialized on first use and never torn
    /// down before process exit.
    pub fn global() -> &'static EventBus {
        &GLOBAL_BUS
    }

    /// Register `handler` for `event_type` under a unique `name`.
    ///
    /// Handlers fire in subscription order. Re-subscribing under the same
    /// name replaces the previous handler in place, keeping its position.
    pub fn subscribe(
        &self,
        event_type: EventType,
        name: impl Into<String>,
        handler: Handler,
    ) {
        let name = name.into();
        let mut subs = self.subscribers.write().expect("subscriber lock poisoned");
        let entries = subs.entry(event_type.clone()).or_default();
        if let Some(existing) = entries.iter_mut().find(|s| s.name == name) {
            existing.handler = handler;
        } else {
            entries.push(Subscription { name: name.clone(), handler });
        }
        debug!(event_type = %event_type, subscriber = %name, "Subscriber registered");
    }

    /// Remove a named subscriber. Returns whether it was registered.
    pub fn unsubscribe(&self, event_type: &EventType, name: &str) -> bool {
        let mut subs = self.subscribers.write().expect("subscriber lock poisoned");
        if let Some(entries) = subs.get_mut(event_type) {
            let before = entries.len();
            entries.retain(|s| s.name != name);
            return entries.len() != before;
        }
        false
    }

    pub fn subscriber_count(&self, event_type: &EventType) -> usize {
        self.subscribers
            .read()
            .expect("subscriber lock poisoned")
            .get(event_type)
            .map(|e| e.len())
            .unwrap_or(0)
    }

    /// Fan an event out to every subscriber of its type.
    ///
    /// Each handler runs exactly once; an error or panic in handler k is
    /// caught and logged, and handlers k+1..N still execute.
    pub fn publish(&self, event: &DomainEvent) -> DeliveryReport {
        self.stats.record_published();

        let subs = self.subscribers.read().expect("subscriber lock poisoned");
        let entries = match subs.get(&event.event_type) {
            Some(entries) if !entries.is_empty() => entries,
            _ => {
                debug!(event_type = %event.event_type, "No subscribers for event");
                return DeliveryReport { delivered: 0, failed: 0 };
            }
        };

        let mut report = DeliveryReport { delivered: 0, failed: 0 };
        for sub in entries {
            let outcome = catch_unwind(AssertUnwindSafe(|| (sub.handler)(event)));
            match outcome {
                Ok(Ok(())) => {
                    self.stats.record_delivered();
                    report.delivered += 1;
                }
                Ok(Err(err)) => {
                    self.stats.record_failed();
                    report.failed += 1;
                    warn!(
                        event_type = %event.event_type,
                        subscriber = %sub.name,
                        error = %err,
                        "Event handler failed"
                    );
                }
                Err(_) => {
                    self.stats.record_failed();
                    report.failed += 1;
                    warn!(
                        event_type = %event.event_type,
                        subscriber = %sub.name,
                        "Event handler panicked"
                    );
                }
            }
        }

        report
    }

    /// Convenience wrapper: build the event and publish it.
    pub fn publish_event(
        &self,
        event_type: EventType,
        data: serde_json::Value,
        user_id: Option<Uuid>,
        source_service: &str,
    ) -> DeliveryReport {
        let event = DomainEvent::new(event_type, data, user_id, source_service);
        self.publish(&event)
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn counting_handler(counter: Arc<AtomicUsize>) -> Handler {
        Arc::new(move |_event| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        })
    }

    #[test]
    fn test_publish_reaches_all_subscribers() {
        let bus = EventBus::new();
        let a = Arc::new(AtomicUsize::new(0));
        let b = Arc::new(AtomicUsize::new(0));

        bus.subscribe(EventType::BookCompleted, "a", counting_handler(a.clone()));
        bus.subscribe(EventType::BookCompleted, "b", counting_handler(b.clone()));

        let report = bus.publish_event(
            EventType::BookCompleted,
            serde_json::json!({"book_id": "x"}),
            Some(Uuid::new_v4()),
            "reading-service",
        );

        assert_eq!(report.delivered, 2);
        assert_eq!(report.failed, 0);
        assert_eq!(a.load(Ordering::SeqCst), 1);
        assert_eq!(b.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_failing_handler_does_not_block_later_ones() {
        let bus = EventBus::new();
        let later = Arc::new(AtomicUsize::new(0));

        bus.subscribe(
            EventType::ReadingGoalCompleted,
            "broken",
            Arc::new(|_| Err(anyhow::anyhow!("boom"))),
        );
        bus.subscribe(
            EventType::ReadingGoalCompleted,
            "panicking",
            Arc::new(|_| panic!("handler bug")),
        );
        bus.subscribe(
            EventType::ReadingGoalCompleted,
            "healthy",
            counting_handler(later.clone()),
        );

        let report = bus.publish_event(
            EventType::ReadingGoalCompleted,
            serde_json::Value::Null,
            None,
            "reading-service",
        );

        assert_eq!(report.failed, 2);
        assert_eq!(report.delivered, 1);
        assert_eq!(later.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_subscription_order_preserved() {
        let bus = EventBus::new();
        let order = Arc::new(RwLock::new(Vec::new()));

        for name in ["first", "second", "third"] {
            let order = order.clone();
            bus.subscribe(
                EventType::InteractionRecorded,
                name,
                Arc::new(move |_| {
                    order.write().unwrap().push(name);
                    Ok(())
                }),
            );
        }

        bus.publish_event(
            EventType::InteractionRecorded,
            serde_json::Value::Null,
            None,
            "test",
        );

        assert_eq!(*order.read().unwrap(), vec!["first", "second", "third"]);
    }

    #[test]
    fn test_resubscribe_replaces_in_place() {
        let bus = EventBus::new();
        let a = Arc::new(AtomicUsize::new(0));
        let b = Arc::new(AtomicUsize::new(0));

        bus.subscribe(EventType::ProfileUpdated, "x", counting_handler(a.clone()));
        bus.subscribe(EventType::ProfileUpdated, "x", counting_handler(b.clone()));
        assert_eq!(bus.subscriber_count(&EventType::ProfileUpdated), 1);

        bus.publish_event(EventType::ProfileUpdated, serde_json::Value::Null, None, "test");
        assert_eq!(a.load(Ordering::SeqCst), 0);
        assert_eq!(b.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_unsubscribe() {
        let bus = EventBus::new();
        let a = Arc::new(AtomicUsize::new(0));

        bus.subscribe(EventType::BookCompleted, "a", counting_handler(a.clone()));
        assert!(bus.unsubscribe(&EventType::BookCompleted, "a"));
        assert!(!bus.unsubscribe(&EventType::BookCompleted, "a"));

        bus.publish_event(EventType::BookCompleted, serde_json::Value::Null, None, "test");
        assert_eq!(a.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_global_bus_is_shared() {
        let hits = Arc::new(AtomicUsize::new(0));
        let event_type = EventType::Custom("global.smoke".to_string());
        EventBus::global().subscribe(event_type.clone(), "smoke", counting_handler(hits.clone()));

        EventBus::global().publish_event(event_type.clone(), serde_json::Value::Null, None, "test");
        assert_eq!(hits.load(Ordering::SeqCst), 1);

        assert!(EventBus::global().unsubscribe(&event_type, "smoke"));
    }

    #[test]
    fn test_event_type_roundtrip() {
        for raw in [
            "book.completed",
            "goal.progressed",
            "goal.completed",
            "interaction.recorded",
            "recommendations.generated",
            "profile.updated",
        ] {
            let parsed = EventType::from(raw);
            assert_eq!(parsed.to_string(), raw);
        }
        assert_eq!(
            EventType::from("payment.settled"),
            EventType::Custom("payment.settled".to_string())
        );
    }
}
