//! Topic -> subscriber index with per-subscriber filters and in-process
//! topic handlers.
//!
//! Registration (subscribe/unsubscribe/remove) takes the write side of the
//! bus lock; publish takes the read side only long enough to snapshot the
//! handlers and the matched subscribers, so fan-out never holds the lock.  A
//! subscribe that returns before a publish starts is guaranteed eligible for
//! that publish.
//!
//! Delivery is best-effort and at-most-once: each subscriber has a bounded
//! queue and a full queue drops that delivery with a warning.  Handler
//! panics and errors are caught, logged with the event id and topic, and
//! never reach other handlers or subscriber delivery.

use crate::events::filter;
use cam_protocol::{EventMessage, EventTopic, SubscriptionStats};
use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use std::collections::{HashMap, HashSet};
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use tokio::sync::mpsc;
use tracing::{debug, error, warn};
use uuid::Uuid;

/// A client's declared interest in a set of topics.
///
/// Replaced wholesale on resubscribe; a client holds at most one.
pub struct Subscription {
    pub client_id: u64,
    pub topics: HashSet<EventTopic>,
    pub filters: Option<Map<String, Value>>,
    pub created_at: DateTime<Utc>,
    last_event_at: Mutex<Option<DateTime<Utc>>>,
    active: AtomicBool,
}

impl Subscription {
    fn new(
        client_id: u64,
        topics: HashSet<EventTopic>,
        filters: Option<Map<String, Value>>,
    ) -> Arc<Self> {
        Arc::new(Self {
            client_id,
            topics,
            filters,
            created_at: Utc::now(),
            last_event_at: Mutex::new(None),
            active: AtomicBool::new(true),
        })
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Relaxed)
    }

    pub fn last_event_at(&self) -> Option<DateTime<Utc>> {
        *self.last_event_at.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn deactivate(&self) {
        self.active.store(false, Ordering::Relaxed);
    }

    fn mark_delivery(&self) {
        let mut last = self.last_event_at.lock().unwrap_or_else(|e| e.into_inner());
        *last = Some(Utc::now());
    }
}

/// In-process hook invoked synchronously before subscriber fan-out.
///
/// Handlers maintain derived indexes or bridge to other components; they
/// must not publish back into the bus.
pub type TopicHandler =
    Arc<dyn Fn(&EventMessage) -> Result<(), Box<dyn std::error::Error + Send + Sync>> + Send + Sync>;

#[derive(Default)]
struct BusInner {
    topics: HashMap<EventTopic, HashMap<u64, Arc<Subscription>>>,
    clients: HashMap<u64, Arc<Subscription>>,
    senders: HashMap<u64, mpsc::Sender<EventMessage>>,
    handlers: HashMap<EventTopic, Vec<TopicHandler>>,
}

/// The gateway's event bus.
#[derive(Default)]
pub struct EventBus {
    inner: RwLock<BusInner>,
    // Stats counters live outside the lock for cheap reads.
    total_clients: AtomicUsize,
    active_subscriptions: AtomicUsize,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the delivery channel for a connected client.
    pub fn register_sender(&self, client_id: u64, sender: mpsc::Sender<EventMessage>) {
        let mut inner = self.inner.write().unwrap_or_else(|e| e.into_inner());
        if inner.senders.insert(client_id, sender).is_none() {
            self.total_clients.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Replace the client's subscription with the given topics and filters.
    ///
    /// All topics index the new subscription or none do; there is no partial
    /// state even transiently, because the swap happens under the write lock.
    pub fn subscribe(
        &self,
        client_id: u64,
        topics: &[EventTopic],
        filters: Option<Map<String, Value>>,
    ) {
        let topic_set: HashSet<EventTopic> = topics.iter().copied().collect();
        let subscription = Subscription::new(client_id, topic_set.clone(), filters);

        let mut inner = self.inner.write().unwrap_or_else(|e| e.into_inner());
        let removed = Self::detach_locked(&mut inner, client_id);

        for &topic in &topic_set {
            inner
                .topics
                .entry(topic)
                .or_default()
                .insert(client_id, Arc::clone(&subscription));
        }
        inner.clients.insert(client_id, subscription);

        self.active_subscriptions
            .fetch_add(topic_set.len(), Ordering::Relaxed);
        self.active_subscriptions.fetch_sub(removed, Ordering::Relaxed);
    }

    /// Drop the given topics from the client's subscription; an empty list
    /// drops every subscription the client owns.  Unknown client: no-op.
    pub fn unsubscribe(&self, client_id: u64, topics: &[EventTopic]) {
        let mut inner = self.inner.write().unwrap_or_else(|e| e.into_inner());
        let Some(current) = inner.clients.get(&client_id).cloned() else {
            return;
        };

        if topics.is_empty() {
            let removed = Self::detach_locked(&mut inner, client_id);
            self.active_subscriptions.fetch_sub(removed, Ordering::Relaxed);
            return;
        }

        let drop_set: HashSet<EventTopic> = topics.iter().copied().collect();
        let remaining: HashSet<EventTopic> = current
            .topics
            .difference(&drop_set)
            .copied()
            .collect();
        let removed_count = current.topics.len() - remaining.len();
        if removed_count == 0 {
            return;
        }

        let filters = current.filters.clone();
        let detached = Self::detach_locked(&mut inner, client_id);
        debug_assert_eq!(detached, current.topics.len());

        if !remaining.is_empty() {
            let replacement = Subscription::new(client_id, remaining.clone(), filters);
            for &topic in &remaining {
                inner
                    .topics
                    .entry(topic)
                    .or_default()
                    .insert(client_id, Arc::clone(&replacement));
            }
            inner.clients.insert(client_id, replacement);
        }
        self.active_subscriptions
            .fetch_sub(removed_count, Ordering::Relaxed);
    }

    /// Session-end cleanup: subscription and delivery channel both go.
    /// Idempotent; the counter delta comes from the snapshot taken under the
    /// lock, so concurrent callers cannot double-decrement.
    pub fn remove_client(&self, client_id: u64) {
        let mut inner = self.inner.write().unwrap_or_else(|e| e.into_inner());
        let removed = Self::detach_locked(&mut inner, client_id);
        self.active_subscriptions.fetch_sub(removed, Ordering::Relaxed);
        if inner.senders.remove(&client_id).is_some() {
            self.total_clients.fetch_sub(1, Ordering::Relaxed);
        }
    }

    /// Remove the client's subscription from both indexes.  Returns how many
    /// topic entries were dropped.  Caller holds the write lock.
    fn detach_locked(inner: &mut BusInner, client_id: u64) -> usize {
        let Some(subscription) = inner.clients.remove(&client_id) else {
            return 0;
        };
        subscription.deactivate();
        for topic in &subscription.topics {
            if let Some(subs) = inner.topics.get_mut(topic) {
                subs.remove(&client_id);
                // Empty subscriber sets are removed from the index.
                if subs.is_empty() {
                    inner.topics.remove(topic);
                }
            }
        }
        subscription.topics.len()
    }

    /// Register an in-process handler for a topic.
    pub fn add_handler(&self, topic: EventTopic, handler: TopicHandler) {
        let mut inner = self.inner.write().unwrap_or_else(|e| e.into_inner());
        inner.handlers.entry(topic).or_default().push(handler);
    }

    /// Publish an event: run topic handlers, then deliver to every
    /// subscriber whose filter matches.  Returns the constructed message.
    pub fn publish(&self, topic: EventTopic, mut payload: Map<String, Value>) -> EventMessage {
        let timestamp = Utc::now();
        // Every outbound payload carries an ISO-8601 UTC timestamp.
        payload.entry("timestamp".to_owned()).or_insert_with(|| {
            Value::String(timestamp.to_rfc3339_opts(chrono::SecondsFormat::Micros, true))
        });
        let message = EventMessage {
            topic,
            payload,
            event_id: Uuid::new_v4(),
            timestamp,
        };

        // Snapshot under the read lock; run handlers and fan out without it.
        let (handlers, recipients) = {
            let inner = self.inner.read().unwrap_or_else(|e| e.into_inner());
            let handlers: Vec<TopicHandler> =
                inner.handlers.get(&topic).cloned().unwrap_or_default();
            let mut recipients = Vec::new();
            if let Some(subs) = inner.topics.get(&topic) {
                for subscription in subs.values() {
                    let matched = subscription
                        .filters
                        .as_ref()
                        .is_none_or(|f| filter::matches(f, &message.payload));
                    if matched {
                        if let Some(sender) = inner.senders.get(&subscription.client_id) {
                            recipients.push((Arc::clone(subscription), sender.clone()));
                        }
                    }
                }
            }
            (handlers, recipients)
        };

        for handler in handlers {
            let outcome = catch_unwind(AssertUnwindSafe(|| handler(&message)));
            match outcome {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    error!(
                        event_id = %message.event_id,
                        topic = %topic,
                        error = %e,
                        "event handler failed"
                    );
                }
                Err(_) => {
                    error!(
                        event_id = %message.event_id,
                        topic = %topic,
                        "event handler panicked"
                    );
                }
            }
        }

        for (subscription, sender) in recipients {
            match sender.try_send(message.clone()) {
                Ok(()) => subscription.mark_delivery(),
                Err(mpsc::error::TrySendError::Full(_)) => {
                    warn!(
                        client_id = subscription.client_id,
                        topic = %topic,
                        "subscriber queue full, dropping event"
                    );
                }
                Err(mpsc::error::TrySendError::Closed(_)) => {
                    debug!(
                        client_id = subscription.client_id,
                        topic = %topic,
                        "subscriber channel closed, dropping event"
                    );
                }
            }
        }

        message
    }

    /// Current subscription of a client, if any.
    pub fn subscription_for(&self, client_id: u64) -> Option<Arc<Subscription>> {
        let inner = self.inner.read().unwrap_or_else(|e| e.into_inner());
        inner.clients.get(&client_id).cloned()
    }

    /// Number of subscribers currently indexed for a topic.
    pub fn subscriber_count(&self, topic: EventTopic) -> usize {
        let inner = self.inner.read().unwrap_or_else(|e| e.into_inner());
        inner.topics.get(&topic).map_or(0, HashMap::len)
    }

    pub fn stats(&self) -> SubscriptionStats {
        let inner = self.inner.read().unwrap_or_else(|e| e.into_inner());
        let topic_counts = inner
            .topics
            .iter()
            .map(|(topic, subs)| (topic.as_str().to_owned(), subs.len()))
            .collect();
        SubscriptionStats {
            total_clients: self.total_clients.load(Ordering::Relaxed),
            active_subscriptions: self.active_subscriptions.load(Ordering::Relaxed),
            topic_counts,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::AtomicUsize;

    fn payload(value: Value) -> Map<String, Value> {
        value.as_object().expect("test payload is an object").clone()
    }

    fn channel() -> (mpsc::Sender<EventMessage>, mpsc::Receiver<EventMessage>) {
        mpsc::channel(16)
    }

    #[test]
    fn subscribe_then_publish_delivers_to_matching_client() {
        let bus = EventBus::new();
        let (tx, mut rx) = channel();
        bus.register_sender(1, tx);
        bus.subscribe(1, &[EventTopic::CameraConnected], None);

        bus.publish(
            EventTopic::CameraConnected,
            payload(json!({"device": "camera0"})),
        );
        let delivered = rx.try_recv().expect("event should be delivered");
        assert_eq!(delivered.topic, EventTopic::CameraConnected);
        assert_eq!(delivered.payload["device"], "camera0");
        assert!(delivered.payload.contains_key("timestamp"));
    }

    #[test]
    fn filters_gate_delivery() {
        let bus = EventBus::new();
        let (tx, mut rx) = channel();
        bus.register_sender(1, tx);
        bus.subscribe(
            1,
            &[EventTopic::CameraConnected],
            Some(payload(json!({"device": "camera1"}))),
        );

        bus.publish(
            EventTopic::CameraConnected,
            payload(json!({"device": "camera0"})),
        );
        assert!(rx.try_recv().is_err(), "non-matching payload is filtered");

        bus.publish(
            EventTopic::CameraConnected,
            payload(json!({"device": "camera1"})),
        );
        assert_eq!(rx.try_recv().expect("match delivers").payload["device"], "camera1");
    }

    #[test]
    fn resubscribe_replaces_the_previous_subscription() {
        let bus = EventBus::new();
        let (tx, mut rx) = channel();
        bus.register_sender(1, tx);
        bus.subscribe(1, &[EventTopic::CameraConnected], None);
        bus.subscribe(1, &[EventTopic::RecordingStarted], None);

        assert_eq!(bus.subscriber_count(EventTopic::CameraConnected), 0);
        assert_eq!(bus.subscriber_count(EventTopic::RecordingStarted), 1);
        assert_eq!(bus.stats().active_subscriptions, 1);

        bus.publish(EventTopic::CameraConnected, Map::new());
        assert!(rx.try_recv().is_err());
        bus.publish(EventTopic::RecordingStarted, Map::new());
        assert!(rx.try_recv().is_ok());
    }

    #[test]
    fn unsubscribe_subset_keeps_the_rest() {
        let bus = EventBus::new();
        let (tx, _rx) = channel();
        bus.register_sender(1, tx);
        bus.subscribe(
            1,
            &[EventTopic::CameraConnected, EventTopic::CameraDisconnected],
            None,
        );

        bus.unsubscribe(1, &[EventTopic::CameraConnected]);
        assert_eq!(bus.subscriber_count(EventTopic::CameraConnected), 0);
        assert_eq!(bus.subscriber_count(EventTopic::CameraDisconnected), 1);
        assert_eq!(bus.stats().active_subscriptions, 1);

        // Empty topic list removes everything.
        bus.unsubscribe(1, &[]);
        assert_eq!(bus.subscriber_count(EventTopic::CameraDisconnected), 0);
        assert_eq!(bus.stats().active_subscriptions, 0);
    }

    #[test]
    fn unsubscribe_for_unknown_client_is_a_noop() {
        let bus = EventBus::new();
        bus.unsubscribe(42, &[EventTopic::CameraConnected]);
        bus.unsubscribe(42, &[]);
        assert_eq!(bus.stats().active_subscriptions, 0);
    }

    #[test]
    fn remove_client_is_idempotent_and_clears_empty_topic_sets() {
        let bus = EventBus::new();
        let (tx, _rx) = channel();
        bus.register_sender(1, tx);
        bus.subscribe(1, &[EventTopic::SystemHealth], None);
        assert_eq!(bus.stats().total_clients, 1);

        bus.remove_client(1);
        bus.remove_client(1);

        let stats = bus.stats();
        assert_eq!(stats.total_clients, 0);
        assert_eq!(stats.active_subscriptions, 0);
        assert!(stats.topic_counts.is_empty(), "no empty sets remain indexed");
    }

    #[test]
    fn by_client_and_topic_indexes_share_the_subscription() {
        let bus = EventBus::new();
        let (tx, _rx) = channel();
        bus.register_sender(1, tx);
        bus.subscribe(1, &[EventTopic::StreamStarted], None);

        let by_client = bus.subscription_for(1).expect("subscription exists");
        let inner = bus.inner.read().unwrap();
        let by_topic = inner.topics[&EventTopic::StreamStarted][&1].clone();
        assert!(Arc::ptr_eq(&by_client, &by_topic));
        assert!(by_client.is_active());
    }

    #[test]
    fn handler_error_and_panic_do_not_block_delivery() {
        let bus = EventBus::new();
        let calls = Arc::new(AtomicUsize::new(0));

        bus.add_handler(
            EventTopic::CameraConnected,
            Arc::new(|_| panic!("handler bug")),
        );
        bus.add_handler(
            EventTopic::CameraConnected,
            Arc::new(|_| Err("derived index stale".into())),
        );
        let seen = Arc::clone(&calls);
        bus.add_handler(
            EventTopic::CameraConnected,
            Arc::new(move |_| {
                seen.fetch_add(1, Ordering::Relaxed);
                Ok(())
            }),
        );

        let (tx, mut rx) = channel();
        bus.register_sender(1, tx);
        bus.subscribe(1, &[EventTopic::CameraConnected], None);

        bus.publish(EventTopic::CameraConnected, Map::new());
        assert_eq!(calls.load(Ordering::Relaxed), 1, "later handler still ran");
        assert!(rx.try_recv().is_ok(), "subscriber delivery still happened");
    }

    #[test]
    fn publish_without_subscribers_changes_nothing() {
        let bus = EventBus::new();
        let before = bus.stats();
        bus.publish(EventTopic::SystemHealth, Map::new());
        let after = bus.stats();
        assert_eq!(before, after);
    }

    #[test]
    fn full_subscriber_queue_drops_the_delivery() {
        let bus = EventBus::new();
        let (tx, mut rx) = mpsc::channel(1);
        bus.register_sender(1, tx);
        bus.subscribe(1, &[EventTopic::SystemHealth], None);

        bus.publish(EventTopic::SystemHealth, Map::new());
        bus.publish(EventTopic::SystemHealth, Map::new());

        assert!(rx.try_recv().is_ok());
        assert!(rx.try_recv().is_err(), "second delivery was dropped");
    }

    #[test]
    fn explicit_timestamp_in_payload_is_preserved() {
        let bus = EventBus::new();
        let message = bus.publish(
            EventTopic::SystemHealth,
            payload(json!({"timestamp": "2026-01-01T00:00:00Z"})),
        );
        assert_eq!(message.payload["timestamp"], "2026-01-01T00:00:00Z");
    }
}
