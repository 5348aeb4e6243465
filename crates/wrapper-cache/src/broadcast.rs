//! Bounded fan-out of cache events to watch subscribers.
//!
//! The broadcast system provides:
//! - Unique subscription identifiers ([`SubscriptionId`])
//! - Subscriptions ([`Subscription`]) that receive events over a bounded queue
//! - A per-kind [`Broadcaster`] that delivers events without ever blocking
//!
//! Delivery never waits on a slow consumer. When a subscriber's queue is full
//! the event is dropped for that subscriber only and counted.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use metrics::counter;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tracing::{debug, trace};
use wrapper_core::EventType;

/// A single change notification.
#[derive(Clone, Debug, PartialEq)]
pub struct Event<T> {
    /// What happened to the object.
    pub kind: EventType,
    /// The object after the change (or its last state, for deletions).
    pub object: T,
}

impl<T> Event<T> {
    /// Create a new event.
    pub fn new(kind: EventType, object: T) -> Self {
        Self { kind, object }
    }

    /// Shorthand for an [`EventType::Added`] event.
    pub fn added(object: T) -> Self {
        Self::new(EventType::Added, object)
    }

    /// Shorthand for an [`EventType::Modified`] event.
    pub fn modified(object: T) -> Self {
        Self::new(EventType::Modified, object)
    }

    /// Shorthand for an [`EventType::Deleted`] event.
    pub fn deleted(object: T) -> Self {
        Self::new(EventType::Deleted, object)
    }
}

/// Unique identifier for a subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(u64);

impl SubscriptionId {
    fn next() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(1);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// Numeric value of this ID.
    #[inline]
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sub-{}", self.0)
    }
}

/// Delivery counters for one broadcaster.
#[derive(Debug, Default)]
pub struct BroadcastStats {
    delivered: AtomicU64,
    dropped: AtomicU64,
}

impl BroadcastStats {
    /// Events enqueued to a subscriber.
    #[inline]
    pub fn delivered(&self) -> u64 {
        self.delivered.load(Ordering::Relaxed)
    }

    /// Events discarded because a subscriber's queue was full.
    #[inline]
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

struct Registry<T> {
    name: &'static str,
    queue_length: usize,
    state: Mutex<RegistryState<T>>,
    stats: BroadcastStats,
}

struct RegistryState<T> {
    senders: HashMap<SubscriptionId, mpsc::Sender<Event<T>>>,
    shut_down: bool,
}

impl<T> Registry<T> {
    fn remove(&self, id: SubscriptionId) {
        if self.state.lock().senders.remove(&id).is_some() {
            debug!(broadcaster = self.name, subscription = %id, "subscription removed");
        }
    }
}

/// Receiving end of a watch.
///
/// Dropping the subscription (or calling [`Subscription::stop`]) deregisters
/// it from its broadcaster.
pub struct Subscription<T> {
    id: SubscriptionId,
    receiver: mpsc::Receiver<Event<T>>,
    registry: Weak<Registry<T>>,
}

impl<T> Subscription<T> {
    /// Identifier of this subscription.
    #[inline]
    pub fn id(&self) -> SubscriptionId {
        self.id
    }

    /// Receive the next event.
    ///
    /// Returns `None` once the subscription was stopped or the broadcaster
    /// shut down, after all queued events have been drained.
    pub async fn recv(&mut self) -> Option<Event<T>> {
        self.receiver.recv().await
    }

    /// Receive an event without waiting.
    pub fn try_recv(&mut self) -> Result<Event<T>, mpsc::error::TryRecvError> {
        self.receiver.try_recv()
    }

    /// Deregister from the broadcaster. Events already queued stay readable.
    pub fn stop(&mut self) {
        if let Some(registry) = self.registry.upgrade() {
            registry.remove(self.id);
        }
        self.registry = Weak::new();
        self.receiver.close();
    }
}

impl<T> Drop for Subscription<T> {
    fn drop(&mut self) {
        if let Some(registry) = self.registry.upgrade() {
            registry.remove(self.id);
        }
    }
}

impl<T> fmt::Debug for Subscription<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription").field("id", &self.id).finish()
    }
}

/// Non-blocking event fan-out for one resource kind.
pub struct Broadcaster<T> {
    registry: Arc<Registry<T>>,
}

impl<T> Clone for Broadcaster<T> {
    fn clone(&self) -> Self {
        Self {
            registry: Arc::clone(&self.registry),
        }
    }
}

impl<T> fmt::Debug for Broadcaster<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Broadcaster")
            .field("name", &self.registry.name)
            .field("queue_length", &self.registry.queue_length)
            .field("subscribers", &self.subscriber_count())
            .finish()
    }
}

impl<T> Broadcaster<T> {
    /// Name used in logs and metric labels.
    pub fn name(&self) -> &'static str {
        self.registry.name
    }

    /// Number of registered subscriptions.
    pub fn subscriber_count(&self) -> usize {
        self.registry.state.lock().senders.len()
    }

    /// Delivery counters.
    pub fn stats(&self) -> &BroadcastStats {
        &self.registry.stats
    }

    #[cfg(test)]
    fn is_shut_down(&self) -> bool {
        self.registry.state.lock().shut_down
    }
}

impl<T: Clone + Send + 'static> Broadcaster<T> {
    /// Create a broadcaster whose subscribers each buffer up to
    /// `queue_length` events.
    pub fn new(name: &'static str, queue_length: usize) -> Self {
        Self {
            registry: Arc::new(Registry {
                name,
                queue_length: queue_length.max(1),
                state: Mutex::new(RegistryState {
                    senders: HashMap::new(),
                    shut_down: false,
                }),
                stats: BroadcastStats::default(),
            }),
        }
    }

    /// Subscribe to future events.
    pub fn watch(&self) -> Subscription<T> {
        self.subscribe(Vec::new())
    }

    /// Subscribe with `initial` events queued ahead of any live event.
    ///
    /// The queue is sized so the whole prefix fits and the live feed still
    /// gets its usual headroom.
    pub fn watch_with_prefix(&self, initial: Vec<Event<T>>) -> Subscription<T> {
        self.subscribe(initial)
    }

    fn subscribe(&self, initial: Vec<Event<T>>) -> Subscription<T> {
        let id = SubscriptionId::next();
        let (sender, receiver) = mpsc::channel(initial.len() + self.registry.queue_length);

        let mut state = self.registry.state.lock();
        for event in initial {
            // Capacity covers the prefix, so this cannot fail.
            let _ = sender.try_send(event);
        }
        if state.shut_down {
            // Sender dropped here: the subscriber reads the prefix, then ends.
            return Subscription {
                id,
                receiver,
                registry: Weak::new(),
            };
        }
        state.senders.insert(id, sender);
        drop(state);

        debug!(broadcaster = self.registry.name, subscription = %id, "subscription added");

        Subscription {
            id,
            receiver,
            registry: Arc::downgrade(&self.registry),
        }
    }

    /// Deliver an event to every subscriber without blocking.
    ///
    /// Subscribers whose queue is full miss this event. Closed subscribers are
    /// removed. Returns the number of subscribers the event was enqueued to.
    pub fn action_or_drop(&self, kind: EventType, object: T) -> usize {
        let registry = &self.registry;
        let mut state = registry.state.lock();
        if state.senders.is_empty() {
            return 0;
        }

        let mut delivered = 0;
        let mut dropped = 0;
        let mut closed = Vec::new();

        for (id, sender) in state.senders.iter() {
            match sender.try_send(Event::new(kind, object.clone())) {
                Ok(()) => delivered += 1,
                Err(mpsc::error::TrySendError::Full(_)) => {
                    trace!(broadcaster = registry.name, subscription = %id, "queue full, dropping event");
                    dropped += 1;
                }
                Err(mpsc::error::TrySendError::Closed(_)) => closed.push(*id),
            }
        }

        for id in &closed {
            state.senders.remove(id);
        }
        drop(state);

        registry
            .stats
            .delivered
            .fetch_add(delivered as u64, Ordering::Relaxed);
        if dropped > 0 {
            registry
                .stats
                .dropped
                .fetch_add(dropped as u64, Ordering::Relaxed);
            counter!("wrapper_watch_events_dropped_total", "kind" => registry.name)
                .increment(dropped as u64);
        }
        if !closed.is_empty() {
            debug!(broadcaster = registry.name, count = closed.len(), "removed closed subscriptions");
        }

        delivered
    }

    /// Close every subscription and refuse new ones.
    ///
    /// Subscribers still drain what was already queued.
    pub fn shutdown(&self) {
        let mut state = self.registry.state.lock();
        state.shut_down = true;
        let count = state.senders.len();
        state.senders.clear();
        drop(state);
        debug!(broadcaster = self.registry.name, count, "broadcaster shut down");
    }

}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subscription_id_unique() {
        assert_ne!(SubscriptionId::next(), SubscriptionId::next());
    }

    #[tokio::test]
    async fn broadcast_reaches_every_subscriber() {
        let tx = Broadcaster::new("test", 4);
        let mut a = tx.watch();
        let mut b = tx.watch();

        assert_eq!(tx.action_or_drop(EventType::Added, 1u32), 2);

        assert_eq!(a.recv().await, Some(Event::added(1)));
        assert_eq!(b.recv().await, Some(Event::added(1)));
    }

    #[tokio::test]
    async fn full_queue_drops_for_that_subscriber_only() {
        let tx = Broadcaster::new("test", 2);
        let mut slow = tx.watch();
        let mut fast = tx.watch();

        for i in 0..2u32 {
            tx.action_or_drop(EventType::Modified, i);
            assert_eq!(fast.recv().await.map(|e| e.object), Some(i));
        }

        // slow holds two unread events; the third is dropped for it alone.
        assert_eq!(tx.action_or_drop(EventType::Modified, 2), 1);
        assert_eq!(fast.recv().await.map(|e| e.object), Some(2));
        assert_eq!(tx.stats().dropped(), 1);

        assert_eq!(slow.try_recv().map(|e| e.object), Ok(0));
        assert_eq!(slow.try_recv().map(|e| e.object), Ok(1));
        assert!(slow.try_recv().is_err());
    }

    #[tokio::test]
    async fn prefix_precedes_live_events() {
        let tx = Broadcaster::new("test", 1);
        let initial = (0..5u32).map(Event::added).collect();
        let mut sub = tx.watch_with_prefix(initial);

        tx.action_or_drop(EventType::Modified, 9);

        for i in 0..5 {
            assert_eq!(sub.recv().await, Some(Event::added(i)));
        }
        assert_eq!(sub.recv().await, Some(Event::modified(9)));
    }

    #[tokio::test]
    async fn drop_deregisters() {
        let tx = Broadcaster::<u32>::new("test", 4);
        let sub = tx.watch();
        assert_eq!(tx.subscriber_count(), 1);
        drop(sub);
        assert_eq!(tx.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn stop_keeps_queued_events() {
        let tx = Broadcaster::new("test", 4);
        let mut sub = tx.watch();
        tx.action_or_drop(EventType::Added, 7u32);

        sub.stop();
        assert_eq!(tx.subscriber_count(), 0);
        assert_eq!(tx.action_or_drop(EventType::Added, 8), 0);

        assert_eq!(sub.recv().await, Some(Event::added(7)));
        assert_eq!(sub.recv().await, None);
    }

    #[tokio::test]
    async fn shutdown_ends_subscriptions() {
        let tx = Broadcaster::new("test", 4);
        let mut sub = tx.watch();
        tx.action_or_drop(EventType::Added, 1u32);
        tx.shutdown();

        assert_eq!(sub.recv().await, Some(Event::added(1)));
        assert_eq!(sub.recv().await, None);

        let mut late = tx.watch_with_prefix(vec![Event::added(2)]);
        assert_eq!(late.recv().await, Some(Event::added(2)));
        assert_eq!(late.recv().await, None);
        assert!(tx.is_shut_down());
    }

    #[test]
    fn debug_reports_subscribers() {
        let tx = Broadcaster::new("nodes", 4);
        let _sub = tx.watch();
        tx.action_or_drop(EventType::Added, 1u32);

        let rendered = format!("{tx:?}");
        assert!(rendered.contains("name: \"nodes\""));
        assert!(rendered.contains("subscribers: 1"));
    }
}
