//! Event Broker
//!
//! Fans events out from producers to every connected session.
//!
//! # Architecture
//!
//! The broker owns one bounded `mpsc` queue per subscriber, keyed by a
//! `SubscriberId`. The map sits behind a single `RwLock`:
//!
//! - `publish` takes the read lock, so producers publish concurrently
//! - `subscribe` / `unsubscribe` take the write lock
//!
//! Delivery uses `try_send`. A subscriber whose queue is full (or already
//! closed) misses that event; nobody waits for it.
//!
//! ```text
//!  temp  ──┐                       ┌──► [queue S1] ──► session 1
//!  clock ──┤     ┌─────────────┐   │
//!  volt  ──┼────►│ EventBroker │───┼──► [queue S2] ──► session 2
//!  mem   ──┤     └─────────────┘   │
//!  obs.  ──┘                       └──► [queue SN] ──► session N
//! ```

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::RwLock;
use tokio::sync::{mpsc, watch};
use uuid::Uuid;

use crate::BrokerSettings;
use crate::domain::event::Event;
use crate::infrastructure::metrics;

// =============================================================================
// Subscriber Identity
// =============================================================================

/// Unique identifier of a registered subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriberId(Uuid);

impl SubscriberId {
    fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for SubscriberId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Receiving side of a subscription.
///
/// Returned by [`EventBroker::subscribe`]. The caller must pass `id()` back to
/// [`EventBroker::unsubscribe`] exactly once; [`Subscription`] does this
/// automatically.
#[derive(Debug)]
pub struct SubscriberHandle {
    id: SubscriberId,
    receiver: mpsc::Receiver<Arc<Event>>,
}

impl SubscriberHandle {
    /// Identifier used to unsubscribe.
    #[must_use]
    pub const fn id(&self) -> SubscriberId {
        self.id
    }

    /// Wait for the next delivered event.
    ///
    /// Returns `None` once the subscriber has been removed from the broker
    /// and all queued events are drained.
    pub async fn recv(&mut self) -> Option<Arc<Event>> {
        self.receiver.recv().await
    }

    /// Take a delivered event without waiting.
    pub fn try_recv(&mut self) -> Option<Arc<Event>> {
        self.receiver.try_recv().ok()
    }
}

// =============================================================================
// Broker
// =============================================================================

/// Configuration for the event broker.
#[derive(Debug, Clone, Copy)]
pub struct BrokerConfig {
    /// Per-subscriber queue capacity.
    pub subscriber_capacity: usize,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            subscriber_capacity: 16,
        }
    }
}

impl From<BrokerSettings> for BrokerConfig {
    fn from(settings: BrokerSettings) -> Self {
        Self {
            subscriber_capacity: settings.subscriber_capacity,
        }
    }
}

/// Outcome of a single publish.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PublishReport {
    /// Subscribers that accepted the event.
    pub delivered: usize,
    /// Subscribers that missed the event.
    pub dropped: usize,
}

/// Central fan-out point between producers and sessions.
///
/// # Example
///
/// ```rust
/// use pi_monitor::domain::event::Event;
/// use pi_monitor::domain::metric::MetricKind;
/// use pi_monitor::infrastructure::broker::EventBroker;
///
/// let broker = EventBroker::with_defaults();
/// let mut handle = broker.subscribe();
///
/// let report = broker.publish(Event::new(MetricKind::Temp, "42.8 °C"));
/// assert_eq!(report.delivered, 1);
/// assert_eq!(handle.try_recv().unwrap().payload(), "42.8 °C");
///
/// broker.unsubscribe(handle.id()).unwrap();
/// assert_eq!(broker.subscriber_count(), 0);
/// ```
#[derive(Debug)]
pub struct EventBroker {
    subscribers: RwLock<HashMap<SubscriberId, mpsc::Sender<Arc<Event>>>>,
    capacity: usize,
    count_tx: watch::Sender<usize>,
    published: AtomicU64,
    delivered: AtomicU64,
    dropped: AtomicU64,
}

impl EventBroker {
    /// Create a new broker with the given configuration.
    #[must_use]
    pub fn new(config: BrokerConfig) -> Self {
        Self {
            subscribers: RwLock::new(HashMap::new()),
            capacity: config.subscriber_capacity.max(1),
            count_tx: watch::channel(0).0,
            published: AtomicU64::new(0),
            delivered: AtomicU64::new(0),
            dropped: AtomicU64::new(0),
        }
    }

    /// Create a new broker with default configuration.
    #[must_use]
    pub fn with_defaults() -> Self {
        Self::new(BrokerConfig::default())
    }

    /// Register a new subscriber.
    pub fn subscribe(&self) -> SubscriberHandle {
        let id = SubscriberId::new();
        let (tx, receiver) = mpsc::channel(self.capacity);

        let count = {
            let mut subscribers = self.subscribers.write();
            subscribers.insert(id, tx);
            subscribers.len()
        };
        self.count_tx.send_replace(count);

        tracing::debug!(subscriber = %id, subscribers = count, "Subscriber registered");
        SubscriberHandle { id, receiver }
    }

    /// Register a new subscriber that unsubscribes itself when dropped.
    pub fn subscribe_owned(self: &Arc<Self>) -> Subscription {
        Subscription {
            handle: self.subscribe(),
            broker: Arc::clone(self),
        }
    }

    /// Remove a subscriber and close its queue.
    ///
    /// # Errors
    ///
    /// Returns `BrokerError::NotSubscribed` if the subscriber is not
    /// registered, which means it was already removed.
    pub fn unsubscribe(&self, id: SubscriberId) -> Result<(), BrokerError> {
        let count = {
            let mut subscribers = self.subscribers.write();
            if subscribers.remove(&id).is_none() {
                drop(subscribers);
                tracing::error!(subscriber = %id, "Unsubscribe of unregistered subscriber");
                return Err(BrokerError::NotSubscribed(id));
            }
            subscribers.len()
        };
        self.count_tx.send_replace(count);

        tracing::debug!(subscriber = %id, subscribers = count, "Subscriber removed");
        Ok(())
    }

    /// Deliver an event to every currently registered subscriber.
    ///
    /// Never waits: a subscriber that cannot take the event right away
    /// misses it.
    pub fn publish(&self, event: Event) -> PublishReport {
        let kind = event.kind();
        let event = Arc::new(event);
        let mut report = PublishReport::default();

        {
            let subscribers = self.subscribers.read();
            for (id, tx) in subscribers.iter() {
                match tx.try_send(Arc::clone(&event)) {
                    Ok(()) => report.delivered += 1,
                    Err(mpsc::error::TrySendError::Full(_)) => {
                        report.dropped += 1;
                        tracing::debug!(subscriber = %id, %kind, "Subscriber not ready, event dropped");
                    }
                    Err(mpsc::error::TrySendError::Closed(_)) => {
                        report.dropped += 1;
                        tracing::debug!(subscriber = %id, %kind, "Subscriber closed, event dropped");
                    }
                }
            }
        }

        self.published.fetch_add(1, Ordering::Relaxed);
        self.delivered
            .fetch_add(report.delivered as u64, Ordering::Relaxed);
        self.dropped.fetch_add(report.dropped as u64, Ordering::Relaxed);
        metrics::record_event_published(kind, &report);

        report
    }

    /// Number of registered subscribers.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.read().len()
    }

    /// Watch the subscriber count; updated on every subscribe/unsubscribe.
    #[must_use]
    pub fn watch_subscriber_count(&self) -> watch::Receiver<usize> {
        self.count_tx.subscribe()
    }

    /// Snapshot of broker counters.
    #[must_use]
    pub fn stats(&self) -> BrokerStats {
        BrokerStats {
            subscribers: self.subscriber_count(),
            published: self.published.load(Ordering::Relaxed),
            delivered: self.delivered.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
        }
    }
}

/// Shared broker reference.
pub type SharedBroker = Arc<EventBroker>;

/// Counters describing broker activity since startup.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
pub struct BrokerStats {
    /// Currently registered subscribers.
    pub subscribers: usize,
    /// Events published.
    pub published: u64,
    /// Individual deliveries that succeeded.
    pub delivered: u64,
    /// Individual deliveries that were dropped.
    pub dropped: u64,
}

// =============================================================================
// Subscription Guard
// =============================================================================

/// A subscriber registration tied to a scope.
///
/// Dropping the guard unsubscribes, so every exit path of a session
/// (disconnect, error, shutdown) releases its registration exactly once.
#[derive(Debug)]
pub struct Subscription {
    handle: SubscriberHandle,
    broker: SharedBroker,
}

impl Subscription {
    /// Identifier of the underlying subscriber.
    #[must_use]
    pub const fn id(&self) -> SubscriberId {
        self.handle.id()
    }

    /// Wait for the next delivered event.
    pub async fn recv(&mut self) -> Option<Arc<Event>> {
        self.handle.recv().await
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Err(e) = self.broker.unsubscribe(self.handle.id())
            && !std::thread::panicking()
        {
            panic!("subscription lifecycle violated: {e}");
        }
    }
}

// =============================================================================
// Errors
// =============================================================================

/// Broker misuse.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BrokerError {
    /// The subscriber is not registered (double unsubscribe).
    #[error("subscriber {0} is not registered")]
    NotSubscribed(SubscriberId),
}

// =============================================================================
// Tests
// =============================================================================
