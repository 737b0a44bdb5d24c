//! In-process notification hub for the live-update feed.
//!
//! The hub owns the registry of connected subscribers. Each subscriber is
//! represented by the sending half of its bounded outbound queue; the
//! connection's writer task holds the receiving half. The registry keeps the
//! only sender, so removing an entry closes the queue and lets the writer
//! finish.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use stockroom_types::{ClientIntent, Event, InboundFrame};
use thiserror::Error;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, watch, RwLock};
use uuid::Uuid;

/// Opaque handle minted for each registered connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriberId(Uuid);

impl SubscriberId {
    fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl std::fmt::Display for SubscriberId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

/// Tunables for the hub and the connections it serves.
#[derive(Debug, Clone)]
pub struct HubSettings {
    /// Depth of each subscriber's outbound queue.
    pub queue_capacity: usize,
    /// Upper bound on a single socket write.
    pub write_timeout: Duration,
    /// Whether client `create`/`update`/`delete` frames are re-broadcast.
    pub relay_client_events: bool,
}

impl Default for HubSettings {
    fn default() -> Self {
        Self {
            queue_capacity: 256,
            write_timeout: Duration::from_secs(10),
            relay_client_events: true,
        }
    }
}

#[derive(Debug, Error)]
pub enum HubError {
    /// The hub has been shut down and accepts no new subscribers.
    #[error("notification hub is shut down")]
    Closed,
}

type Registry = HashMap<SubscriberId, mpsc::Sender<String>>;

struct HubInner {
    subscribers: RwLock<Registry>,
    settings: HubSettings,
    shutdown: watch::Sender<bool>,
}

/// Registry and fan-out point for live-update subscribers.
///
/// Cloning is cheap; clones share one registry.
#[derive(Clone)]
pub struct Hub {
    inner: Arc<HubInner>,
}

impl Default for Hub {
    fn default() -> Self {
        Self::new(HubSettings::default())
    }
}

impl Hub {
    pub fn new(settings: HubSettings) -> Self {
        let (shutdown, _) = watch::channel(false);
        Self {
            inner: Arc::new(HubInner {
                subscribers: RwLock::new(HashMap::new()),
                settings,
                shutdown,
            }),
        }
    }

    pub fn settings(&self) -> &HubSettings {
        &self.inner.settings
    }

    /// Creates an outbound queue sized by [`HubSettings::queue_capacity`].
    pub fn outbound_queue(&self) -> (mpsc::Sender<String>, mpsc::Receiver<String>) {
        mpsc::channel(self.inner.settings.queue_capacity.max(1))
    }

    /// Adds a subscriber. It is visible to every broadcast that starts after
    /// this call returns.
    ///
    /// # Errors
    ///
    /// Returns `HubError::Closed` once [`Hub::shutdown`] has run; the queue is
    /// dropped in that case.
    pub async fn register(&self, queue: mpsc::Sender<String>) -> Result<SubscriberId, HubError> {
        let mut subscribers = self.inner.subscribers.write().await;
        // Checked under the write lock so a concurrent shutdown either sees
        // this entry when it clears the registry or we see its flag.
        if *self.inner.shutdown.borrow() {
            return Err(HubError::Closed);
        }
        let id = SubscriberId::new();
        subscribers.insert(id, queue);
        tracing::debug!(subscriber = %id, total = subscribers.len(), "subscriber registered");
        Ok(id)
    }

    /// Removes a subscriber. Returns `false` if it was not registered.
    pub async fn deregister(&self, id: SubscriberId) -> bool {
        let removed = self.inner.subscribers.write().await.remove(&id).is_some();
        if removed {
            tracing::debug!(subscriber = %id, "subscriber deregistered");
        }
        removed
    }

    /// Enqueues `event` for every registered subscriber and returns how many
    /// accepted it.
    ///
    /// Never blocks on a slow consumer. A subscriber whose queue is full or
    /// closed is removed once the pass completes.
    pub async fn broadcast(&self, event: &Event) -> usize {
        let text = match event.to_json() {
            Ok(text) => text,
            Err(e) => {
                tracing::error!(kind = %event.kind, id = event.data.id, "failed to encode event: {}", e);
                return 0;
            }
        };

        let (delivered, failed) = {
            let subscribers = self.inner.subscribers.read().await;
            let mut delivered = 0;
            let mut failed = Vec::new();
            for (id, queue) in subscribers.iter() {
                match queue.try_send(text.clone()) {
                    Ok(()) => delivered += 1,
                    Err(TrySendError::Full(_)) => {
                        tracing::warn!(subscriber = %id, "outbound queue full, dropping slow subscriber");
                        failed.push(*id);
                    }
                    Err(TrySendError::Closed(_)) => {
                        tracing::debug!(subscriber = %id, "outbound queue closed");
                        failed.push(*id);
                    }
                }
            }
            (delivered, failed)
        };

        if !failed.is_empty() {
            let mut subscribers = self.inner.subscribers.write().await;
            for id in &failed {
                subscribers.remove(id);
            }
        }

        tracing::debug!(
            kind = %event.kind,
            id = event.data.id,
            delivered,
            dropped = failed.len(),
            "event broadcast"
        );
        delivered
    }

    /// Re-broadcasts a client-originated change to every subscriber,
    /// including `origin`.
    ///
    /// `create`, `update` and `delete` become `product_created`,
    /// `product_updated` and `product_deleted`. Other tags, and every tag when
    /// relaying is disabled, are logged and dropped. Returns the delivered
    /// count.
    pub async fn relay(&self, origin: SubscriberId, frame: InboundFrame) -> usize {
        let Some(intent) = ClientIntent::parse(&frame.kind) else {
            tracing::info!(subscriber = %origin, tag = %frame.kind, "dropping unrecognized client event");
            return 0;
        };
        if !self.inner.settings.relay_client_events {
            tracing::info!(subscriber = %origin, tag = %frame.kind, "client event relay disabled, dropping");
            return 0;
        }

        tracing::info!(
            subscriber = %origin,
            tag = %frame.kind,
            id = frame.data.id,
            "relaying client event"
        );
        let event = Event {
            kind: intent.confirmed_kind(),
            data: frame.data,
        };
        self.broadcast(&event).await
    }

    /// Closes the hub: rejects further registrations, tells every connection
    /// to wind down, and empties the registry.
    pub async fn shutdown(&self) {
        self.inner.shutdown.send_replace(true);
        let mut subscribers = self.inner.subscribers.write().await;
        let count = subscribers.len();
        subscribers.clear();
        tracing::info!(subscribers = count, "notification hub shut down");
    }

    pub fn is_shut_down(&self) -> bool {
        *self.inner.shutdown.borrow()
    }

    /// Receiver that changes once, when the hub shuts down.
    pub fn shutdown_signal(&self) -> watch::Receiver<bool> {
        self.inner.shutdown.subscribe()
    }

    pub async fn len(&self) -> usize {
        self.inner.subscribers.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.inner.subscribers.read().await.is_empty()
    }

    pub async fn contains(&self, id: SubscriberId) -> bool {
        self.inner.subscribers.read().await.contains_key(&id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use stockroom_types::{EventKind, EventPayload};

    fn frame(tag: &str, id: i64, name: &str) -> InboundFrame {
        InboundFrame {
            kind: tag.to_string(),
            data: EventPayload {
                id,
                name: name.to_string(),
            },
        }
    }

    #[tokio::test]
    async fn broadcast_reaches_registered_subscribers_in_order() {
        let hub = Hub::default();
        let (tx_a, mut rx_a) = hub.outbound_queue();
        let (tx_b, mut rx_b) = hub.outbound_queue();
        hub.register(tx_a).await.unwrap();
        hub.register(tx_b).await.unwrap();

        for id in 1..=3 {
            let delivered = hub
                .broadcast(&Event::new(EventKind::ProductCreated, id, "X"))
                .await;
            assert_eq!(delivered, 2);
        }

        for rx in [&mut rx_a, &mut rx_b] {
            for id in 1..=3 {
                let text = rx.recv().await.unwrap();
                let event: Event = serde_json::from_str(&text).unwrap();
                assert_eq!(event.data.id, id);
            }
        }
    }

    #[tokio::test]
    async fn late_subscriber_misses_earlier_broadcast() {
        let hub = Hub::default();
        hub.broadcast(&Event::new(EventKind::ProductDeleted, 1, "gone"))
            .await;

        let (tx, mut rx) = hub.outbound_queue();
        hub.register(tx).await.unwrap();
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn full_queue_removes_subscriber() {
        let hub = Hub::default();
        let (tx, _rx) = mpsc::channel(1);
        let id = hub.register(tx).await.unwrap();

        let event = Event::new(EventKind::ProductUpdated, 4, "Bolt");
        assert_eq!(hub.broadcast(&event).await, 1);
        assert_eq!(hub.broadcast(&event).await, 0);
        assert!(!hub.contains(id).await);
        assert_eq!(hub.broadcast(&event).await, 0);
    }

    #[tokio::test]
    async fn closed_queue_removes_subscriber() {
        let hub = Hub::default();
        let (tx, rx) = hub.outbound_queue();
        let id = hub.register(tx).await.unwrap();
        drop(rx);

        assert_eq!(
            hub.broadcast(&Event::new(EventKind::ProductCreated, 1, "X"))
                .await,
            0
        );
        assert!(!hub.contains(id).await);
        assert!(!hub.deregister(id).await);
    }

    #[tokio::test]
    async fn deregister_closes_the_queue() {
        let hub = Hub::default();
        let (tx, mut rx) = hub.outbound_queue();
        let id = hub.register(tx).await.unwrap();

        assert!(hub.deregister(id).await);
        assert!(!hub.deregister(id).await);
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn relay_maps_client_tags() {
        let hub = Hub::default();
        let (tx, mut rx) = hub.outbound_queue();
        let origin = hub.register(tx).await.unwrap();

        for (tag, expected) in [
            ("create", EventKind::ProductCreated),
            ("update", EventKind::ProductUpdated),
            ("delete", EventKind::ProductDeleted),
        ] {
            assert_eq!(hub.relay(origin, frame(tag, 7, "Nut")).await, 1);
            let event: Event = serde_json::from_str(&rx.recv().await.unwrap()).unwrap();
            assert_eq!(event, Event::new(expected, 7, "Nut"));
        }

        assert_eq!(hub.relay(origin, frame("subscribe", 7, "Nut")).await, 0);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn relay_can_be_disabled() {
        let hub = Hub::new(HubSettings {
            relay_client_events: false,
            ..HubSettings::default()
        });
        let (tx, mut rx) = hub.outbound_queue();
        let origin = hub.register(tx).await.unwrap();

        assert_eq!(hub.relay(origin, frame("create", 1, "A")).await, 0);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn shutdown_clears_and_rejects_registration() {
        let hub = Hub::default();
        let mut signal = hub.shutdown_signal();
        let (tx, mut rx) = hub.outbound_queue();
        hub.register(tx).await.unwrap();

        hub.shutdown().await;
        assert!(hub.is_shut_down());
        assert!(hub.is_empty().await);
        assert!(rx.recv().await.is_none());
        signal.changed().await.unwrap();
        assert!(*signal.borrow());

        let (tx, _rx) = hub.outbound_queue();
        assert!(matches!(hub.register(tx).await, Err(HubError::Closed)));
    }
}
