//! Session-keyed event broadcast hub.

use crate::event::HubEvent;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;

/// Wildcard key: subscribers under the empty session receive every event.
const GLOBAL_KEY: &str = "";

/// Default per-subscriber channel capacity.
const DEFAULT_CAPACITY: usize = 8;

struct HubInner {
    next_id: u64,
    subscribers: HashMap<String, Vec<(u64, mpsc::Sender<HubEvent>)>>,
}

/// Concurrent pub/sub bus for lifecycle events, keyed by session ID.
///
/// Publishing delivers to every subscriber of the exact session and, when
/// the session is non-empty, to every global subscriber. Delivery uses a
/// non-blocking send; a full subscriber channel silently drops the event.
pub struct EventHub {
    inner: Arc<Mutex<HubInner>>,
    capacity: usize,
}

impl EventHub {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    /// Create a hub with a custom per-subscriber channel capacity.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            inner: Arc::new(Mutex::new(HubInner {
                next_id: 0,
                subscribers: HashMap::new(),
            })),
            capacity: capacity.max(1),
        }
    }

    /// Subscribe to events for a session. The empty session subscribes to
    /// every event.
    ///
    /// Returns the receive channel and a cancellation handle. Dropping the
    /// handle also cancels; cancelling twice is a no-op.
    pub fn subscribe(&self, session_id: &str) -> (mpsc::Receiver<HubEvent>, EventSubscription) {
        let (tx, rx) = mpsc::channel(self.capacity);
        let mut inner = lock(&self.inner);
        let id = inner.next_id;
        inner.next_id += 1;
        inner
            .subscribers
            .entry(session_id.to_string())
            .or_default()
            .push((id, tx));
        tracing::debug!(session = %session_id, subscriber = id, "event subscriber added");
        (
            rx,
            EventSubscription {
                inner: Arc::clone(&self.inner),
                session_id: session_id.to_string(),
                id,
            },
        )
    }

    /// Publish an event to the given session's subscribers plus the global
    /// subscribers. Never blocks; returns how many subscribers received it.
    pub fn publish(&self, event: &HubEvent, session_id: &str) -> usize {
        let mut inner = lock(&self.inner);
        let mut delivered = 0;
        delivered += deliver(&mut inner.subscribers, session_id, event);
        if session_id != GLOBAL_KEY {
            delivered += deliver(&mut inner.subscribers, GLOBAL_KEY, event);
        }
        delivered
    }

    /// Number of live subscribers across all sessions.
    pub fn subscriber_count(&self) -> usize {
        let inner = lock(&self.inner);
        inner.subscribers.values().map(Vec::len).sum()
    }
}

impl Default for EventHub {
    fn default() -> Self {
        Self::new()
    }
}

/// Cancellation handle for an [`EventHub`] subscription.
pub struct EventSubscription {
    inner: Arc<Mutex<HubInner>>,
    session_id: String,
    id: u64,
}

impl EventSubscription {
    /// Remove the subscription and close its channel. Idempotent.
    pub fn cancel(&self) {
        let mut inner = lock(&self.inner);
        remove_subscriber(&mut inner.subscribers, &self.session_id, self.id);
    }
}

impl Drop for EventSubscription {
    fn drop(&mut self) {
        self.cancel();
    }
}

fn lock(inner: &Arc<Mutex<HubInner>>) -> std::sync::MutexGuard<'_, HubInner> {
    inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn deliver(
    subscribers: &mut HashMap<String, Vec<(u64, mpsc::Sender<HubEvent>)>>,
    key: &str,
    event: &HubEvent,
) -> usize {
    let Some(entries) = subscribers.get_mut(key) else {
        return 0;
    };
    let mut delivered = 0;
    entries.retain(|(id, tx)| match tx.try_send(event.clone()) {
        Ok(()) => {
            delivered += 1;
            true
        }
        Err(TrySendError::Full(_)) => {
            tracing::trace!(session = %key, subscriber = id, "subscriber full; event dropped");
            true
        }
        // Receiver went away without cancelling; prune it.
        Err(TrySendError::Closed(_)) => false,
    });
    if entries.is_empty() {
        subscribers.remove(key);
    }
    delivered
}

fn remove_subscriber(
    subscribers: &mut HashMap<String, Vec<(u64, mpsc::Sender<HubEvent>)>>,
    key: &str,
    id: u64,
) {
    if let Some(entries) = subscribers.get_mut(key) {
        entries.retain(|(entry_id, _)| *entry_id != id);
        if entries.is_empty() {
            subscribers.remove(key);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(kind: &str, session: &str) -> HubEvent {
        HubEvent::new(kind, session)
    }

    #[tokio::test]
    async fn publish_reaches_exact_and_global_subscribers() {
        let hub = EventHub::new();
        let (mut exact_rx, _exact) = hub.subscribe("session-1");
        let (mut global_rx, _global) = hub.subscribe("");
        let (mut other_rx, _other) = hub.subscribe("session-2");

        let delivered = hub.publish(&event("plan.created", "session-1"), "session-1");
        assert_eq!(delivered, 2);

        assert_eq!(exact_rx.recv().await.unwrap().kind, "plan.created");
        assert_eq!(global_rx.recv().await.unwrap().kind, "plan.created");
        assert!(other_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn publish_to_empty_session_hits_global_once() {
        let hub = EventHub::new();
        let (mut global_rx, _sub) = hub.subscribe("");

        let delivered = hub.publish(&event("execution.updated", ""), "");
        assert_eq!(delivered, 1);
        assert!(global_rx.recv().await.is_some());
        assert!(global_rx.try_recv().is_err());
    }

    #[test]
    fn publish_with_no_subscribers_is_a_noop() {
        let hub = EventHub::new();
        assert_eq!(hub.publish(&event("plan.created", "nobody"), "nobody"), 0);
    }

    #[tokio::test]
    async fn full_subscriber_drops_instead_of_blocking() {
        let hub = EventHub::with_capacity(2);
        let (mut rx, _sub) = hub.subscribe("s");

        for _ in 0..5 {
            hub.publish(&event("tick", "s"), "s");
        }

        // Exactly the channel capacity made it through.
        assert!(rx.recv().await.is_some());
        assert!(rx.recv().await.is_some());
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn cancel_closes_the_channel_and_is_idempotent() {
        let hub = EventHub::new();
        let (mut rx, sub) = hub.subscribe("s");
        assert_eq!(hub.subscriber_count(), 1);

        sub.cancel();
        sub.cancel();
        assert_eq!(hub.subscriber_count(), 0);
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn dropping_the_handle_cancels() {
        let hub = EventHub::new();
        let (mut rx, sub) = hub.subscribe("s");
        drop(sub);
        assert_eq!(hub.subscriber_count(), 0);
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn closed_receivers_are_pruned_on_publish() {
        let hub = EventHub::new();
        let (rx, sub) = hub.subscribe("s");
        drop(rx);
        // Keep the handle alive so pruning, not Drop, removes the entry.
        hub.publish(&event("tick", "s"), "s");
        assert_eq!(hub.subscriber_count(), 0);
        drop(sub);
    }
}
