//! Publish/subscribe transport abstraction.
//!
//! The broker connection is shared process-wide. Handlers are invoked from
//! the transport's dispatch loop and must not block.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};

use crate::error::Result;
use crate::topic::topic_matches;

/// Subscription handle returned by [`PubSub::subscribe`].
pub type SubscriptionId = u64;

/// Inbound message handler.
pub type MessageHandler = Arc<dyn Fn(&Message) + Send + Sync>;

/// A message received from or sent to the broker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub topic: String,
    pub payload: Vec<u8>,
}

impl Message {
    pub fn new(topic: impl Into<String>, payload: impl Into<Vec<u8>>) -> Self {
        Self {
            topic: topic.into(),
            payload: payload.into(),
        }
    }
}

/// Publish/subscribe transport.
#[async_trait]
pub trait PubSub: Send + Sync {
    /// Publish a payload on a topic.
    async fn publish(&self, topic: &str, payload: Vec<u8>) -> Result<()>;

    /// Register a handler for every message whose topic matches `filter`.
    async fn subscribe(&self, filter: &str, handler: MessageHandler) -> Result<SubscriptionId>;

    /// Remove a handler registered with [`PubSub::subscribe`].
    async fn unsubscribe(&self, id: SubscriptionId) -> Result<()>;
}

struct Subscription {
    id: SubscriptionId,
    filter: String,
    handler: MessageHandler,
}

/// Handler table shared by transport implementations.
#[derive(Default)]
pub struct SubscriptionTable {
    subscriptions: RwLock<Vec<Subscription>>,
    next_id: AtomicU64,
}

impl SubscriptionTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler and return its ID.
    pub fn add(&self, filter: &str, handler: MessageHandler) -> SubscriptionId {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        self.subscriptions.write().push(Subscription {
            id,
            filter: filter.to_string(),
            handler,
        });
        id
    }

    /// Remove a handler, returning its filter.
    pub fn remove(&self, id: SubscriptionId) -> Option<String> {
        let mut subscriptions = self.subscriptions.write();
        let index = subscriptions.iter().position(|s| s.id == id)?;
        Some(subscriptions.remove(index).filter)
    }

    /// Whether any handler is still registered for `filter`.
    pub fn has_filter(&self, filter: &str) -> bool {
        self.subscriptions.read().iter().any(|s| s.filter == filter)
    }

    /// Distinct filters with at least one handler.
    pub fn filters(&self) -> Vec<String> {
        let mut filters: Vec<String> = self
            .subscriptions
            .read()
            .iter()
            .map(|s| s.filter.clone())
            .collect();
        filters.sort();
        filters.dedup();
        filters
    }

    pub fn len(&self) -> usize {
        self.subscriptions.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.subscriptions.read().is_empty()
    }

    /// Invoke every matching handler. Returns the number of handlers called.
    pub fn dispatch(&self, message: &Message) -> usize {
        // Handlers run outside the lock so they may subscribe or unsubscribe.
        let handlers: Vec<MessageHandler> = self
            .subscriptions
            .read()
            .iter()
            .filter(|s| topic_matches(&s.filter, &message.topic))
            .map(|s| s.handler.clone())
            .collect();

        for handler in &handlers {
            handler(message);
        }
        handlers.len()
    }
}

/// In-process transport.
///
/// Publishing loops back to local subscribers. Every publish call is recorded
/// so callers can inspect what was sent; [`MemoryTransport::deliver`] injects
/// a message as if it came from a device without recording it.
#[derive(Default)]
pub struct MemoryTransport {
    subscriptions: SubscriptionTable,
    published: Mutex<Vec<Message>>,
}

impl MemoryTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulate an inbound message from a device.
    pub fn deliver(&self, topic: &str, payload: impl Into<Vec<u8>>) -> usize {
        self.subscriptions.dispatch(&Message::new(topic, payload))
    }

    /// Messages published through this transport, oldest first.
    pub fn published(&self) -> Vec<Message> {
        self.published.lock().clone()
    }

    pub fn publish_count(&self) -> usize {
        self.published.lock().len()
    }

    pub fn subscription_count(&self) -> usize {
        self.subscriptions.len()
    }
}

#[async_trait]
impl PubSub for MemoryTransport {
    async fn publish(&self, topic: &str, payload: Vec<u8>) -> Result<()> {
        let message = Message::new(topic, payload);
        self.published.lock().push(message.clone());
        self.subscriptions.dispatch(&message);
        Ok(())
    }

    async fn subscribe(&self, filter: &str, handler: MessageHandler) -> Result<SubscriptionId> {
        Ok(self.subscriptions.add(filter, handler))
    }

    async fn unsubscribe(&self, id: SubscriptionId) -> Result<()> {
        self.subscriptions.remove(id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    fn counting_handler(counter: Arc<AtomicUsize>) -> MessageHandler {
        Arc::new(move |_msg: &Message| {
            counter.fetch_add(1, Ordering::SeqCst);
        })
    }

    #[tokio::test]
    async fn test_memory_transport_loopback() {
        let transport = MemoryTransport::new();
        let counter = Arc::new(AtomicUsize::new(0));

        transport
            .subscribe("+/+/+/output", counting_handler(counter.clone()))
            .await
            .unwrap();

        transport
            .publish("3303/0/0/output", b"21.5".to_vec())
            .await
            .unwrap();
        transport
            .publish("client/3303/0/0/input", b"1".to_vec())
            .await
            .unwrap();

        assert_eq!(counter.load(Ordering::SeqCst), 1);
        assert_eq!(transport.publish_count(), 2);
    }

    #[tokio::test]
    async fn test_deliver_is_not_recorded() {
        let transport = MemoryTransport::new();
        let counter = Arc::new(AtomicUsize::new(0));
        transport
            .subscribe("3303/#", counting_handler(counter.clone()))
            .await
            .unwrap();

        assert_eq!(transport.deliver("3303/0/0/output", "20"), 1);
        assert_eq!(transport.publish_count(), 0);
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_unsubscribe() {
        let transport = MemoryTransport::new();
        let counter = Arc::new(AtomicUsize::new(0));
        let id = transport
            .subscribe("#", counting_handler(counter.clone()))
            .await
            .unwrap();

        transport.unsubscribe(id).await.unwrap();
        transport.deliver("3303/0/0/output", "20");

        assert_eq!(counter.load(Ordering::SeqCst), 0);
        assert_eq!(transport.subscription_count(), 0);
    }
}
