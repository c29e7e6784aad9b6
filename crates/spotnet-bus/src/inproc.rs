//! In-process pubsub hub (tests and single-process wiring)

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::mpsc;

use crate::{BusMessage, BusResult, MessageBus, Subscription};

#[derive(Default)]
struct Hub {
    subscribers: Mutex<HashMap<String, Vec<mpsc::UnboundedSender<BusMessage>>>>,
    history: Mutex<Vec<BusMessage>>,
}

/// A peer's handle on a shared in-process hub.
///
/// Every handle created with [`InProcBus::connect`] sees the same topics, and
/// publishers receive their own messages, as on a real pubsub network.
#[derive(Clone)]
pub struct InProcBus {
    peer_id: String,
    hub: Arc<Hub>,
}

impl InProcBus {
    pub fn new(peer_id: impl Into<String>) -> Self {
        Self {
            peer_id: peer_id.into(),
            hub: Arc::new(Hub::default()),
        }
    }

    /// Another peer on the same hub
    pub fn connect(&self, peer_id: impl Into<String>) -> Self {
        Self {
            peer_id: peer_id.into(),
            hub: self.hub.clone(),
        }
    }

    pub fn peer_id(&self) -> &str {
        &self.peer_id
    }

    /// Every message published on the hub, in order
    pub fn history(&self) -> Vec<BusMessage> {
        self.hub.history.lock().clone()
    }

    /// Messages published by `peer_id` on `topic`
    pub fn published_by(&self, peer_id: &str, topic: &str) -> Vec<BusMessage> {
        self.hub
            .history
            .lock()
            .iter()
            .filter(|m| m.topic == topic && m.from.as_deref() == Some(peer_id))
            .cloned()
            .collect()
    }

    fn deliver(&self, message: BusMessage) {
        self.hub.history.lock().push(message.clone());
        let mut subscribers = self.hub.subscribers.lock();
        if let Some(senders) = subscribers.get_mut(&message.topic) {
            senders.retain(|sender| sender.send(message.clone()).is_ok());
        }
    }
}

#[async_trait]
impl MessageBus for InProcBus {
    async fn publish(&self, topic: &str, data: Vec<u8>) -> BusResult<()> {
        tracing::trace!(peer = %self.peer_id, topic, bytes = data.len(), "inproc publish");
        self.deliver(BusMessage::new(topic, Some(self.peer_id.clone()), data));
        Ok(())
    }

    async fn subscribe(&self, topic: &str) -> BusResult<Subscription> {
        let (sender, receiver) = mpsc::unbounded_channel();
        self.hub
            .subscribers
            .lock()
            .entry(topic.to_string())
            .or_default()
            .push(sender);
        Ok(Subscription::new(topic, receiver))
    }
}
