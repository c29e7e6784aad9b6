//! Spotnet Bus - topic-based pubsub transport
//!
//! Delivery is at-least-once and FIFO per publisher; a publisher also
//! receives its own messages on topics it subscribes to.

pub mod inproc;
pub mod ipfs;

pub use inproc::InProcBus;
pub use ipfs::IpfsPubsub;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::mpsc;

/// Bus errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BusError {
    #[error("Subscribe to {topic} failed: {reason}")]
    Subscribe { topic: String, reason: String },

    #[error("Publish to {topic} failed: {reason}")]
    Publish { topic: String, reason: String },

    #[error("Malformed bus frame: {0}")]
    Decode(String),
}

pub type BusResult<T> = Result<T, BusError>;

/// A message as delivered by the bus
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BusMessage {
    pub topic: String,
    /// Publishing peer, when the transport reports one
    pub from: Option<String>,
    pub data: Vec<u8>,
}

impl BusMessage {
    pub fn new(topic: impl Into<String>, from: Option<String>, data: Vec<u8>) -> Self {
        Self {
            topic: topic.into(),
            from,
            data,
        }
    }
}

/// Ordered stream of messages for one topic
pub struct Subscription {
    topic: String,
    receiver: mpsc::UnboundedReceiver<BusMessage>,
}

impl Subscription {
    pub fn new(topic: impl Into<String>, receiver: mpsc::UnboundedReceiver<BusMessage>) -> Self {
        Self {
            topic: topic.into(),
            receiver,
        }
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Next message, or `None` once the transport has gone away
    pub async fn recv(&mut self) -> Option<BusMessage> {
        self.receiver.recv().await
    }

    /// Next message if one is already buffered
    pub fn try_recv(&mut self) -> Option<BusMessage> {
        self.receiver.try_recv().ok()
    }
}

/// Topic-based publish/subscribe transport
#[async_trait]
pub trait MessageBus: Send + Sync {
    async fn publish(&self, topic: &str, data: Vec<u8>) -> BusResult<()>;

    async fn subscribe(&self, topic: &str) -> BusResult<Subscription>;
}
