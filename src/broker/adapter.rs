//! Broker adapter boundary
//!
//! The connection manager never speaks the wire protocol itself. It drives a
//! [`BrokerAdapter`] that dials sessions, and the sessions hand out channels
//! used for queue declaration and publishing. The production implementation
//! lives in [`crate::broker::amqp`]; tests use [`crate::testing::MockBroker`].

use super::connection::AdapterError;
use async_trait::async_trait;
use thiserror::Error;
use tokio::time::Instant;

/// Returned by [`BrokerChannel::publish_with_deadline`] when the deadline
/// passes before the broker accepted the frame
#[derive(Debug, Error)]
#[error("publish deadline exceeded")]
pub struct DeadlineExceeded;

/// Result of a queue declaration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueInfo {
    pub name: String,
    pub message_count: u32,
    pub consumer_count: u32,
}

impl QueueInfo {
    pub fn named(name: &str) -> Self {
        Self {
            name: name.to_string(),
            message_count: 0,
            consumer_count: 0,
        }
    }
}

/// Dials broker sessions
#[async_trait]
pub trait BrokerAdapter: Send + Sync + 'static {
    type Connection: BrokerConnection;

    /// Dial the broker at `address`
    async fn connect(&self, address: &str) -> Result<Self::Connection, AdapterError>;
}

/// A broker-level session
#[async_trait]
pub trait BrokerConnection: Send + Sync + 'static {
    type Channel: BrokerChannel;

    async fn open_channel(&self) -> Result<Self::Channel, AdapterError>;

    /// Must not block or perform I/O
    fn is_closed(&self) -> bool;

    async fn close(&self) -> Result<(), AdapterError>;
}

/// A lightweight session over a connection used for declaring and publishing
#[async_trait]
pub trait BrokerChannel: Send + Sync + 'static {
    /// Declare a non-durable, non-exclusive, non-auto-delete queue.
    /// Declaring an existing queue with identical properties succeeds.
    async fn declare_queue(&self, name: &str) -> Result<QueueInfo, AdapterError>;

    /// Publish `body` without persistence or publisher confirms
    async fn publish_with_deadline(
        &self,
        deadline: Instant,
        exchange: &str,
        routing_key: &str,
        body: &[u8],
        content_type: &str,
    ) -> Result<(), AdapterError>;

    async fn close(&self) -> Result<(), AdapterError>;
}

/// Channel type produced by an adapter's connections
pub type ChannelOf<A> = <<A as BrokerAdapter>::Connection as BrokerConnection>::Channel;
