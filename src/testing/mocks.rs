//! Mock implementations for testing
//!
//! Provides a scriptable in-memory broker adapter and a recording event
//! publisher so the connection manager and the HTTP layer can be exercised
//! without a running RabbitMQ.

use crate::broker::adapter::{
    BrokerAdapter, BrokerChannel, BrokerConnection, DeadlineExceeded, QueueInfo,
};
use crate::broker::connection::{AdapterError, BrokerError};
use crate::broker::publisher::{Envelope, EventPublisher};
use async_trait::async_trait;
use parking_lot::Mutex;
use serde::Serialize;
use serde_json::Value;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

/// A message observed by [`MockBroker`]
#[derive(Debug, Clone, PartialEq)]
pub struct PublishedMessage {
    pub exchange: String,
    pub queue: String,
    pub body: Vec<u8>,
    pub content_type: String,
    pub at: Instant,
}

impl PublishedMessage {
    pub fn body_str(&self) -> &str {
        std::str::from_utf8(&self.body).unwrap_or("")
    }
}

#[derive(Debug, Default)]
struct BrokerScript {
    unreachable: bool,
    dial_failures: u32,
    channel_failures: u32,
    declare_failures: u32,
    publish_failures: u32,
    publish_delay: Option<Duration>,
    dials: Vec<(String, Instant)>,
    declared: Vec<String>,
    published: Vec<PublishedMessage>,
    closed_connections: usize,
    closed_channels: usize,
    connections: Vec<Arc<AtomicBool>>,
}

/// Scriptable broker adapter.
///
/// Clones share state, so a test keeps one handle while the manager owns
/// another.
#[derive(Debug, Clone, Default)]
pub struct MockBroker {
    script: Arc<Mutex<BrokerScript>>,
}

impl MockBroker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every dial fails until [`MockBroker::set_reachable`] flips it back
    pub fn unreachable() -> Self {
        let broker = Self::new();
        broker.set_reachable(false);
        broker
    }

    pub fn set_reachable(&self, reachable: bool) {
        self.script.lock().unreachable = !reachable;
    }

    pub fn fail_next_dials(&self, count: u32) {
        self.script.lock().dial_failures = count;
    }

    pub fn fail_next_channel_opens(&self, count: u32) {
        self.script.lock().channel_failures = count;
    }

    pub fn fail_next_declares(&self, count: u32) {
        self.script.lock().declare_failures = count;
    }

    pub fn fail_next_publishes(&self, count: u32) {
        self.script.lock().publish_failures = count;
    }

    /// Make every publish take `delay` before the broker accepts it
    pub fn set_publish_delay(&self, delay: Duration) {
        self.script.lock().publish_delay = Some(delay);
    }

    /// Simulate the broker closing every open connection
    pub fn drop_connections(&self) {
        for closed in &self.script.lock().connections {
            closed.store(true, Ordering::SeqCst);
        }
    }

    pub fn dial_count(&self) -> usize {
        self.script.lock().dials.len()
    }

    pub fn dial_addresses(&self) -> Vec<String> {
        self.script
            .lock()
            .dials
            .iter()
            .map(|(address, _)| address.clone())
            .collect()
    }

    pub fn dial_instants(&self) -> Vec<Instant> {
        self.script.lock().dials.iter().map(|(_, at)| *at).collect()
    }

    pub fn declared_queues(&self) -> Vec<String> {
        self.script.lock().declared.clone()
    }

    pub fn published(&self) -> Vec<PublishedMessage> {
        self.script.lock().published.clone()
    }

    pub fn closed_connections(&self) -> usize {
        self.script.lock().closed_connections
    }

    pub fn closed_channels(&self) -> usize {
        self.script.lock().closed_channels
    }
}

/// Decrement a scripted failure counter, returning true if this call fails
fn take_failure(counter: &mut u32) -> bool {
    if *counter > 0 {
        *counter -= 1;
        true
    } else {
        false
    }
}

#[async_trait]
impl BrokerAdapter for MockBroker {
    type Connection = MockConnection;

    async fn connect(&self, address: &str) -> Result<Self::Connection, AdapterError> {
        let mut script = self.script.lock();
        script.dials.push((address.to_string(), Instant::now()));

        if script.unreachable || take_failure(&mut script.dial_failures) {
            return Err("connection refused".into());
        }

        let closed = Arc::new(AtomicBool::new(false));
        script.connections.push(Arc::clone(&closed));
        Ok(MockConnection {
            script: Arc::clone(&self.script),
            closed,
        })
    }
}

#[derive(Debug)]
pub struct MockConnection {
    script: Arc<Mutex<BrokerScript>>,
    closed: Arc<AtomicBool>,
}

#[async_trait]
impl BrokerConnection for MockConnection {
    type Channel = MockChannel;

    async fn open_channel(&self) -> Result<Self::Channel, AdapterError> {
        if self.is_closed() {
            return Err("connection closed".into());
        }
        if take_failure(&mut self.script.lock().channel_failures) {
            return Err("channel open refused".into());
        }
        Ok(MockChannel {
            script: Arc::clone(&self.script),
            connection_closed: Arc::clone(&self.closed),
        })
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    async fn close(&self) -> Result<(), AdapterError> {
        self.closed.store(true, Ordering::SeqCst);
        self.script.lock().closed_connections += 1;
        Ok(())
    }
}

#[derive(Debug)]
pub struct MockChannel {
    script: Arc<Mutex<BrokerScript>>,
    connection_closed: Arc<AtomicBool>,
}

#[async_trait]
impl BrokerChannel for MockChannel {
    async fn declare_queue(&self, name: &str) -> Result<QueueInfo, AdapterError> {
        if self.connection_closed.load(Ordering::SeqCst) {
            return Err("channel closed".into());
        }
        let mut script = self.script.lock();
        if take_failure(&mut script.declare_failures) {
            return Err("PRECONDITION_FAILED - inequivalent arg 'durable'".into());
        }
        script.declared.push(name.to_string());
        Ok(QueueInfo::named(name))
    }

    async fn publish_with_deadline(
        &self,
        deadline: Instant,
        exchange: &str,
        routing_key: &str,
        body: &[u8],
        content_type: &str,
    ) -> Result<(), AdapterError> {
        let delay = self.script.lock().publish_delay;
        if let Some(delay) = delay {
            let ready_at = Instant::now() + delay;
            if ready_at > deadline {
                tokio::time::sleep_until(deadline).await;
                return Err(Box::new(DeadlineExceeded));
            }
            tokio::time::sleep_until(ready_at).await;
        }

        if self.connection_closed.load(Ordering::SeqCst) {
            return Err("channel closed".into());
        }
        let mut script = self.script.lock();
        if take_failure(&mut script.publish_failures) {
            return Err("connection reset by peer".into());
        }
        script.published.push(PublishedMessage {
            exchange: exchange.to_string(),
            queue: routing_key.to_string(),
            body: body.to_vec(),
            content_type: content_type.to_string(),
            at: Instant::now(),
        });
        Ok(())
    }

    async fn close(&self) -> Result<(), AdapterError> {
        self.script.lock().closed_channels += 1;
        Ok(())
    }
}

/// Recording [`EventPublisher`] for service and route tests
#[derive(Debug, Default)]
pub struct MockPublisher {
    published: Mutex<Vec<(String, Value)>>,
    should_fail: AtomicBool,
    unhealthy: AtomicBool,
}

impl MockPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_failure() -> Self {
        let publisher = Self::new();
        publisher.set_failing(true);
        publisher
    }

    pub fn set_failing(&self, failing: bool) {
        self.should_fail.store(failing, Ordering::SeqCst);
    }

    pub fn set_healthy(&self, healthy: bool) {
        self.unhealthy.store(!healthy, Ordering::SeqCst);
    }

    /// `(queue, envelope as JSON)` in publish order
    pub fn published(&self) -> Vec<(String, Value)> {
        self.published.lock().clone()
    }
}

#[async_trait]
impl EventPublisher for MockPublisher {
    async fn publish<T>(&self, queue: &str, envelope: &Envelope<T>) -> Result<(), BrokerError>
    where
        T: Serialize + Sync,
    {
        let value = serde_json::to_value(envelope).map_err(BrokerError::SerializationFailure)?;
        if self.should_fail.load(Ordering::SeqCst) {
            return Err(BrokerError::PublishTransportFailure(
                "mock publish failure".into(),
            ));
        }
        self.published.lock().push((queue.to_string(), value));
        Ok(())
    }

    fn is_healthy(&self) -> bool {
        !self.unhealthy.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_broker_scripted_dial_failures() {
        let broker = MockBroker::new();
        broker.fail_next_dials(2);

        assert!(broker.connect("amqp://a").await.is_err());
        assert!(broker.connect("amqp://a").await.is_err());
        assert!(broker.connect("amqp://a").await.is_ok());
        assert_eq!(broker.dial_count(), 3);
    }

    #[tokio::test]
    async fn test_mock_broker_unreachable() {
        let broker = MockBroker::unreachable();
        assert!(broker.connect("amqp://a").await.is_err());

        broker.set_reachable(true);
        assert!(broker.connect("amqp://a").await.is_ok());
    }

    #[tokio::test]
    async fn test_mock_connection_drop() {
        let broker = MockBroker::new();
        let connection = broker.connect("amqp://a").await.unwrap();
        let channel = connection.open_channel().await.unwrap();
        assert!(!connection.is_closed());

        broker.drop_connections();
        assert!(connection.is_closed());
        assert!(channel.declare_queue("q").await.is_err());
        assert!(connection.open_channel().await.is_err());
    }

    #[tokio::test]
    async fn test_mock_channel_records_publishes() {
        let broker = MockBroker::new();
        let connection = broker.connect("amqp://a").await.unwrap();
        let channel = connection.open_channel().await.unwrap();

        channel.declare_queue("q").await.unwrap();
        channel
            .publish_with_deadline(
                Instant::now() + Duration::from_secs(1),
                "",
                "q",
                b"{}",
                "application/json",
            )
            .await
            .unwrap();

        assert_eq!(broker.declared_queues(), vec!["q".to_string()]);
        let published = broker.published();
        assert_eq!(published.len(), 1);
        assert_eq!(published[0].queue, "q");
        assert_eq!(published[0].body_str(), "{}");
    }

    #[tokio::test(start_paused = true)]
    async fn test_mock_channel_publish_deadline() {
        let broker = MockBroker::new();
        broker.set_publish_delay(Duration::from_secs(10));
        let connection = broker.connect("amqp://a").await.unwrap();
        let channel = connection.open_channel().await.unwrap();

        let err = channel
            .publish_with_deadline(
                Instant::now() + Duration::from_secs(1),
                "",
                "q",
                b"{}",
                "application/json",
            )
            .await
            .unwrap_err();
        assert!(err.is::<DeadlineExceeded>());
        assert!(broker.published().is_empty());
    }

    #[tokio::test]
    async fn test_mock_publisher_records_and_fails() {
        let publisher = MockPublisher::new();
        publisher
            .publish("q", &Envelope::new("p", serde_json::json!({"a": 1})))
            .await
            .unwrap();
        assert_eq!(publisher.published().len(), 1);

        publisher.set_failing(true);
        assert!(publisher
            .publish("q", &Envelope::new("p", 1))
            .await
            .is_err());
        assert_eq!(publisher.published().len(), 1);
    }
}
