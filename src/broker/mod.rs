//! Broker client: connection manager, retry scheduling and publish gateway
//!
//! The manager keeps exactly one outbound connection alive for the process
//! lifetime, reconnecting with bounded exponential backoff, and exposes a
//! non-blocking health query for readiness probes.

pub mod adapter;
pub mod amqp;
pub mod connection;
pub mod manager;
pub mod publisher;
pub mod retry;

pub use adapter::{BrokerAdapter, BrokerChannel, BrokerConnection, QueueInfo};
pub use amqp::AmqpAdapter;
pub use connection::{AdapterError, BrokerConfig, BrokerError, ConnectionState};
pub use manager::ConnectionManager;
pub use publisher::{Envelope, EventPublisher, CONTENT_TYPE_JSON};
pub use retry::{RetryDecision, RetryPolicy};
