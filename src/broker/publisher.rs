//! Publish gateway
//!
//! Serializes `{pattern, data}` envelopes and publishes them on whatever
//! channel the connection manager currently holds. No retry happens here;
//! callers own their publish retry policy.

use super::adapter::{BrokerAdapter, BrokerChannel, BrokerConnection, DeadlineExceeded};
use super::connection::BrokerError;
use super::manager::ConnectionManager;
use crate::broker_span;
use crate::observability::metrics::metrics;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tracing::{debug, info, warn, Instrument};

/// Content type declared on every published message
pub const CONTENT_TYPE_JSON: &str = "application/json";

/// The default exchange routes by queue name
pub const DEFAULT_EXCHANGE: &str = "";

/// The unit of publish. Immutable once constructed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope<T> {
    pattern: String,
    data: T,
}

impl<T> Envelope<T> {
    pub fn new(pattern: impl Into<String>, data: T) -> Self {
        Self {
            pattern: pattern.into(),
            data,
        }
    }

    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    pub fn data(&self) -> &T {
        &self.data
    }

    pub fn into_data(self) -> T {
        self.data
    }
}

impl<T: Serialize> Envelope<T> {
    /// Encode as `{"pattern":..,"data":..}`
    pub fn to_bytes(&self) -> Result<Vec<u8>, BrokerError> {
        serde_json::to_vec(self).map_err(BrokerError::SerializationFailure)
    }
}

/// Anything business code can publish events through
#[async_trait]
pub trait EventPublisher: Send + Sync {
    /// Publish `envelope` to `queue`, bounded by the configured publish timeout
    async fn publish<T>(&self, queue: &str, envelope: &Envelope<T>) -> Result<(), BrokerError>
    where
        T: Serialize + Sync;

    /// Cheap readiness signal
    fn is_healthy(&self) -> bool;
}

impl<A: BrokerAdapter> ConnectionManager<A> {
    /// Publish with only the configured publish timeout as the deadline
    pub async fn publish<T: Serialize>(
        &self,
        queue: &str,
        envelope: &Envelope<T>,
    ) -> Result<(), BrokerError> {
        let deadline = Instant::now() + self.config().publish_timeout();
        self.publish_before(deadline, queue, envelope).await
    }

    /// Publish bounded by `min(deadline, now + publish_timeout)`.
    ///
    /// An already-expired deadline or an unserializable payload fails before
    /// any I/O. While no healthy session is installed the call fails fast with
    /// a transport error instead of waiting for a reconnect.
    pub async fn publish_before<T: Serialize>(
        &self,
        deadline: Instant,
        queue: &str,
        envelope: &Envelope<T>,
    ) -> Result<(), BrokerError> {
        let span = broker_span!(queue = %queue, event = %envelope.pattern());
        let result = self
            .publish_inner(deadline, queue, envelope)
            .instrument(span)
            .await;

        match &result {
            Ok(()) => {
                metrics().message_published(envelope.pattern());
                info!(event = %envelope.pattern(), queue = %queue, "Event published");
            }
            Err(e) => {
                metrics().publish_failed();
                warn!(event = %envelope.pattern(), queue = %queue, error = %e, "Event publish failed");
            }
        }
        result
    }

    async fn publish_inner<T: Serialize>(
        &self,
        deadline: Instant,
        queue: &str,
        envelope: &Envelope<T>,
    ) -> Result<(), BrokerError> {
        let deadline = deadline.min(Instant::now() + self.config().publish_timeout());
        if Instant::now() >= deadline {
            return Err(BrokerError::PublishTimeout {
                queue: queue.to_string(),
            });
        }

        let body = envelope.to_bytes()?;

        // Clone the Arc out of the lock so no guard is held across the awaits below
        let session = match self.current_session() {
            Some(session) if !session.connection.is_closed() => session,
            _ => {
                return Err(BrokerError::PublishTransportFailure(
                    format!("not connected (state {:?})", self.state()).into(),
                ));
            }
        };

        let exchange_and_publish = async {
            let declared = session
                .channel
                .declare_queue(queue)
                .await
                .map_err(|source| BrokerError::QueueDeclareFailure {
                    queue: queue.to_string(),
                    source,
                })?;
            debug!(queue = %declared.name, consumers = declared.consumer_count, "Queue declared");

            session
                .channel
                .publish_with_deadline(
                    deadline,
                    DEFAULT_EXCHANGE,
                    queue,
                    &body,
                    CONTENT_TYPE_JSON,
                )
                .await
                .map_err(|e| {
                    if e.is::<DeadlineExceeded>() {
                        BrokerError::PublishTimeout {
                            queue: queue.to_string(),
                        }
                    } else {
                        BrokerError::PublishTransportFailure(e)
                    }
                })
        };

        match tokio::time::timeout_at(deadline, exchange_and_publish).await {
            Ok(result) => result,
            Err(_) => Err(BrokerError::PublishTimeout {
                queue: queue.to_string(),
            }),
        }
    }
}

#[async_trait]
impl<A: BrokerAdapter> EventPublisher for ConnectionManager<A> {
    async fn publish<T>(&self, queue: &str, envelope: &Envelope<T>) -> Result<(), BrokerError>
    where
        T: Serialize + Sync,
    {
        ConnectionManager::publish(self, queue, envelope).await
    }

    fn is_healthy(&self) -> bool {
        self.health()
    }
}
