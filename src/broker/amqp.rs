//! AMQP 0-9-1 adapter backed by `lapin`

use super::adapter::{
    BrokerAdapter, BrokerChannel, BrokerConnection, DeadlineExceeded, QueueInfo,
};
use super::connection::AdapterError;
use async_trait::async_trait;
use lapin::options::{BasicPublishOptions, QueueDeclareOptions};
use lapin::types::FieldTable;
use lapin::{BasicProperties, ConnectionProperties};
use tokio::time::Instant;

/// Reply code sent with a normal close
const REPLY_SUCCESS: u16 = 200;

/// AMQP delivery mode 1 = transient
const DELIVERY_MODE_TRANSIENT: u8 = 1;

/// Production broker adapter
#[derive(Debug, Clone, Default)]
pub struct AmqpAdapter {
    connection_name: Option<String>,
}

impl AmqpAdapter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Name shown for this client in the broker management UI
    pub fn with_connection_name(mut self, name: impl Into<String>) -> Self {
        self.connection_name = Some(name.into());
        self
    }

    fn properties(&self) -> ConnectionProperties {
        let properties = ConnectionProperties::default();
        match &self.connection_name {
            Some(name) => properties.with_connection_name(name.as_str().into()),
            None => properties,
        }
    }
}

#[async_trait]
impl BrokerAdapter for AmqpAdapter {
    type Connection = AmqpConnection;

    async fn connect(&self, address: &str) -> Result<Self::Connection, AdapterError> {
        let inner = lapin::Connection::connect(address, self.properties()).await?;
        Ok(AmqpConnection { inner })
    }
}

pub struct AmqpConnection {
    inner: lapin::Connection,
}

#[async_trait]
impl BrokerConnection for AmqpConnection {
    type Channel = AmqpChannel;

    async fn open_channel(&self) -> Result<Self::Channel, AdapterError> {
        let inner = self.inner.create_channel().await?;
        Ok(AmqpChannel { inner })
    }

    fn is_closed(&self) -> bool {
        !self.inner.status().connected()
    }

    async fn close(&self) -> Result<(), AdapterError> {
        self.inner.close(REPLY_SUCCESS, "shutdown").await?;
        Ok(())
    }
}

pub struct AmqpChannel {
    inner: lapin::Channel,
}

#[async_trait]
impl BrokerChannel for AmqpChannel {
    async fn declare_queue(&self, name: &str) -> Result<QueueInfo, AdapterError> {
        let options = QueueDeclareOptions {
            passive: false,
            durable: false,
            exclusive: false,
            auto_delete: false,
            nowait: false,
        };
        let queue = self
            .inner
            .queue_declare(name, options, FieldTable::default())
            .await?;

        Ok(QueueInfo {
            name: queue.name().as_str().to_string(),
            message_count: queue.message_count(),
            consumer_count: queue.consumer_count(),
        })
    }

    async fn publish_with_deadline(
        &self,
        deadline: Instant,
        exchange: &str,
        routing_key: &str,
        body: &[u8],
        content_type: &str,
    ) -> Result<(), AdapterError> {
        let properties = BasicProperties::default()
            .with_content_type(content_type.into())
            .with_delivery_mode(DELIVERY_MODE_TRANSIENT);

        // Confirms are not enabled on this channel, so the returned
        // PublisherConfirm is dropped without being awaited.
        let publish = self.inner.basic_publish(
            exchange,
            routing_key,
            BasicPublishOptions::default(),
            body,
            properties,
        );

        match tokio::time::timeout_at(deadline, publish).await {
            Ok(result) => {
                result?;
                Ok(())
            }
            Err(_) => Err(Box::new(DeadlineExceeded)),
        }
    }

    async fn close(&self) -> Result<(), AdapterError> {
        self.inner.close(REPLY_SUCCESS, "shutdown").await?;
        Ok(())
    }
}
