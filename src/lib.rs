//! User service
//!
//! A small HTTP service that stores users in memory and announces each new
//! user on RabbitMQ. The interesting part is the broker client: one
//! long-lived AMQP connection kept alive across broker restarts with bounded
//! exponential backoff, a non-blocking health signal for the readiness probe
//! and a timed publish path that is safe under concurrent reconnects.
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use user_service::broker::{AmqpAdapter, BrokerConfig, ConnectionManager, Envelope};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let manager = Arc::new(ConnectionManager::new(BrokerConfig::default(), AmqpAdapter::new()));
//! manager.start()?;
//!
//! let event = Envelope::new("user.created", serde_json::json!({"id": 1, "name": "a"}));
//! manager.publish("notification-service", &event).await?;
//!
//! manager.stop().await;
//! # Ok(())
//! # }
//! ```

pub mod broker;
pub mod config;
pub mod error;
pub mod http;
pub mod observability;
pub mod service;
pub mod testing;

pub use broker::{BrokerConfig, BrokerError, ConnectionManager, ConnectionState, Envelope};
pub use config::{ConfigError, ServiceConfig};
pub use error::{ServiceError, ServiceResult};
