//! Testing utilities and mock implementations
//!
//! Lets the connection manager, publish gateway and HTTP routes run in tests
//! without a RabbitMQ broker.

pub mod mocks;

pub use mocks::*;
